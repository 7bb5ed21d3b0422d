//! Field extraction for the RV32 base encodings.

pub const OP_LOAD: u32 = 0x03;
pub const OP_STREAM: u32 = 0x0b;
pub const OP_IMM: u32 = 0x13;
pub const OP_AUIPC: u32 = 0x17;
pub const OP_STORE: u32 = 0x23;
pub const OP_REG: u32 = 0x33;
pub const OP_LUI: u32 = 0x37;
pub const OP_BRANCH: u32 = 0x63;
pub const OP_JALR: u32 = 0x67;
pub const OP_JAL: u32 = 0x6f;

/// `value[hi:lo]`, inclusive.
#[inline]
pub fn bits(value: u32, hi: u32, lo: u32) -> u32 {
  let width = hi - lo + 1;
  if width >= 32 {
    value >> lo
  } else {
    (value >> lo) & ((1 << width) - 1)
  }
}

/// Sign-extend the low `width` bits of `value`.
#[inline]
pub fn sign_extend(value: u32, width: u32) -> u32 {
  let shift = 32 - width;
  (((value << shift) as i32) >> shift) as u32
}

#[inline]
pub fn zero_extend(value: u32, width: u32) -> u32 {
  if width >= 32 {
    value
  } else {
    value & ((1 << width) - 1)
  }
}

#[inline]
pub fn opcode(inst: u32) -> u32 {
  bits(inst, 6, 0)
}

#[inline]
pub fn rd(inst: u32) -> usize {
  bits(inst, 11, 7) as usize
}

#[inline]
pub fn rs1(inst: u32) -> usize {
  bits(inst, 19, 15) as usize
}

#[inline]
pub fn rs2(inst: u32) -> usize {
  bits(inst, 24, 20) as usize
}

#[inline]
pub fn funct3(inst: u32) -> u32 {
  bits(inst, 14, 12)
}

#[inline]
pub fn funct7(inst: u32) -> u32 {
  bits(inst, 31, 25)
}

pub fn imm_i(inst: u32) -> u32 {
  sign_extend(bits(inst, 31, 20), 12)
}

pub fn imm_s(inst: u32) -> u32 {
  sign_extend(bits(inst, 31, 25) << 5 | bits(inst, 11, 7), 12)
}

pub fn imm_b(inst: u32) -> u32 {
  sign_extend(
    bits(inst, 31, 31) << 12 | bits(inst, 7, 7) << 11 | bits(inst, 30, 25) << 5 | bits(inst, 11, 8) << 1,
    13,
  )
}

pub fn imm_u(inst: u32) -> u32 {
  inst & 0xffff_f000
}

pub fn imm_j(inst: u32) -> u32 {
  sign_extend(
    bits(inst, 31, 31) << 20 | bits(inst, 19, 12) << 12 | bits(inst, 20, 20) << 11 | bits(inst, 30, 21) << 1,
    21,
  )
}

/// Control-transfer opcodes, used to tag commit-log lines.
pub fn is_branch(inst: u32) -> bool {
  matches!(opcode(inst), OP_JAL | OP_BRANCH | OP_JALR)
}
