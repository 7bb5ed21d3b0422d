//! Assemblers for the RV32IM subset the oracle executes. Register arguments are plain
//! indices and are not range checked.

use super::decode::*;

/// Word the harness treats as end of program.
pub const HALT: u32 = 0x8000_0000;

pub fn rtype(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
  funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
}

pub fn itype(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
  ((imm as u32) & 0xfff) << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
}

pub fn stype(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
  let imm = imm as u32;
  bits(imm, 11, 5) << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | bits(imm, 4, 0) << 7 | OP_STORE
}

pub fn btype(offset: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
  let imm = offset as u32;
  bits(imm, 12, 12) << 31
    | bits(imm, 10, 5) << 25
    | rs2 << 20
    | rs1 << 15
    | funct3 << 12
    | bits(imm, 4, 1) << 8
    | bits(imm, 11, 11) << 7
    | OP_BRANCH
}

macro_rules! reg_reg {
  ($($name:ident => ($funct7:expr, $funct3:expr)),* $(,)?) => {
    $(
      pub fn $name(rd: u32, rs1: u32, rs2: u32) -> u32 {
        rtype($funct7, rs2, rs1, $funct3, rd, OP_REG)
      }
    )*
  };
}

reg_reg! {
  add => (0x00, 0x0), sub => (0x20, 0x0), sll => (0x00, 0x1), slt => (0x00, 0x2),
  sltu => (0x00, 0x3), xor => (0x00, 0x4), srl => (0x00, 0x5), sra => (0x20, 0x5),
  or => (0x00, 0x6), and => (0x00, 0x7),
  mul => (0x01, 0x0), mulh => (0x01, 0x1), mulhsu => (0x01, 0x2), mulhu => (0x01, 0x3),
  div => (0x01, 0x4), divu => (0x01, 0x5), rem => (0x01, 0x6), remu => (0x01, 0x7),
}

macro_rules! reg_imm {
  ($($name:ident => ($opcode:expr, $funct3:expr)),* $(,)?) => {
    $(
      pub fn $name(rd: u32, rs1: u32, imm: i32) -> u32 {
        itype(imm, rs1, $funct3, rd, $opcode)
      }
    )*
  };
}

reg_imm! {
  addi => (OP_IMM, 0x0), slti => (OP_IMM, 0x2), sltiu => (OP_IMM, 0x3), xori => (OP_IMM, 0x4),
  ori => (OP_IMM, 0x6), andi => (OP_IMM, 0x7),
  lb => (OP_LOAD, 0x0), lh => (OP_LOAD, 0x1), lw => (OP_LOAD, 0x2), lbu => (OP_LOAD, 0x4),
  lhu => (OP_LOAD, 0x5), jalr => (OP_JALR, 0x0),
}

pub fn slli(rd: u32, rs1: u32, shamt: u32) -> u32 {
  rtype(0x00, shamt & 0x1f, rs1, 0x1, rd, OP_IMM)
}

pub fn srli(rd: u32, rs1: u32, shamt: u32) -> u32 {
  rtype(0x00, shamt & 0x1f, rs1, 0x5, rd, OP_IMM)
}

pub fn srai(rd: u32, rs1: u32, shamt: u32) -> u32 {
  rtype(0x20, shamt & 0x1f, rs1, 0x5, rd, OP_IMM)
}

/// `sb rs2, imm(rs1)`
pub fn sb(rs2: u32, rs1: u32, imm: i32) -> u32 {
  stype(imm, rs2, rs1, 0x0)
}

pub fn sh(rs2: u32, rs1: u32, imm: i32) -> u32 {
  stype(imm, rs2, rs1, 0x1)
}

pub fn sw(rs2: u32, rs1: u32, imm: i32) -> u32 {
  stype(imm, rs2, rs1, 0x2)
}

macro_rules! branch {
  ($($name:ident => $funct3:expr),* $(,)?) => {
    $(
      pub fn $name(rs1: u32, rs2: u32, offset: i32) -> u32 {
        btype(offset, rs2, rs1, $funct3)
      }
    )*
  };
}

branch! { beq => 0x0, bne => 0x1, blt => 0x4, bge => 0x5, bltu => 0x6, bgeu => 0x7 }

/// `lui rd, imm20`: imm20 lands in bits 31:12.
pub fn lui(rd: u32, imm20: u32) -> u32 {
  (imm20 << 12) | rd << 7 | OP_LUI
}

pub fn auipc(rd: u32, imm20: u32) -> u32 {
  (imm20 << 12) | rd << 7 | OP_AUIPC
}

pub fn jal(rd: u32, offset: i32) -> u32 {
  let imm = offset as u32;
  bits(imm, 20, 20) << 31 | bits(imm, 10, 1) << 21 | bits(imm, 11, 11) << 20 | bits(imm, 19, 12) << 12 | rd << 7 | OP_JAL
}

/// Vendor stream extension, R-type layout with funct7 = 0.
pub fn stream(funct3: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
  rtype(0x00, rs2, rs1, funct3, rd, OP_STREAM)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_encodings() {
    assert_eq!(addi(10, 0, 5), 0x0050_0513);
    assert_eq!(addi(10, 10, -5), 0xffb5_0513);
    assert_eq!(sw(11, 2, -4), 0xfeb1_2e23);
    assert_eq!(beq(0, 0, -8), 0xfe00_0ce3);
    assert_eq!(jal(1, 2048), 0x0010_00ef);
    assert_eq!(add(3, 1, 2), 0x0020_81b3);
    assert_eq!(srai(4, 1, 4), 0x4040_d213);
  }

  #[test]
  fn decode_inverts_encode() {
    for offset in [-4096, -8, -2, 2, 8, 4094] {
      assert_eq!(imm_b(bne(1, 2, offset)), offset as u32);
    }
    for offset in [-(1 << 20), -4, 4, 2048, (1 << 20) - 2] {
      assert_eq!(imm_j(jal(0, offset)), offset as u32);
    }
    for imm in [-2048, -1, 0, 1, 2047] {
      assert_eq!(imm_s(sw(0, 0, imm)), imm as u32);
      assert_eq!(imm_i(addi(0, 0, imm)), imm as u32);
    }
  }
}
