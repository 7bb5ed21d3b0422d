use tracing::warn;

use super::decode::*;
use crate::bus::{MemoryPort, WordMemory};

/// Per-class counts of executed instructions. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstStatistic {
  pub alu: u64,
  pub branch: u64,
  pub load: u64,
  pub store: u64,
  pub mul: u64,
  pub div: u64,
}

impl InstStatistic {
  pub fn total(&self) -> u64 {
    self.alu + self.branch + self.load + self.store + self.mul + self.div
  }
}

/// RV32IM interpreter used as the difftest oracle. It owns its memory view; nothing on
/// the bus side ever writes into it.
pub struct Simulator<M: MemoryPort = WordMemory> {
  pc: u32,
  gpr: [u32; 32],
  memory: M,
  stat: InstStatistic,
}

impl<M: MemoryPort> Simulator<M> {
  pub fn new(memory: M, pc: u32) -> Self {
    Self { pc, gpr: [0; 32], memory, stat: InstStatistic::default() }
  }

  pub fn pc(&self) -> u32 {
    self.pc
  }

  pub fn gpr(&self, idx: usize) -> u32 {
    self.gpr[idx]
  }

  pub fn gprs(&self) -> &[u32; 32] {
    &self.gpr
  }

  pub fn inst_statistic(&self) -> InstStatistic {
    self.stat
  }

  pub fn memory(&self) -> &M {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut M {
    &mut self.memory
  }

  /// Retire exactly `n` instructions.
  pub fn step(&mut self, n: u64) {
    for _ in 0..n {
      self.step_one();
    }
  }

  fn step_one(&mut self) {
    let inst = self.memory.read(self.pc);
    match opcode(inst) {
      OP_STREAM => self.execute_stream(inst),
      OP_LUI | OP_AUIPC => self.execute_u(inst),
      OP_JAL => self.execute_j(inst),
      OP_JALR | OP_LOAD | OP_IMM => self.execute_i(inst),
      OP_BRANCH => self.execute_b(inst),
      OP_STORE => self.execute_s(inst),
      OP_REG => self.execute_r(inst),
      op => warn!("ref: unknown opcode {op:#04x} (inst={inst:#010x}) at pc={:#010x}", self.pc),
    }
    self.gpr[0] = 0;
  }

  fn execute_r(&mut self, inst: u32) {
    let a = self.gpr[rs1(inst)];
    let b = self.gpr[rs2(inst)];
    let shamt = b & 0x1f;
    let value = match (funct7(inst), funct3(inst)) {
      (0x00, f3) => {
        self.stat.alu += 1;
        match f3 {
          0x0 => a.wrapping_add(b),
          0x1 => a << shamt,
          0x2 => ((a as i32) < (b as i32)) as u32,
          0x3 => (a < b) as u32,
          0x4 => a ^ b,
          0x5 => a >> shamt,
          0x6 => a | b,
          _ => a & b,
        }
      }
      (0x20, 0x0) => {
        self.stat.alu += 1;
        a.wrapping_sub(b)
      }
      (0x20, 0x5) => {
        self.stat.alu += 1;
        ((a as i32) >> shamt) as u32
      }
      (0x01, f3) if f3 < 4 => {
        self.stat.mul += 1;
        match f3 {
          0x0 => a.wrapping_mul(b),
          0x1 => ((a as i32 as i64 * b as i32 as i64) >> 32) as u32,
          0x2 => ((a as i32 as i64).wrapping_mul(b as i64) >> 32) as u32,
          _ => ((a as u64 * b as u64) >> 32) as u32,
        }
      }
      (0x01, f3) => {
        self.stat.div += 1;
        match f3 {
          0x4 if b == 0 => u32::MAX,
          0x4 => (a as i32).wrapping_div(b as i32) as u32,
          0x5 if b == 0 => u32::MAX,
          0x5 => a / b,
          0x6 if b == 0 => a,
          0x6 => (a as i32).wrapping_rem(b as i32) as u32,
          _ if b == 0 => a,
          _ => a % b,
        }
      }
      (f7, f3) => {
        warn!("ref: unknown OP funct7={f7:#x} funct3={f3:#x} at pc={:#010x}", self.pc);
        if f7 == 0x20 {
          self.stat.alu += 1;
        }
        self.pc = self.pc.wrapping_add(4);
        return;
      }
    };
    self.gpr[rd(inst)] = value;
    self.pc = self.pc.wrapping_add(4);
  }

  fn execute_i(&mut self, inst: u32) {
    let rd = rd(inst);
    let a = self.gpr[rs1(inst)];
    let imm = imm_i(inst);
    match opcode(inst) {
      OP_IMM => {
        self.stat.alu += 1;
        let shamt = imm & 0x1f;
        self.gpr[rd] = match funct3(inst) {
          0x0 => a.wrapping_add(imm),
          0x1 => a << shamt,
          0x2 => ((a as i32) < (imm as i32)) as u32,
          0x3 => (a < imm) as u32,
          0x4 => a ^ imm,
          0x5 if inst & 0x4000_0000 != 0 => ((a as i32) >> shamt) as u32,
          0x5 => a >> shamt,
          0x6 => a | imm,
          _ => a & imm,
        };
        self.pc = self.pc.wrapping_add(4);
      }
      OP_LOAD => {
        self.stat.load += 1;
        let data = self.memory.read(a.wrapping_add(imm));
        let value = match funct3(inst) {
          0x0 => Some(sign_extend(data, 8)),
          0x1 => Some(sign_extend(data, 16)),
          0x2 => Some(data),
          0x4 => Some(zero_extend(data, 8)),
          0x5 => Some(zero_extend(data, 16)),
          f3 => {
            warn!("ref: unknown LOAD funct3={f3:#x} at pc={:#010x}", self.pc);
            None
          }
        };
        if let Some(value) = value {
          self.gpr[rd] = value;
        }
        self.pc = self.pc.wrapping_add(4);
      }
      _ => {
        // jalr
        self.stat.branch += 1;
        let link = self.pc.wrapping_add(4);
        self.pc = a.wrapping_add(imm) & !1;
        self.gpr[rd] = link;
      }
    }
  }

  fn execute_b(&mut self, inst: u32) {
    self.stat.branch += 1;
    let a = self.gpr[rs1(inst)];
    let b = self.gpr[rs2(inst)];
    let taken = match funct3(inst) {
      0x0 => a == b,
      0x1 => a != b,
      0x4 => (a as i32) < (b as i32),
      0x5 => (a as i32) >= (b as i32),
      0x6 => a < b,
      0x7 => a >= b,
      f3 => {
        warn!("ref: unknown BRANCH funct3={f3:#x} at pc={:#010x}", self.pc);
        false
      }
    };
    let offset = if taken { imm_b(inst) } else { 4 };
    self.pc = self.pc.wrapping_add(offset);
  }

  fn execute_s(&mut self, inst: u32) {
    self.stat.store += 1;
    let addr = self.gpr[rs1(inst)].wrapping_add(imm_s(inst));
    let data = self.gpr[rs2(inst)];
    match funct3(inst) {
      0x0 => self.memory.write(addr, data, 0x1),
      0x1 => self.memory.write(addr, data, 0x3),
      0x2 => self.memory.write(addr, data, 0xf),
      f3 => warn!("ref: unknown STORE funct3={f3:#x} at pc={:#010x}", self.pc),
    }
    self.pc = self.pc.wrapping_add(4);
  }

  fn execute_u(&mut self, inst: u32) {
    self.stat.alu += 1;
    let imm = imm_u(inst);
    self.gpr[rd(inst)] = match opcode(inst) {
      OP_LUI => imm,
      _ => self.pc.wrapping_add(imm),
    };
    self.pc = self.pc.wrapping_add(4);
  }

  fn execute_j(&mut self, inst: u32) {
    self.stat.branch += 1;
    self.gpr[rd(inst)] = self.pc.wrapping_add(4);
    self.pc = self.pc.wrapping_add(imm_j(inst));
  }

  /// Vendor stream extension: fetched, otherwise a no-op.
  fn execute_stream(&mut self, _inst: u32) {
    self.pc = self.pc.wrapping_add(4);
  }
}
