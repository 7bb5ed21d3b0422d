use std::fmt;

use tracing::debug;

use crate::{
  bus::{MemoryPort, WordMemory},
  dut::CommitRecord,
  ref_module::{gpr_name, Simulator, A0},
};

/// Last physical register seen for each architectural register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameTable {
  table: [u8; 32],
}

impl RenameTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn lookup(&self, rd: usize) -> u8 {
    self.table[rd]
  }

  /// `prd == 0` means "no destination" and leaves the table alone.
  pub fn update(&mut self, rd: usize, prd: u8) {
    if prd != 0 {
      debug!("rename x{rd}({}) -> p{prd}", gpr_name(rd));
      self.table[rd] = prd;
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
  Pc { expected: u32, actual: u32 },
  Register { pc: u32, inst: u32, rd: usize, prd: u8, expected: u32, actual: u32 },
}

impl fmt::Display for Divergence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Divergence::Pc { expected, actual } => {
        write!(f, "pc mismatch! ref={expected:#010x}, dut={actual:#010x}")
      }
      Divergence::Register { pc, inst, rd, prd, expected, actual } => write!(
        f,
        "gpr{rd}({}) mismatch at pc {pc:#010x} (inst={inst:#010x}, preg={prd})! ref={expected:#x}, dut={actual:#x}",
        gpr_name(*rd)
      ),
    }
  }
}

/// Oracle plus the rename view needed to read the design's architectural state.
pub struct Difftest<M: MemoryPort = WordMemory> {
  reference: Simulator<M>,
  rename: RenameTable,
}

impl<M: MemoryPort> Difftest<M> {
  pub fn new(reference: Simulator<M>) -> Self {
    Self { reference, rename: RenameTable::new() }
  }

  pub fn reference(&self) -> &Simulator<M> {
    &self.reference
  }

  pub fn rename(&self) -> &RenameTable {
    &self.rename
  }

  /// Physical register currently holding a0.
  pub fn a0_preg(&self) -> u8 {
    self.rename.lookup(A0)
  }

  /// Replay one committed instruction on the oracle and compare. `read_preg` reads the
  /// design's physical register file.
  pub fn step(&mut self, record: &CommitRecord, read_preg: impl Fn(u8) -> u32) -> Result<(), Divergence> {
    self.rename.update(record.rd, record.prd);

    let ref_pc = self.reference.pc();
    if ref_pc != record.pc {
      return Err(Divergence::Pc { expected: ref_pc, actual: record.pc });
    }

    self.reference.step(1);

    let prd = self.rename.lookup(record.rd);
    let expected = self.reference.gpr(record.rd);
    let actual = read_preg(prd);
    if expected != actual {
      return Err(Divergence::Register {
        pc: record.pc,
        inst: record.inst,
        rd: record.rd,
        prd,
        expected,
        actual,
      });
    }
    Ok(())
  }
}
