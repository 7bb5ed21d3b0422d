pub mod decode;
pub mod disasm;
pub mod encode;
mod simulator;

pub use simulator::*;

use tracing::error;

use crate::bus::MemoryPort;

/// Map a GPR index to its ABI name.
pub fn gpr_name(idx: usize) -> &'static str {
  const NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
  ];
  NAMES.get(idx).copied().unwrap_or("??")
}

/// Architectural register holding the program's return value.
pub const A0: usize = 10;

impl<M: MemoryPort> Simulator<M> {
  /// Dump pc and the register file, four registers per line.
  pub fn display(&self) {
    error!("ref pc: {:#010x}", self.pc());
    for (i, regs) in self.gprs().chunks(4).enumerate() {
      let line: Vec<String> = regs
        .iter()
        .enumerate()
        .map(|(j, v)| {
          let idx = i * 4 + j;
          format!("x{idx:<2}({:>4})={v:#010x}", gpr_name(idx))
        })
        .collect();
      error!("  {}", line.join("  "));
    }
  }
}
