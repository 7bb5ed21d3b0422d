//! Boundary between the harness and a cycle-evaluated CPU model.

use crate::bus::{AxiMaster, AxiSlave};

/// Commit lanes of a dual-retire design.
pub const NCOMMIT: usize = 2;

pub const STAGE_NAMES: [&str; 11] =
  ["fetch", "preDecode", "decode", "dispatch", "issue", "readOp", "exe", "exe1", "exe2", "wb", "wbROB"];

/// One commit lane of the ROB dequeue debug port, as sampled after a clock edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitPort {
  pub valid: bool,
  pub pc: u32,
  /// physical destination, 0 when the instruction writes no register
  pub prd: u8,
  /// cycle at which the instruction left each stage, indexed like `STAGE_NAMES`
  pub stage_cycles: [u64; STAGE_NAMES.len()],
}

/// A committed instruction as the difftest sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRecord {
  pub pc: u32,
  pub inst: u32,
  pub rd: usize,
  pub prd: u8,
  pub lane: usize,
}

/// Debug performance counters. Only the report reads these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfCounters {
  pub branch: u64,
  pub branch_fail: u64,
  pub call: u64,
  pub call_fail: u64,
  pub ret: u64,
  pub ret_fail: u64,

  pub icache_visit: u64,
  pub icache_hit: u64,
  pub dcache_read_visit: u64,
  pub dcache_read_hit: u64,
  pub dcache_write_visit: u64,
  pub dcache_write_hit: u64,
  pub l2_icache_visit: u64,
  pub l2_icache_hit: u64,
  pub l2_dcache_visit: u64,
  pub l2_dcache_hit: u64,

  pub icache_miss_cycle: u64,
  pub fetch_queue_full_cycle: u64,
  pub fetch_queue_empty_cycle: u64,
  pub free_list_empty_cycle: u64,
  pub rob_full_cycle: u64,
  pub bdb_full_cycle: u64,
  pub arith_iq_full_cycle: u64,
  pub muldiv_iq_full_cycle: u64,
  pub lsu_iq_full_cycle: u64,
  pub divider_busy_cycle: u64,
  pub dcache_miss_cycle: u64,
  pub store_buffer_full_cycle: u64,
}

/// What the harness needs from a hardware model. Implementations wrap a generated
/// simulator and translate these calls to its signal names.
pub trait HardwareModel {
  fn set_clock(&mut self, high: bool);
  fn set_reset(&mut self, high: bool);
  /// Settle combinational logic; a rising clock since the last call latches state.
  fn eval(&mut self);

  fn axi_master(&self) -> AxiMaster;
  fn drive_axi(&mut self, slave: &AxiSlave);

  fn commit_width(&self) -> usize {
    NCOMMIT
  }
  fn commit(&self, lane: usize) -> CommitPort;
  /// Physical register file debug port.
  fn debug_reg(&self, preg: u8) -> u32;

  fn perf_counters(&self) -> PerfCounters {
    PerfCounters::default()
  }

  /// Waveform hook, called once per cycle while dumping is enabled.
  fn dump_wave(&mut self, _time: u64) {}
}
