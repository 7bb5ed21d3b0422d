use std::{
  io::Write,
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use tracing::{info, warn};

use crate::{bus::AxiMemory, dut::CommitPort};

const PC_RING_LEN: usize = 8;

/// Counters shared with the progress thread. Relaxed ordering is enough; readers only
/// want a recent value.
#[derive(Debug, Default)]
pub struct SharedCounters {
  cycles: AtomicU64,
  insts: AtomicU64,
}

impl SharedCounters {
  pub fn cycles(&self) -> u64 {
    self.cycles.load(Ordering::Relaxed)
  }

  pub fn instructions(&self) -> u64 {
    self.insts.load(Ordering::Relaxed)
  }

  pub fn ipc(&self) -> f64 {
    ipc(self.instructions(), self.cycles())
  }
}

fn ipc(insts: u64, cycles: u64) -> f64 {
  if cycles == 0 {
    0.0
  } else {
    insts as f64 / cycles as f64
  }
}

/// Run-wide counters, the recent-PC ring and the optional commit log.
pub struct Statistic {
  counters: Arc<SharedCounters>,

  pc_ring: [u32; PC_RING_LEN],
  pc_ring_index: usize,
  pc_ring_len: usize,

  seq: u64,
  last_commit_cycle: u64,
  commit_log: Option<Box<dyn Write>>,
}

impl Default for Statistic {
  fn default() -> Self {
    Self::new()
  }
}

impl Statistic {
  pub fn new() -> Self {
    Self {
      counters: Arc::default(),
      pc_ring: [0; PC_RING_LEN],
      pc_ring_index: 0,
      pc_ring_len: 0,
      seq: 0,
      last_commit_cycle: 0,
      commit_log: None,
    }
  }

  pub fn with_commit_log(mut self, sink: Box<dyn Write>) -> Self {
    self.commit_log = Some(sink);
    self
  }

  pub fn counters(&self) -> Arc<SharedCounters> {
    Arc::clone(&self.counters)
  }

  pub fn cycles(&self) -> u64 {
    self.counters.cycles()
  }

  pub fn instructions(&self) -> u64 {
    self.counters.instructions()
  }

  pub fn ipc(&self) -> f64 {
    self.counters.ipc()
  }

  pub fn add_cycle(&self) {
    self.counters.cycles.fetch_add(1, Ordering::Relaxed);
  }

  pub fn add_instruction(&mut self, pc: u32) {
    self.counters.insts.fetch_add(1, Ordering::Relaxed);
    self.pc_ring[self.pc_ring_index] = pc;
    self.pc_ring_index = (self.pc_ring_index + 1) % PC_RING_LEN;
    self.pc_ring_len = (self.pc_ring_len + 1).min(PC_RING_LEN);
  }

  /// Most recent committed PCs, oldest first.
  pub fn recent_pcs(&self) -> Vec<u32> {
    let start = (self.pc_ring_index + PC_RING_LEN - self.pc_ring_len) % PC_RING_LEN;
    (0..self.pc_ring_len).map(|i| self.pc_ring[(start + i) % PC_RING_LEN]).collect()
  }

  /// Mark the current cycle as the last one lane 0 committed in.
  pub fn mark_commit_cycle(&mut self) {
    self.last_commit_cycle = self.cycles();
  }

  /// Append one line to the commit log:
  /// `seq,0xpc,"asm",last_commit_cycle,<stage+1 ...>,cycle,is_branch`
  pub fn log_commit(&mut self, port: &CommitPort, asm: &str, is_branch: bool) {
    let seq = self.seq;
    self.seq += 1;
    let Some(sink) = self.commit_log.as_mut() else {
      return;
    };
    let mut line = format!("{seq},{:#x},\"{asm}\",{}", port.pc, self.last_commit_cycle);
    for cycle in port.stage_cycles {
      line.push_str(&format!(",{}", cycle + 1));
    }
    line.push_str(&format!(",{},{}", self.counters.cycles(), u8::from(is_branch)));
    if let Err(err) = writeln!(sink, "{line}") {
      warn!("commit log write failed, disabling it: {err}");
      self.commit_log = None;
    }
  }

  pub fn flush(&mut self) {
    if let Some(sink) = self.commit_log.as_mut() {
      if let Err(err) = sink.flush() {
        warn!("commit log flush failed: {err}");
      }
    }
  }

  /// `pc: inst` for the recent commits, read through the bus-visible memory.
  pub fn last_instructions(&self, bus: &AxiMemory) -> Vec<String> {
    self.recent_pcs().into_iter().map(|pc| format!("{pc:08x}: {:08x}", bus.debug_read(pc))).collect()
  }

  pub fn print_last_instructions(&self, bus: &AxiMemory) {
    info!("last {} instructions:", self.pc_ring_len);
    for line in self.last_instructions(bus) {
      info!("  {line}");
    }
  }

  pub fn print_performance(&self) {
    info!("total cycles: {}, total insts: {}, IPC: {:.4}", self.cycles(), self.instructions(), self.ipc());
  }
}

/// Background thread that logs progress until dropped.
pub struct ProgressReporter {
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
  pub fn spawn(counters: Arc<SharedCounters>, interval: Duration) -> Self {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = thread::spawn(move || loop {
      thread::park_timeout(interval);
      if flag.load(Ordering::Relaxed) {
        break;
      }
      info!("cycles: {}, IPC: {:.4}", counters.cycles(), counters.ipc());
    });
    Self { stop, handle: Some(handle) }
  }
}

impl Drop for ProgressReporter {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    if let Some(handle) = self.handle.take() {
      handle.thread().unpark();
      let _ = handle.join();
    }
  }
}
