//! Hardware model doubles for driving the harness without a generated simulator.
#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, io, io::Write, rc::Rc};

use cpuemu::{
  bus::{AxiMaster, AxiSlave},
  dut::{CommitPort, HardwareModel, PerfCounters, NCOMMIT},
  image::{ProgramImage, BASE_ADDR},
  ref_module::{decode::*, encode::HALT, Simulator},
  SimArgs,
};

pub fn args(seed: u64) -> SimArgs {
  SimArgs { seed: Some(seed), progress_interval: None, ..Default::default() }
}

pub fn image(words: &[u32]) -> ProgramImage {
  ProgramImage::from_words("test", BASE_ADDR, words)
}

pub fn pc_of(index: u32) -> u32 {
  BASE_ADDR + 4 * index
}

/// `Write` handle whose bytes stay readable after it was boxed away.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.0.borrow()).into_owned()
  }
}

impl Write for SharedBuf {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.borrow_mut().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Detects rising clock edges outside reset.
#[derive(Default)]
struct Clock {
  high: bool,
  was_high: bool,
  reset: bool,
}

impl Clock {
  fn rising(&mut self) -> bool {
    let rising = self.high && !self.was_high;
    self.was_high = self.high;
    rising && !self.reset
  }
}

/// One cycle of a scripted run: what the commit lanes show and which physical registers
/// get written at that edge.
#[derive(Debug, Clone, Default)]
pub struct ScriptCycle {
  pub commits: Vec<(u32, u8)>,
  pub writes: Vec<(u8, u32)>,
}

impl ScriptCycle {
  pub fn commit(pc: u32, prd: u8, value: u32) -> Self {
    let writes = if prd != 0 { vec![(prd, value)] } else { vec![] };
    Self { commits: vec![(pc, prd)], writes }
  }

  pub fn idle() -> Self {
    Self::default()
  }
}

/// Replays a fixed commit script, one entry per rising edge, then goes quiet.
pub struct ScriptedDut {
  script: Vec<ScriptCycle>,
  edges: usize,
  clock: Clock,
  prf: [u32; 64],
  visible: [CommitPort; NCOMMIT],
}

impl ScriptedDut {
  pub fn new(script: Vec<ScriptCycle>) -> Self {
    Self { script, edges: 0, clock: Clock::default(), prf: [0; 64], visible: Default::default() }
  }

  /// Script with `idle` empty cycles in front of `rest`.
  pub fn after_idle(idle: usize, rest: Vec<ScriptCycle>) -> Self {
    let mut script = vec![ScriptCycle::idle(); idle];
    script.extend(rest);
    Self::new(script)
  }

  pub fn edges(&self) -> usize {
    self.edges
  }
}

impl HardwareModel for ScriptedDut {
  fn set_clock(&mut self, high: bool) {
    self.clock.high = high;
  }

  fn set_reset(&mut self, high: bool) {
    self.clock.reset = high;
  }

  fn eval(&mut self) {
    if !self.clock.rising() {
      return;
    }
    self.visible = Default::default();
    if let Some(cycle) = self.script.get(self.edges) {
      for (preg, value) in &cycle.writes {
        self.prf[*preg as usize] = *value;
      }
      for (lane, (pc, prd)) in cycle.commits.iter().enumerate() {
        self.visible[lane] = CommitPort { valid: true, pc: *pc, prd: *prd, ..Default::default() };
      }
    }
    self.edges += 1;
  }

  fn axi_master(&self) -> AxiMaster {
    AxiMaster::default()
  }

  fn drive_axi(&mut self, _slave: &AxiSlave) {}

  fn commit(&self, lane: usize) -> CommitPort {
    self.visible[lane]
  }

  fn debug_reg(&self, preg: u8) -> u32 {
    self.prf[preg as usize]
  }
}

/// Deliberate misbehaviour for `PipelineDut`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
  /// xor applied to the result of the instruction at this pc
  pub corrupt: Option<(u32, u32)>,
  /// report this pc off by 4 at commit
  pub misreport_pc: Option<u32>,
  /// stop committing after this many instructions
  pub hang_after: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
  FetchReq,
  FetchData,
  StoreReq,
  StoreData,
  StoreResp,
  Halted,
}

#[derive(Debug, Clone, Copy, Default)]
struct PendingStore {
  addr: u32,
  data: u32,
  size: u8,
  strobe: u8,
}

/// In-order core that fetches every instruction over AXI read, performs stores over AXI
/// write, renames through a free list and retires up to two instructions per cycle.
pub struct PipelineDut {
  engine: Simulator,
  clock: Clock,
  cycle: u64,
  stage: Stage,
  fetch_start: u64,
  store: PendingStore,

  master: AxiMaster,
  slave: AxiSlave,

  prf: [u32; 64],
  map: [u8; 32],
  free: VecDeque<u8>,
  retire: VecDeque<CommitPort>,
  visible: [CommitPort; NCOMMIT],

  /// hold retirement until two instructions are ready
  pub pair_commits: bool,
  pub faults: Faults,
  committed: u64,
  perf: PerfCounters,
  last_fetch: u32,
}

impl PipelineDut {
  pub fn new(image: &ProgramImage) -> Self {
    Self {
      engine: Simulator::load(image),
      clock: Clock::default(),
      cycle: 0,
      stage: Stage::FetchReq,
      fetch_start: 0,
      store: PendingStore::default(),
      master: AxiMaster::default(),
      slave: AxiSlave::default(),
      prf: [0; 64],
      map: [0; 32],
      free: (1..64).collect(),
      retire: VecDeque::new(),
      visible: Default::default(),
      pair_commits: false,
      faults: Faults::default(),
      committed: 0,
      perf: PerfCounters::default(),
      last_fetch: 0,
    }
  }

  pub fn with_faults(mut self, faults: Faults) -> Self {
    self.faults = faults;
    self
  }

  pub fn paired(mut self) -> Self {
    self.pair_commits = true;
    self
  }

  pub fn committed(&self) -> u64 {
    self.committed
  }

  pub fn last_fetch(&self) -> u32 {
    self.last_fetch
  }

  fn rising_edge(&mut self) {
    self.cycle += 1;
    self.release();
    let slave = self.slave;
    match self.stage {
      Stage::FetchReq => {
        if slave.arready {
          self.stage = Stage::FetchData;
        }
      }
      Stage::FetchData => {
        if slave.rvalid && slave.rlast {
          self.last_fetch = slave.rdata;
          self.execute(slave.rdata);
        }
      }
      Stage::StoreReq => {
        if slave.awready {
          self.stage = Stage::StoreData;
        }
      }
      Stage::StoreData => {
        if slave.wready {
          self.stage = Stage::StoreResp;
        }
      }
      Stage::StoreResp => {
        if slave.bvalid {
          self.stage = Stage::FetchReq;
        }
      }
      Stage::Halted => {}
    }
    self.master = self.outputs();
  }

  fn release(&mut self) {
    self.visible = Default::default();
    if self.faults.hang_after.is_some_and(|n| self.committed >= n) {
      return;
    }
    let halting = self.stage == Stage::Halted;
    if self.pair_commits && self.retire.len() < NCOMMIT && !halting {
      return;
    }
    for lane in 0..NCOMMIT {
      let Some(port) = self.retire.pop_front() else { break };
      self.visible[lane] = port;
      self.committed += 1;
    }
  }

  fn execute(&mut self, fetched: u32) {
    let pc = self.engine.pc();
    let mut port = CommitPort { valid: true, pc, prd: 0, ..Default::default() };
    port.stage_cycles = [self.fetch_start; 11];
    port.stage_cycles[10] = self.cycle;
    self.fetch_start = self.cycle;
    if self.faults.misreport_pc == Some(pc) {
      port.pc = pc.wrapping_add(4);
    }

    if fetched == HALT {
      self.retire.push_back(port);
      self.stage = Stage::Halted;
      return;
    }

    let inst = fetched;
    let is_store = opcode(inst) == OP_STORE;
    if is_store {
      let size = funct3(inst) as u8 & 0x3;
      self.store = PendingStore {
        addr: self.engine.gpr(rs1(inst)).wrapping_add(imm_s(inst)),
        data: self.engine.gpr(rs2(inst)),
        size,
        strobe: [0x1, 0x3, 0xf, 0xf][size as usize],
      };
    }
    if is_branch(inst) {
      self.perf.branch += 1;
    }

    self.engine.step(1);

    let rd = rd(inst);
    let writes_rd =
      matches!(opcode(inst), OP_LUI | OP_AUIPC | OP_JAL | OP_JALR | OP_LOAD | OP_IMM | OP_REG);
    if writes_rd && rd != 0 {
      let mut value = self.engine.gpr(rd);
      if let Some((at, mask)) = self.faults.corrupt {
        if at == pc {
          value ^= mask;
        }
      }
      let preg = self.free.pop_front().unwrap_or(0);
      self.prf[preg as usize] = value;
      let old = std::mem::replace(&mut self.map[rd], preg);
      if old != 0 {
        self.free.push_back(old);
      }
      port.prd = preg;
    }
    self.retire.push_back(port);
    self.stage = if is_store { Stage::StoreReq } else { Stage::FetchReq };
  }

  fn outputs(&self) -> AxiMaster {
    let mut m = AxiMaster::default();
    match self.stage {
      Stage::FetchReq => {
        m.arvalid = true;
        m.araddr = self.engine.pc();
        m.arsize = 2;
        m.arburst = 1;
      }
      Stage::FetchData => m.rready = true,
      Stage::StoreReq => {
        m.awvalid = true;
        m.awaddr = self.store.addr;
        m.awsize = self.store.size;
        m.awburst = 1;
        m.wstrb = self.store.strobe;
      }
      Stage::StoreData => {
        m.wvalid = true;
        m.wdata = self.store.data;
        m.wstrb = self.store.strobe;
        m.wlast = true;
      }
      Stage::StoreResp => m.bready = true,
      Stage::Halted => {}
    }
    m
  }
}

impl HardwareModel for PipelineDut {
  fn set_clock(&mut self, high: bool) {
    self.clock.high = high;
  }

  fn set_reset(&mut self, high: bool) {
    self.clock.reset = high;
  }

  fn eval(&mut self) {
    if self.clock.rising() {
      self.rising_edge();
    } else if self.cycle == 0 {
      self.master = self.outputs();
    }
  }

  fn axi_master(&self) -> AxiMaster {
    self.master
  }

  fn drive_axi(&mut self, slave: &AxiSlave) {
    self.slave = *slave;
  }

  fn commit(&self, lane: usize) -> CommitPort {
    self.visible[lane]
  }

  fn debug_reg(&self, preg: u8) -> u32 {
    self.prf[preg as usize]
  }

  fn perf_counters(&self) -> PerfCounters {
    self.perf
  }
}
