use std::{
  fmt, fs,
  io::BufWriter,
  path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{error, info};

use crate::{
  bus::{uart::Uart, AxiMemory, MmioDevice, RandomSequence},
  difftest::{Difftest, Divergence},
  dut::{CommitRecord, HardwareModel},
  image::ProgramImage,
  ref_module::{
    decode::{is_branch, rd},
    disasm::Disassembler,
    encode::HALT,
    Simulator,
  },
  report,
  stat::Statistic,
  SimArgs,
};

/// Exit status for failures that happen before the first cycle.
pub const EXIT_RESOURCE: i32 = -4;

/// Exit status when the cycle budget ran out before the run ended.
pub const EXIT_UNFINISHED: i32 = 1;

/// How a run ended. Exactly one of these ends every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// Halt committed with a0 == 0.
  GoodTrap,
  /// Halt committed with a0 != 0.
  BadTrap { a0: u32 },
  Divergence(Divergence),
  StallTimeout { stall_cycles: u64 },
}

impl Outcome {
  pub fn exit_code(&self) -> i32 {
    match self {
      Outcome::GoodTrap => 0,
      Outcome::BadTrap { .. } => -1,
      Outcome::Divergence(_) => -2,
      Outcome::StallTimeout { .. } => -3,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Outcome::GoodTrap)
  }
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Outcome::GoodTrap => write!(f, "simulation ended successfully"),
      Outcome::BadTrap { a0 } => write!(f, "simulation ended with a0 = {a0:#x}"),
      Outcome::Divergence(d) => write!(f, "difftest failed: {d}"),
      Outcome::StallTimeout { stall_cycles } => {
        write!(f, "stalled for {stall_cycles} cycles without committing instructions")
      }
    }
  }
}

#[cfg(feature = "trace")]
pub struct DumpControl {
  dump_start: u64,
  dump_end: u64,

  dump_started: bool,
}

#[cfg(feature = "trace")]
impl DumpControl {
  fn new(dump_start: u64, dump_end: u64) -> Self {
    Self { dump_start, dump_end, dump_started: false }
  }

  pub fn isend(&self, cycle: u64) -> bool {
    self.dump_end != 0 && cycle > self.dump_end
  }

  /// Whether `cycle` falls in the dump window.
  pub fn try_start(&mut self, cycle: u64) -> bool {
    if cycle >= self.dump_start && !self.isend(cycle) {
      if !self.dump_started {
        info!("[{cycle}] start dumping waveform");
        self.dump_started = true;
      }
      return true;
    }
    false
  }
}

/// Owns the design under test and everything that checks it.
pub struct Driver<H: HardwareModel> {
  dut: H,
  bus: AxiMemory,
  difftest: Difftest,
  stat: Statistic,
  disasm: Disassembler,

  #[cfg(feature = "trace")]
  dump_control: DumpControl,

  image_name: String,
  report_dir: Option<PathBuf>,
  stall_threshold: u64,
  stall_count: u64,
  outcome: Option<Outcome>,
}

impl<H: HardwareModel> Driver<H> {
  /// Driver whose console device writes to stdout.
  pub fn new(dut: H, image: &ProgramImage, args: &SimArgs) -> anyhow::Result<Self> {
    Self::with_device(dut, image, args, Box::new(Uart::stdout()))
  }

  pub fn with_device(
    dut: H,
    image: &ProgramImage,
    args: &SimArgs,
    device: Box<dyn MmioDevice>,
  ) -> anyhow::Result<Self> {
    let mut stat = Statistic::new();
    if let Some(path) = &args.log_file {
      let file = fs::File::create(path).with_context(|| format!("creating commit log {}", path.display()))?;
      stat = stat.with_commit_log(Box::new(BufWriter::new(file)));
    }
    if let Some(dir) = &args.report_dir {
      fs::create_dir_all(dir).with_context(|| format!("creating report dir {}", dir.display()))?;
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    info!("bus ready seed: {seed}");
    let bus = AxiMemory::new(image.to_memory(), device, Box::new(RandomSequence::seeded(seed)));

    Ok(Self {
      dut,
      bus,
      difftest: Difftest::new(Simulator::load(image)),
      stat,
      disasm: Disassembler::new()?,
      #[cfg(feature = "trace")]
      dump_control: DumpControl::new(args.dump_start, args.dump_end),
      image_name: image.name.clone(),
      report_dir: args.report_dir.clone(),
      stall_threshold: args.stall_threshold,
      stall_count: 0,
      outcome: None,
    })
  }

  pub fn dut(&self) -> &H {
    &self.dut
  }

  pub fn dut_mut(&mut self) -> &mut H {
    &mut self.dut
  }

  pub fn bus(&self) -> &AxiMemory {
    &self.bus
  }

  pub fn difftest(&self) -> &Difftest {
    &self.difftest
  }

  pub fn stat(&self) -> &Statistic {
    &self.stat
  }

  pub fn stall_count(&self) -> u64 {
    self.stall_count
  }

  pub fn outcome(&self) -> Option<&Outcome> {
    self.outcome.as_ref()
  }

  fn clock_edge(&mut self) {
    self.dut.set_clock(false);
    self.dut.eval();
    self.dut.set_clock(true);
    self.dut.eval();
  }

  /// Hold reset across one rising edge.
  pub fn reset(&mut self) {
    self.dut.set_reset(true);
    self.clock_edge();
    self.dut.set_reset(false);
  }

  /// Advance one cycle. Once an outcome is reached it is returned again without
  /// touching the design.
  pub fn tick(&mut self) -> Option<Outcome> {
    if let Some(outcome) = &self.outcome {
      return Some(outcome.clone());
    }

    self.clock_edge();
    self.stat.add_cycle();

    #[cfg(feature = "trace")]
    {
      let cycle = self.stat.cycles();
      if self.dump_control.try_start(cycle) {
        self.dut.dump_wave(cycle);
      }
    }

    if let Some(outcome) = self.commit() {
      return Some(self.finish_with(outcome));
    }

    let slave = self.bus.service(&self.dut.axi_master());
    self.dut.drive_axi(&slave);
    None
  }

  fn commit(&mut self) -> Option<Outcome> {
    let mut committed = false;
    let mut lane0_committed = false;
    for lane in 0..self.dut.commit_width() {
      let port = self.dut.commit(lane);
      if !port.valid {
        continue;
      }
      committed = true;
      lane0_committed |= lane == 0;
      self.stall_count = 0;
      self.stat.add_instruction(port.pc);

      let inst = self.bus.debug_read(port.pc);
      let asm = self.disasm.disasm(inst);
      self.stat.log_commit(&port, &asm, is_branch(inst));

      if inst == HALT {
        let a0 = self.dut.debug_reg(self.difftest.a0_preg());
        return Some(if a0 == 0 { Outcome::GoodTrap } else { Outcome::BadTrap { a0 } });
      }

      let record = CommitRecord { pc: port.pc, inst, rd: rd(inst), prd: port.prd, lane };
      let dut = &self.dut;
      if let Err(divergence) = self.difftest.step(&record, |preg| dut.debug_reg(preg)) {
        self.report_divergence(&record, &divergence);
        return Some(Outcome::Divergence(divergence));
      }
    }
    if lane0_committed {
      self.stat.mark_commit_cycle();
    }

    if !committed {
      self.stall_count += 1;
      if self.stall_count > self.stall_threshold {
        error!(
          "[{}] no instruction committed for {} cycles (threshold={})",
          self.stat.cycles(),
          self.stall_count,
          self.stall_threshold
        );
        return Some(Outcome::StallTimeout { stall_cycles: self.stall_count });
      }
    }
    None
  }

  fn report_divergence(&self, record: &CommitRecord, divergence: &Divergence) {
    error!("[{}] lane {}: {divergence}", self.stat.cycles(), record.lane);
    let reference = self.difftest.reference();
    error!("  {:#010x}: {}", record.pc, self.disasm.annotate(record.inst, reference.gprs()));
    reference.display();
  }

  fn finish_with(&mut self, outcome: Outcome) -> Outcome {
    if outcome.is_success() {
      info!("[{}] {outcome}", self.stat.cycles());
    } else {
      error!("[{}] {outcome}", self.stat.cycles());
    }
    self.outcome = Some(outcome.clone());
    outcome
  }

  /// Tick until an outcome.
  pub fn run(&mut self) -> Outcome {
    loop {
      if let Some(outcome) = self.tick() {
        return outcome;
      }
    }
  }

  /// Tick at most `cycles` times.
  pub fn run_for(&mut self, cycles: u64) -> Option<Outcome> {
    for _ in 0..cycles {
      if let Some(outcome) = self.tick() {
        return Some(outcome);
      }
    }
    self.outcome.clone()
  }

  /// Print the end-of-run summary and write the report, if one was requested.
  pub fn finish(&mut self) -> anyhow::Result<Option<PathBuf>> {
    self.stat.flush();
    self.stat.print_last_instructions(&self.bus);
    self.stat.print_performance();

    let Some(dir) = self.report_dir.as_deref() else {
      return Ok(None);
    };
    self.write_report(dir).map(Some)
  }

  fn write_report(&self, dir: &Path) -> anyhow::Result<PathBuf> {
    let path = report::write_markdown(
      dir,
      &self.image_name,
      &self.stat,
      self.difftest.reference().inst_statistic(),
      &self.dut.perf_counters(),
    )?;
    info!("report written to {}", path.display());
    Ok(path)
  }
}
