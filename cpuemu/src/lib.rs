use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use plusarg::PlusArgMatcher;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod bus;
pub mod difftest;
pub mod drive;
pub mod dut;
pub mod image;
pub mod plusarg;
pub mod ref_module;
pub mod report;
pub mod stat;

use drive::{Driver, Outcome, EXIT_RESOURCE, EXIT_UNFINISHED};
use dut::HardwareModel;
use image::{ProgramImage, BASE_ADDR};
use stat::ProgressReporter;

pub const DEFAULT_STALL_THRESHOLD: u64 = 1000;

#[derive(Debug, Clone)]
pub struct SimArgs {
  /// Program image, flat binary or ELF. `None` runs a single halt.
  pub image: Option<PathBuf>,

  /// Commit log path
  pub log_file: Option<PathBuf>,

  /// Directory for the markdown report
  pub report_dir: Option<PathBuf>,

  pub log_level: String,

  /// Bus ready sequence seed, random when unset
  pub seed: Option<u64>,
  pub base_addr: u32,
  pub stall_threshold: u64,
  pub max_cycles: Option<u64>,
  pub progress_interval: Option<Duration>,

  #[cfg(feature = "trace")]
  pub dump_start: u64,
  #[cfg(feature = "trace")]
  pub dump_end: u64,
}

impl Default for SimArgs {
  fn default() -> Self {
    Self {
      image: None,
      log_file: None,
      report_dir: None,
      log_level: "info".into(),
      seed: None,
      base_addr: BASE_ADDR,
      stall_threshold: DEFAULT_STALL_THRESHOLD,
      max_cycles: None,
      progress_interval: Some(Duration::from_secs(1)),
      #[cfg(feature = "trace")]
      dump_start: 0,
      #[cfg(feature = "trace")]
      dump_end: 0,
    }
  }
}

impl SimArgs {
  pub fn setup_logger(&self) -> anyhow::Result<()> {
    let log_level: Level =
      self.log_level.parse().with_context(|| format!("invalid log level '{}'", self.log_level))?;
    let global_logger = FmtSubscriber::builder()
      .with_env_filter(EnvFilter::from_default_env())
      .with_max_level(log_level)
      .without_time()
      .with_target(false)
      .with_ansi(true)
      .compact()
      .finish();
    tracing::subscriber::set_global_default(global_logger).context("fail to setup log subscriber")?;
    Ok(())
  }

  pub fn from_plusargs(matcher: &PlusArgMatcher) -> anyhow::Result<Self> {
    let defaults = Self::default();
    let base_addr = match matcher.try_match_u64("base-addr")? {
      Some(addr) => u32::try_from(addr).context("+base-addr does not fit in 32 bits")?,
      None => defaults.base_addr,
    };
    let progress_interval = match matcher.try_match_u64("progress-ms")? {
      Some(0) => None,
      Some(ms) => Some(Duration::from_millis(ms)),
      None => defaults.progress_interval,
    };
    Ok(Self {
      image: matcher.try_match("image").map(PathBuf::from),
      log_file: matcher.try_match("log-file").map(PathBuf::from),
      report_dir: matcher.try_match("report-dir").map(PathBuf::from),
      log_level: matcher.try_match("log-level").unwrap_or("info").into(),
      seed: matcher.try_match_u64("seed")?,
      base_addr,
      stall_threshold: matcher.try_match_u64("stall-threshold")?.unwrap_or(DEFAULT_STALL_THRESHOLD),
      max_cycles: matcher.try_match_u64("max-cycles")?,
      progress_interval,
      #[cfg(feature = "trace")]
      dump_start: matcher.try_match_u64("dump-start")?.unwrap_or(0),
      #[cfg(feature = "trace")]
      dump_end: matcher.try_match_u64("dump-end")?.unwrap_or(0),
    })
  }
}

/// Load the image, reset `dut` and run it to completion. `Ok(None)` means the cycle
/// budget ran out first.
pub fn run_session<H: HardwareModel>(dut: H, args: &SimArgs) -> anyhow::Result<Option<Outcome>> {
  let image = ProgramImage::load(args.image.as_deref(), args.base_addr)?;
  let mut driver = Driver::new(dut, &image, args)?;
  info!("simulation started: {}", image.name);

  let progress =
    args.progress_interval.map(|interval| ProgressReporter::spawn(driver.stat().counters(), interval));
  driver.reset();
  let outcome = match args.max_cycles {
    Some(cycles) => driver.run_for(cycles),
    None => Some(driver.run()),
  };
  drop(progress);

  if outcome.is_none() {
    warn!("cycle budget exhausted after {} cycles", driver.stat().cycles());
  }
  driver.finish()?;
  Ok(outcome)
}

/// Process exit status for a finished session.
pub fn exit_code(result: &anyhow::Result<Option<Outcome>>) -> i32 {
  match result {
    Ok(Some(outcome)) => outcome.exit_code(),
    Ok(None) => EXIT_UNFINISHED,
    Err(_) => EXIT_RESOURCE,
  }
}
