//! Markdown run report.

use std::{
  fmt::{self, Write as _},
  fs,
  path::{Path, PathBuf},
};

use anyhow::Context;

use crate::{dut::PerfCounters, ref_module::InstStatistic, stat::Statistic};

fn percent(part: u64, whole: u64) -> f64 {
  if whole == 0 {
    0.0
  } else {
    part as f64 * 100.0 / whole as f64
  }
}

/// Render the report for one run.
pub fn render_markdown(
  name: &str,
  stat: &Statistic,
  insts: InstStatistic,
  perf: &PerfCounters,
) -> Result<String, fmt::Error> {
  let mut out = String::new();
  write_report(&mut out, name, stat, insts, perf)?;
  Ok(out)
}

fn write_report(
  out: &mut impl fmt::Write,
  name: &str,
  stat: &Statistic,
  insts: InstStatistic,
  perf: &PerfCounters,
) -> fmt::Result {
  let cycles = stat.cycles();
  let total = stat.instructions();

  writeln!(out, "## Program summary")?;
  writeln!(out, "| Program | Cycles | Instructions | IPC |")?;
  writeln!(out, "| --- | --- | --- | --- |")?;
  writeln!(out, "| {name} | {cycles} | {total} | {:.4} |", stat.ipc())?;

  writeln!(out, "### Instruction mix")?;
  writeln!(out, "| Class | Count | Share |")?;
  writeln!(out, "| --- | --- | --- |")?;
  for (class, count) in [
    ("ALU", insts.alu),
    ("Branch", insts.branch),
    ("Load", insts.load),
    ("Store", insts.store),
    ("Mul", insts.mul),
    ("Div", insts.div),
  ] {
    writeln!(out, "| {class} | {count} | {:.2}% |", percent(count, total))?;
  }

  writeln!(out, "## Branch prediction")?;
  writeln!(out, "| Kind | Count | Correct | Accuracy |")?;
  writeln!(out, "| --- | --- | --- | --- |")?;
  for (kind, all, fail) in [
    ("Branch", perf.branch, perf.branch_fail),
    ("Call", perf.call, perf.call_fail),
    ("Ret", perf.ret, perf.ret_fail),
  ] {
    let correct = all.saturating_sub(fail);
    writeln!(out, "| {kind} | {all} | {correct} | {:.2}% |", percent(correct, all))?;
  }

  writeln!(out, "## Caches")?;
  writeln!(out, "| Port | Accesses | Hits | Hit rate |")?;
  writeln!(out, "| --- | --- | --- | --- |")?;
  for (port, visit, hit) in [
    ("ICache Read", perf.icache_visit, perf.icache_hit),
    ("DCache Read", perf.dcache_read_visit, perf.dcache_read_hit),
    ("DCache Write", perf.dcache_write_visit, perf.dcache_write_hit),
    ("L2 ICache", perf.l2_icache_visit, perf.l2_icache_hit),
    ("L2 DCache", perf.l2_dcache_visit, perf.l2_dcache_hit),
  ] {
    writeln!(out, "| {port} | {visit} | {hit} | {:.2}% |", percent(hit, visit))?;
  }

  writeln!(out, "## Pipeline stalls")?;
  let sections: [(&str, &[(&str, u64)]); 3] = [
    (
      "Frontend",
      &[
        ("ICache miss", perf.icache_miss_cycle),
        ("Fetch queue full", perf.fetch_queue_full_cycle),
        ("Fetch queue empty", perf.fetch_queue_empty_cycle),
        ("Free list empty", perf.free_list_empty_cycle),
      ],
    ),
    ("Dispatch", &[("ROB full", perf.rob_full_cycle), ("Branch data buffer full", perf.bdb_full_cycle)]),
    (
      "Backend",
      &[
        ("Arith issue queue full", perf.arith_iq_full_cycle),
        ("MulDiv issue queue full", perf.muldiv_iq_full_cycle),
        ("LSU issue queue full", perf.lsu_iq_full_cycle),
        ("Divider busy", perf.divider_busy_cycle),
        ("DCache miss", perf.dcache_miss_cycle),
        ("Store buffer full", perf.store_buffer_full_cycle),
      ],
    ),
  ];
  for (section, causes) in sections {
    writeln!(out, "### {section}")?;
    writeln!(out, "| Cause | Cycles | Share |")?;
    writeln!(out, "| --- | --- | --- |")?;
    for (cause, stalled) in causes {
      writeln!(out, "| {cause} | {stalled} | {:.2}% |", percent(*stalled, cycles))?;
    }
  }
  Ok(())
}

/// Write `report-<name>.md` under `dir`, creating the directory if needed.
pub fn write_markdown(
  dir: &Path,
  name: &str,
  stat: &Statistic,
  insts: InstStatistic,
  perf: &PerfCounters,
) -> anyhow::Result<PathBuf> {
  fs::create_dir_all(dir).with_context(|| format!("creating report dir {}", dir.display()))?;
  let path = dir.join(format!("report-{name}.md"));
  let markdown = render_markdown(name, stat, insts, perf).context("rendering report")?;
  fs::write(&path, markdown)
    .with_context(|| format!("writing report {}", path.display()))?;
  Ok(path)
}
