use std::str::FromStr;

use regex::{Captures, Regex};
use riscv_isa::{decode_full, Target};

use super::decode::{funct3, opcode, OP_STREAM};
use super::encode::HALT;

pub fn stream_name(inst: u32) -> &'static str {
  match funct3(inst) {
    0x0 => "cfg_i",
    0x1 => "cfg_store",
    0x2 => "cal_stream",
    0x3 => "step_i",
    0x5 => "cfg_load",
    _ => "unknown stream",
  }
}

pub struct Disassembler {
  target: Target,
  operand: Regex,
}

impl Disassembler {
  pub fn new() -> anyhow::Result<Self> {
    let target =
      Target::from_str("RV32IM").map_err(|_| anyhow::anyhow!("riscv-isa rejects target RV32IM"))?;
    let operand = Regex::new(
      r"(?x)
        (-?\b\d+\b)\((x\d+)\)   # offset(base)
        |
        \b(x\d+)\b              # plain register
      ",
    )?;
    Ok(Self { target, operand })
  }

  pub fn disasm(&self, inst: u32) -> String {
    if inst == HALT {
      return "halt".to_string();
    }
    if opcode(inst) == OP_STREAM {
      return stream_name(inst).to_string();
    }
    decode_full(inst, &self.target).to_string()
  }

  /// Disassembly with every register operand followed by its value in `gpr`, and every
  /// `offset(base)` operand followed by the effective address.
  pub fn annotate(&self, inst: u32, gpr: &[u32; 32]) -> String {
    self.annotate_text(&self.disasm(inst), gpr)
  }

  fn annotate_text(&self, raw: &str, gpr: &[u32; 32]) -> String {
    let reg_value = |name: &str| name[1..].parse::<usize>().ok().filter(|i| *i < 32).map(|i| gpr[i]);
    self
      .operand
      .replace_all(raw, |caps: &Captures| {
        if let (Some(offset), Some(base)) = (caps.get(1), caps.get(2)) {
          let offset: i32 = offset.as_str().parse().unwrap_or(0);
          match reg_value(base.as_str()) {
            Some(value) => format!(
              "{}({}<{:#x}>)=<{:#x}>",
              offset,
              base.as_str(),
              value,
              value.wrapping_add(offset as u32)
            ),
            None => caps[0].to_string(),
          }
        } else if let Some(reg) = caps.get(3) {
          match reg_value(reg.as_str()) {
            Some(value) => format!("{}<{:#x}>", reg.as_str(), value),
            None => caps[0].to_string(),
          }
        } else {
          caps[0].to_string()
        }
      })
      .to_string()
  }
}
