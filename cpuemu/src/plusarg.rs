use std::collections::HashMap;

use anyhow::Context;

/// `+name=value` style options, as simulators pass them. Arguments without a leading
/// `+` are ignored; a bare `+flag` maps to an empty value.
#[derive(Debug, Clone, Default)]
pub struct PlusArgMatcher {
  plusargs: HashMap<String, String>,
}

impl PlusArgMatcher {
  pub fn from_args() -> Self {
    Self::parse(std::env::args().skip(1))
  }

  pub fn parse<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let plusargs = args
      .into_iter()
      .filter_map(|arg| {
        let arg = arg.as_ref().strip_prefix('+')?;
        let (name, value) = arg.split_once('=').unwrap_or((arg, ""));
        Some((name.to_string(), value.to_string()))
      })
      .collect();
    Self { plusargs }
  }

  pub fn try_match(&self, name: &str) -> Option<&str> {
    self.plusargs.get(name).map(String::as_str)
  }

  pub fn match_(&self, name: &str) -> anyhow::Result<&str> {
    self.try_match(name).with_context(|| format!("required plusarg '+{name}=' not found"))
  }

  /// Numeric plusarg in decimal or `0x` hex.
  pub fn try_match_u64(&self, name: &str) -> anyhow::Result<Option<u64>> {
    self
      .try_match(name)
      .map(|raw| parse_u64(raw).with_context(|| format!("invalid value '{raw}' for +{name}")))
      .transpose()
  }
}

fn parse_u64(raw: &str) -> anyhow::Result<u64> {
  let raw = raw.trim().replace('_', "");
  let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
    Some(hex) => u64::from_str_radix(hex, 16)?,
    None => raw.parse()?,
  };
  Ok(value)
}
