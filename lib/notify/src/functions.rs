use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tera::{Function, Result as TeraResult, Value, to_value};

pub struct FormatTime;

impl Function for FormatTime {
  fn call(&self, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let timestamp = args
      .get("time")
      .and_then(Value::as_str)
      .ok_or_else(|| tera::Error::msg("formatTime requires a `time` argument"))?;
    let layout = args
      .get("layout")
      .and_then(Value::as_str)
      .unwrap_or("%Y-%m-%d %H:%M:%S");
    let parsed: DateTime<Utc> = timestamp
      .parse()
      .map_err(|e| tera::Error::msg(format!("invalid time '{timestamp}': {e}")))?;
    to_value(parsed.format(layout).to_string()).map_err(tera::Error::json)
  }
}

pub struct FormatBytesBin;

impl Function for FormatBytesBin {
  fn call(&self, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let bytes = args
      .get("bytes")
      .and_then(Value::as_u64)
      .ok_or_else(|| tera::Error::msg("formatBytesBin requires a `bytes` argument"))?;
    to_value(format_bytes(bytes, 1024.0, &["B", "KiB", "MiB", "GiB", "TiB"]))
      .map_err(tera::Error::json)
  }
}

pub struct FormatBytesDec;

impl Function for FormatBytesDec {
  fn call(&self, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let bytes = args
      .get("bytes")
      .and_then(Value::as_u64)
      .ok_or_else(|| tera::Error::msg("formatBytesDec requires a `bytes` argument"))?;
    to_value(format_bytes(bytes, 1000.0, &["B", "KB", "MB", "GB", "TB"]))
      .map_err(tera::Error::json)
  }
}

fn format_bytes(bytes: u64, base: f64, units: &[&str]) -> String {
  let mut value = bytes as f64;
  let mut unit_index = 0;
  while value >= base && unit_index < units.len() - 1 {
    value /= base;
    unit_index += 1;
  }
  if unit_index == 0 {
    format!("{bytes} {}", units[0])
  } else {
    format!("{value:.2} {}", units[unit_index])
  }
}

pub struct Env;

impl Function for Env {
  fn call(&self, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let name = args
      .get("name")
      .and_then(Value::as_str)
      .ok_or_else(|| tera::Error::msg("env requires a `name` argument"))?;
    to_value(std::env::var(name).unwrap_or_default()).map_err(tera::Error::json)
  }
}

pub struct ToJson;

impl Function for ToJson {
  fn call(&self, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let value = args
      .get("value")
      .ok_or_else(|| tera::Error::msg("toJson requires a `value` argument"))?;
    to_value(serde_json::to_string(value).map_err(|e| tera::Error::msg(e.to_string()))?)
      .map_err(tera::Error::json)
  }
}

pub struct ToPrettyJson;

impl Function for ToPrettyJson {
  fn call(&self, args: &HashMap<String, Value>) -> TeraResult<Value> {
    let value = args
      .get("value")
      .ok_or_else(|| tera::Error::msg("toPrettyJson requires a `value` argument"))?;
    to_value(
      serde_json::to_string_pretty(value).map_err(|e| tera::Error::msg(e.to_string()))?,
    )
    .map_err(tera::Error::json)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn format_bytes_bin_scales_to_mib() {
    let mut args = HashMap::new();
    args.insert("bytes".to_string(), to_value(5_242_880u64).unwrap());
    let result = FormatBytesBin.call(&args).unwrap();
    assert_eq!(result.as_str().unwrap(), "5.00 MiB");
  }

  #[test]
  fn format_bytes_dec_scales_to_mb() {
    let mut args = HashMap::new();
    args.insert("bytes".to_string(), to_value(5_000_000u64).unwrap());
    let result = FormatBytesDec.call(&args).unwrap();
    assert_eq!(result.as_str().unwrap(), "5.00 MB");
  }

  #[test]
  fn small_byte_counts_stay_unscaled() {
    let mut args = HashMap::new();
    args.insert("bytes".to_string(), to_value(512u64).unwrap());
    let result = FormatBytesBin.call(&args).unwrap();
    assert_eq!(result.as_str().unwrap(), "512 B");
  }
}
