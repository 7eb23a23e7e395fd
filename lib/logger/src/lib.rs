use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

mod capture;

pub use capture::LogCapture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
  pub level: tracing::Level,
  pub stdio: StdioLogMode,
  pub pretty: bool,
  pub ansi: bool,
  pub location: bool,
  /// Max bytes retained in the notification log-capture buffer.
  pub capture_limit: usize,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: tracing::Level::INFO,
      stdio: StdioLogMode::default(),
      pretty: false,
      ansi: true,
      location: false,
      capture_limit: 64 * 1024,
    }
  }
}

/// Initializes the global tracing subscriber and returns the log
/// capture handle the orchestrator hands to the notifier.
pub fn init(config: &LogConfig) -> anyhow::Result<LogCapture> {
  let capture = LogCapture::new(config.capture_limit);
  let registry =
    Registry::default().with(LevelFilter::from_level(config.level));
  let capture_layer = capture.layer();

  match (config.stdio, config.pretty) {
    (StdioLogMode::Standard, true) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(config.location)
          .with_line_number(config.location)
          .with_ansi(config.ansi),
      )
      .with(capture_layer)
      .try_init(),
    (StdioLogMode::Standard, false) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(config.location)
          .with_line_number(config.location)
          .with_ansi(config.ansi),
      )
      .with(capture_layer)
      .try_init(),
    (StdioLogMode::Json, _) => registry
      .with(tracing_subscriber::fmt::layer().json())
      .with(capture_layer)
      .try_init(),
    (StdioLogMode::None, _) => registry.with(capture_layer).try_init(),
  }
  .context("failed to init logger")?;

  Ok(capture)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn capture_buffer_truncates_to_limit() {
    let capture = LogCapture::new(32);
    for i in 0..20 {
      capture.push(format!("line-{i}"));
    }
    assert!(capture.snapshot().len() <= 64);
  }

  #[test]
  fn capture_buffer_clears() {
    let capture = LogCapture::new(1024);
    capture.push("hello".to_string());
    assert!(!capture.snapshot().is_empty());
    capture.clear();
    assert!(capture.snapshot().is_empty());
  }
}
