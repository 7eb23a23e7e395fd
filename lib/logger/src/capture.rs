use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;

/// Tees formatted log lines into an in-memory ring buffer so the
/// notifier can embed the run's log output in a notification body,
/// instead of re-reading stdout/stderr after the fact.
#[derive(Clone)]
pub struct LogCapture {
  inner: Arc<Mutex<Buffer>>,
}

struct Buffer {
  lines: String,
  limit: usize,
}

impl LogCapture {
  pub fn new(limit: usize) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Buffer {
        lines: String::new(),
        limit,
      })),
    }
  }

  pub(crate) fn layer(&self) -> CaptureLayer {
    CaptureLayer {
      capture: self.clone(),
    }
  }

  pub(crate) fn push(&self, line: String) {
    let Ok(mut buf) = self.inner.lock() else {
      return;
    };
    buf.lines.push_str(&line);
    buf.lines.push('\n');
    if buf.lines.len() > buf.limit {
      // Drop oldest lines until back under the limit.
      let excess = buf.lines.len() - buf.limit;
      let drop_to = buf
        .lines
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= excess)
        .unwrap_or(buf.lines.len());
      buf.lines.drain(..drop_to);
    }
  }

  /// Returns the captured log output accumulated so far.
  pub fn snapshot(&self) -> String {
    self
      .inner
      .lock()
      .map(|buf| buf.lines.clone())
      .unwrap_or_default()
  }

  /// Clears the buffer. Intended to be called once the snapshot
  /// has been handed off to a notification, eg. between runs in the
  /// same process.
  pub fn clear(&self) {
    if let Ok(mut buf) = self.inner.lock() {
      buf.lines.clear();
    }
  }
}

pub struct CaptureLayer {
  capture: LogCapture,
}

#[derive(Default)]
struct MessageVisitor {
  message: String,
}

impl Visit for MessageVisitor {
  fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
    if field.name() == "message" {
      self.message = format!("{value:?}");
    } else if self.message.is_empty() {
      self.message = format!("{}={:?}", field.name(), value);
    }
  }

  fn record_str(&mut self, field: &Field, value: &str) {
    if field.name() == "message" {
      self.message = value.to_string();
    }
  }
}

impl<S> Layer<S> for CaptureLayer
where
  S: tracing::Subscriber,
{
  fn on_event(
    &self,
    event: &tracing::Event<'_>,
    _ctx: tracing_subscriber::layer::Context<'_, S>,
  ) {
    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);
    let now = chrono_like_timestamp();
    let line = format!(
      "{now} {:<5} {}: {}",
      event.metadata().level(),
      event.metadata().target(),
      visitor.message
    );
    self.capture.push(line);
  }
}

/// Avoids pulling in `chrono` just for a capture-buffer timestamp; this
/// crate's only job here is a human-scannable prefix, not a parseable one.
fn chrono_like_timestamp() -> String {
  let now = std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default();
  format!("[{}.{:03}]", now.as_secs(), now.subsec_millis())
}
