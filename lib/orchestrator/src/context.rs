use std::collections::HashMap;
use std::path::PathBuf;

use backup_engine::StoppedTarget;
use backup_storage::BackendStats;
use chrono::{DateTime, Utc};

use crate::error::StageError;

/// Mutable state threaded through every pipeline stage. Lives for the
/// duration of exactly one run.
pub struct RunContext {
  pub errors: Vec<StageError>,
  /// Targets quiesced in stage 3 that have not yet been resumed. Stage
  /// 8 and the terminal finalizer both drain this; whichever runs
  /// first does the work, the other becomes a no-op.
  pub stopped_targets: Vec<StoppedTarget>,
  pub archive_path: Option<PathBuf>,
  pub backend_stats: HashMap<String, BackendStats>,
  pub containers_touched: u64,
  pub services_touched: u64,
  pub start_time: DateTime<Utc>,
  pub locked_at: Option<DateTime<Utc>>,
  pub post_processed: bool,
}

impl RunContext {
  pub fn new(start_time: DateTime<Utc>) -> Self {
    Self {
      errors: Vec::new(),
      stopped_targets: Vec::new(),
      archive_path: None,
      backend_stats: HashMap::new(),
      containers_touched: 0,
      services_touched: 0,
      start_time,
      locked_at: None,
      post_processed: false,
    }
  }

  pub fn push(&mut self, error: StageError) {
    tracing::error!(%error, "stage error recorded");
    self.errors.push(error);
  }

  pub fn failed(&self) -> bool {
    !self.errors.is_empty()
  }
}
