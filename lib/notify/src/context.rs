use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-backend stats surfaced to notification templates under
/// `Stats.Storages.<Name>`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
  pub total: u64,
  pub pruned: u64,
  pub prune_errors: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
  pub start_time: Option<DateTime<Utc>>,
  pub end_time: Option<DateTime<Utc>>,
  pub took_seconds: f64,
  pub locked_seconds: f64,
  pub log_output: String,
  pub containers: u64,
  pub services: u64,
  pub backup_file: String,
  pub storages: HashMap<String, StorageStats>,
}

/// Everything a notification template can reference. `config` and
/// `error` are rendered as opaque JSON values so templates can drill
/// into arbitrary fields without this crate knowing the full config
/// shape.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationContext {
  pub config: serde_json::Value,
  pub error: Option<String>,
  pub stats: RunStats,
}

impl NotificationContext {
  pub fn is_failure(&self) -> bool {
    self.error.is_some()
  }
}
