use chrono::{DateTime, Utc};

/// One prunable entry as reported by a backend's listing call.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
  pub name: String,
  pub modified: DateTime<Utc>,
}

/// Per-backend prune outcome, accumulated into notification stats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
  pub total: u64,
  pub pruned: u64,
  pub prune_errors: u64,
}
