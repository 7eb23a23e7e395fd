use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::BackendStats;

/// Uniform contract every remote or local storage target implements.
/// `Copy` uploads one completed archive; `Prune` enforces retention
/// against everything already at the destination.
#[async_trait]
pub trait StorageBackend: Send + Sync {
  /// Stable identifier used in stats and logs.
  fn name(&self) -> &str;

  /// Uploads `local_path` to this backend's configured destination,
  /// creating intermediate remote directories if needed.
  async fn copy(&self, local_path: &Path) -> anyhow::Result<()>;

  /// Prunes entries at the destination whose name starts with `prefix`
  /// and whose last-modified time is before `deadline`.
  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats>;
}
