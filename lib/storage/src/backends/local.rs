use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::retention::decide;
use crate::types::{BackendStats, CandidateEntry};

pub struct LocalBackend {
  destination: PathBuf,
  /// Filename for an atomically re-pointed "latest" symlink, created
  /// after every successful copy if set.
  latest_symlink: Option<String>,
}

impl LocalBackend {
  pub fn new(destination: PathBuf, latest_symlink: Option<String>) -> Self {
    Self {
      destination,
      latest_symlink,
    }
  }
}

#[async_trait]
impl StorageBackend for LocalBackend {
  fn name(&self) -> &str {
    "Local"
  }

  async fn copy(&self, local_path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&self.destination)
      .await
      .with_context(|| {
        format!("failed to create local destination {}", self.destination.display())
      })?;

    let file_name = local_path
      .file_name()
      .ok_or_else(|| anyhow::anyhow!("archive path has no filename"))?;
    let dest = self.destination.join(file_name);

    tokio::fs::copy(local_path, &dest).await.with_context(|| {
      format!(
        "failed to copy {} to {}",
        local_path.display(),
        dest.display()
      )
    })?;

    if let Some(symlink_name) = &self.latest_symlink {
      repoint_symlink(&self.destination, symlink_name, file_name.as_ref()).await?;
    }

    info!(path = %dest.display(), "copied archive to local destination");
    Ok(())
  }

  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats> {
    let mut candidates = Vec::new();
    let mut names = Vec::new();

    let mut dir = tokio::fs::read_dir(&self.destination)
      .await
      .with_context(|| {
        format!("failed to read local destination {}", self.destination.display())
      })?;

    while let Some(entry) = dir.next_entry().await? {
      let name = entry.file_name().to_string_lossy().into_owned();
      if !name.starts_with(prefix) {
        continue;
      }

      let symlink_metadata = tokio::fs::symlink_metadata(entry.path()).await?;
      if symlink_metadata.file_type().is_symlink() || symlink_metadata.is_dir() {
        continue;
      }

      let metadata = tokio::fs::metadata(entry.path()).await?;
      let modified: DateTime<Utc> = metadata
        .modified()
        .with_context(|| format!("no mtime for {}", entry.path().display()))?
        .into();

      names.push((name.clone(), entry.path()));
      candidates.push(CandidateEntry { name, modified });
    }

    let decision = decide(candidates, deadline, self.name());
    let mut stats = decision.stats;

    for to_delete in &decision.to_delete {
      let Some((_, path)) = names.iter().find(|(n, _)| n == &to_delete.name) else {
        continue;
      };
      if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to prune local archive");
        stats.prune_errors += 1;
      }
    }

    Ok(stats)
  }
}

async fn repoint_symlink(
  dir: &Path,
  symlink_name: &str,
  target_file_name: &std::ffi::OsStr,
) -> anyhow::Result<()> {
  let link_path = dir.join(symlink_name);
  let tmp_path = dir.join(format!(".{symlink_name}.tmp"));

  if tokio::fs::symlink_metadata(&tmp_path).await.is_ok() {
    tokio::fs::remove_file(&tmp_path).await.ok();
  }

  tokio::fs::symlink(target_file_name, &tmp_path)
    .await
    .with_context(|| format!("failed to create temporary symlink {}", tmp_path.display()))?;

  tokio::fs::rename(&tmp_path, &link_path)
    .await
    .with_context(|| format!("failed to re-point symlink {}", link_path.display()))?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn copy_creates_file_at_destination() {
    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("b.tar.gz");
    tokio::fs::write(&src, b"data").await.unwrap();

    let dest_dir = tempfile::tempdir().unwrap();
    let backend = LocalBackend::new(dest_dir.path().to_path_buf(), None);
    backend.copy(&src).await.unwrap();

    assert!(dest_dir.path().join("b.tar.gz").exists());
  }

  #[tokio::test]
  async fn copy_repoints_latest_symlink() {
    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("b.tar.gz");
    tokio::fs::write(&src, b"data").await.unwrap();

    let dest_dir = tempfile::tempdir().unwrap();
    let backend =
      LocalBackend::new(dest_dir.path().to_path_buf(), Some("latest".to_string()));
    backend.copy(&src).await.unwrap();

    let link = dest_dir.path().join("latest");
    let target = tokio::fs::read_link(&link).await.unwrap();
    assert_eq!(target, PathBuf::from("b.tar.gz"));
  }

  #[tokio::test]
  async fn prune_guards_against_deleting_all_candidates() {
    let dest_dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dest_dir.path().join("b-1.tar.gz"), b"1")
      .await
      .unwrap();
    tokio::fs::write(dest_dir.path().join("b-2.tar.gz"), b"2")
      .await
      .unwrap();

    let backend = LocalBackend::new(dest_dir.path().to_path_buf(), None);
    let future_deadline = Utc::now() + chrono::Duration::days(1);
    let stats = backend.prune(future_deadline, "b-").await.unwrap();

    assert_eq!(stats.total, 2);
    assert_eq!(stats.pruned, 0);
    assert!(dest_dir.path().join("b-1.tar.gz").exists());
    assert!(dest_dir.path().join("b-2.tar.gz").exists());
  }
}
