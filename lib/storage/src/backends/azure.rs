use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use azure_storage::{ConnectionString, StorageCredentials};
use azure_storage_blobs::prelude::*;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tracing::info;

use crate::backend::StorageBackend;
use crate::retention::decide;
use crate::types::{BackendStats, CandidateEntry};

/// The three auth modes from the spec are mutually exclusive; the
/// config layer resolves which one was configured before constructing
/// this backend.
pub enum AzureAuth {
  SharedKey { account: String, key: String },
  ConnectionString(String),
  ManagedIdentity { account: String },
}

pub struct AzureOptions {
  pub auth: AzureAuth,
  pub container: String,
  pub path: String,
  pub access_tier: Option<AccessTier>,
}

pub struct AzureBackend {
  client: ContainerClient,
  options: AzureOptions,
}

impl AzureBackend {
  pub fn new(options: AzureOptions) -> anyhow::Result<Self> {
    let client = match &options.auth {
      AzureAuth::SharedKey { account, key } => {
        let credentials = StorageCredentials::access_key(account.clone(), key.clone());
        ClientBuilder::new(account.clone(), credentials).container_client(&options.container)
      }
      AzureAuth::ConnectionString(connection_string) => {
        let parsed = ConnectionString::new(connection_string)
          .context("invalid azure connection string")?;
        let account = parsed
          .account_name
          .context("azure connection string is missing an account name")?
          .to_string();
        let credentials = parsed
          .storage_credentials()
          .context("invalid azure connection string")?;
        ClientBuilder::new(account, credentials).container_client(&options.container)
      }
      AzureAuth::ManagedIdentity { account } => {
        let credentials = StorageCredentials::anonymous();
        ClientBuilder::new(account.clone(), credentials).container_client(&options.container)
      }
    };

    Ok(Self { client, options })
  }

  fn blob_name(&self, file_name: &str) -> String {
    format!("{}/{}", self.options.path.trim_end_matches('/'), file_name)
  }
}

#[async_trait]
impl StorageBackend for AzureBackend {
  fn name(&self) -> &str {
    "Azure"
  }

  async fn copy(&self, local_path: &Path) -> anyhow::Result<()> {
    let file_name = local_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| anyhow::anyhow!("archive path has no filename"))?;
    let blob_name = self.blob_name(file_name);

    let data = tokio::fs::read(local_path)
      .await
      .with_context(|| format!("failed to read {} for upload", local_path.display()))?;

    let blob = self.client.blob_client(&blob_name);
    let mut builder = blob.put_block_blob(data);
    if let Some(tier) = self.options.access_tier {
      builder = builder.access_tier(tier);
    }
    builder
      .await
      .with_context(|| format!("failed to upload blob {blob_name}"))?;

    info!(container = %self.options.container, blob = %blob_name, "copied archive to azure blob storage");
    Ok(())
  }

  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats> {
    let list_prefix = self.blob_name(prefix);
    let mut candidates = Vec::new();

    let mut pages = self
      .client
      .list_blobs()
      .prefix(list_prefix.clone())
      .into_stream();

    while let Some(page) = pages.next().await {
      let page = page.context("failed to list azure blobs for pruning")?;
      for blob in page.blobs.blobs() {
        let modified = DateTime::<Utc>::from_timestamp(
          blob.properties.last_modified.unix_timestamp(),
          blob.properties.last_modified.nanosecond(),
        )
        .context("blob last_modified timestamp out of range")?;
        candidates.push(CandidateEntry {
          name: blob.name.clone(),
          modified,
        });
      }
    }

    let decision = decide(candidates, deadline, self.name());
    let mut stats = decision.stats;

    for entry in &decision.to_delete {
      let blob = self.client.blob_client(&entry.name);
      if let Err(e) = blob.delete().await {
        tracing::warn!(blob = %entry.name, error = %e, "failed to prune azure blob");
        stats.prune_errors += 1;
      }
    }

    Ok(stats)
  }
}
