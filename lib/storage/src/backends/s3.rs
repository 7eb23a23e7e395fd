use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::types::ObjectIdentifier;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::backend::StorageBackend;
use crate::retention::decide;
use crate::types::{BackendStats, CandidateEntry};

pub struct S3Options {
  pub bucket: String,
  pub endpoint: Option<String>,
  pub endpoint_insecure: bool,
  pub access_key_id: Option<String>,
  pub secret_access_key: Option<String>,
  pub path: String,
  pub storage_class: Option<String>,
}

pub struct S3Backend {
  client: Client,
  options: S3Options,
}

impl S3Backend {
  /// Builds the client with either static credentials or the SDK's
  /// default provider chain, which covers the spec's "IAM-endpoint-
  /// fetched credentials" case via environment/instance-metadata
  /// discovery.
  pub async fn new(options: S3Options) -> anyhow::Result<Self> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let (Some(key), Some(secret)) =
      (&options.access_key_id, &options.secret_access_key)
    {
      let credentials =
        Credentials::new(key.clone(), secret.clone(), None, None, "backup-orchestrator");
      loader = loader.credentials_provider(credentials);
    }

    if let Some(endpoint) = &options.endpoint {
      let scheme = if options.endpoint_insecure { "http" } else { "https" };
      loader = loader.endpoint_url(format!("{scheme}://{endpoint}"));
    }

    let shared_config = loader.region(Region::new("us-east-1")).load().await;
    let client = Client::new(&shared_config);

    Ok(Self { client, options })
  }

  fn remote_key(&self, file_name: &str) -> String {
    format!("{}/{}", self.options.path.trim_end_matches('/'), file_name)
  }
}

#[async_trait]
impl StorageBackend for S3Backend {
  fn name(&self) -> &str {
    "S3"
  }

  async fn copy(&self, local_path: &Path) -> anyhow::Result<()> {
    let file_name = local_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| anyhow::anyhow!("archive path has no filename"))?;
    let key = self.remote_key(file_name);

    let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path)
      .await
      .with_context(|| format!("failed to open {} for upload", local_path.display()))?;

    let mut request = self
      .client
      .put_object()
      .bucket(&self.options.bucket)
      .key(&key)
      .body(body);

    if let Some(class) = &self.options.storage_class {
      request = request.storage_class(class.as_str().into());
    }

    request
      .send()
      .await
      .with_context(|| format!("failed to upload {key} to bucket {}", self.options.bucket))?;

    info!(bucket = %self.options.bucket, key = %key, "copied archive to s3");
    Ok(())
  }

  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats> {
    let list_prefix = self.remote_key(prefix);
    let mut candidates = Vec::new();
    let mut continuation_token = None;

    loop {
      let mut request = self
        .client
        .list_objects_v2()
        .bucket(&self.options.bucket)
        .prefix(&list_prefix);
      if let Some(token) = &continuation_token {
        request = request.continuation_token(token);
      }
      let response = request
        .send()
        .await
        .context("failed to list s3 objects for pruning")?;

      for object in response.contents() {
        let (Some(key), Some(modified)) = (object.key(), object.last_modified()) else {
          continue;
        };
        let modified = DateTime::from_timestamp(modified.secs(), 0).unwrap_or_default();
        candidates.push(CandidateEntry {
          name: key.to_string(),
          modified,
        });
      }

      if response.is_truncated().unwrap_or(false) {
        continuation_token = response.next_continuation_token().map(|s| s.to_string());
      } else {
        break;
      }
    }

    let decision = decide(candidates, deadline, self.name());
    let mut stats = decision.stats;

    if !decision.to_delete.is_empty() {
      let object_ids: Vec<ObjectIdentifier> = decision
        .to_delete
        .iter()
        .filter_map(|c| ObjectIdentifier::builder().key(&c.name).build().ok())
        .collect();

      let delete = aws_sdk_s3::types::Delete::builder()
        .set_objects(Some(object_ids))
        .build()
        .context("failed to build delete request")?;

      let response = self
        .client
        .delete_objects()
        .bucket(&self.options.bucket)
        .delete(delete)
        .send()
        .await
        .context("failed to bulk delete s3 objects")?;

      stats.prune_errors = response.errors().len() as u64;
    }

    Ok(stats)
  }
}
