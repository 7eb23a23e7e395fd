use std::path::Path;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::backend::StorageBackend;
use crate::retention::decide;
use crate::types::{BackendStats, CandidateEntry};

const CHUNK_SIZE: usize = 148 * 1024 * 1024;

pub struct DropboxOptions {
  pub endpoint: String,
  pub oauth2_endpoint: String,
  pub refresh_token: String,
  pub app_key: String,
  pub app_secret: String,
  pub remote_path: String,
  pub concurrency_level: usize,
}

pub struct DropboxBackend {
  client: Client,
  options: DropboxOptions,
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
}

#[derive(Deserialize)]
struct ListFolderEntry {
  name: String,
  server_modified: Option<String>,
  #[serde(rename = ".tag")]
  tag: String,
}

#[derive(Deserialize)]
struct ListFolderResponse {
  entries: Vec<ListFolderEntry>,
  cursor: String,
  has_more: bool,
}

impl DropboxBackend {
  pub fn new(options: DropboxOptions) -> anyhow::Result<Self> {
    let client = Client::builder()
      .build()
      .context("failed to build dropbox http client")?;
    Ok(Self { client, options })
  }

  async fn access_token(&self) -> anyhow::Result<String> {
    let response = self
      .client
      .post(&self.options.oauth2_endpoint)
      .form(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", self.options.refresh_token.as_str()),
        ("client_id", self.options.app_key.as_str()),
        ("client_secret", self.options.app_secret.as_str()),
      ])
      .send()
      .await
      .context("failed to refresh dropbox oauth2 token")?;

    if !response.status().is_success() {
      bail!("dropbox oauth2 refresh returned {}", response.status());
    }

    let parsed: TokenResponse = response
      .json()
      .await
      .context("failed to parse dropbox oauth2 response")?;
    Ok(parsed.access_token)
  }

  fn remote_file(&self, file_name: &str) -> String {
    format!("{}/{}", self.options.remote_path.trim_end_matches('/'), file_name)
  }
}

#[async_trait]
impl StorageBackend for DropboxBackend {
  fn name(&self) -> &str {
    "Dropbox"
  }

  async fn copy(&self, local_path: &Path) -> anyhow::Result<()> {
    let token = self.access_token().await?;
    let file_name = local_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| anyhow::anyhow!("archive path has no filename"))?;
    let remote_path = self.remote_file(file_name);

    let data = tokio::fs::read(local_path)
      .await
      .with_context(|| format!("failed to read {} for upload", local_path.display()))?;

    if data.len() <= CHUNK_SIZE {
      self.upload_whole(&token, &remote_path, data).await?;
    } else {
      self
        .upload_chunked(&token, &remote_path, data)
        .await?;
    }

    info!(remote_path = %remote_path, "copied archive to dropbox");
    Ok(())
  }

  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats> {
    let token = self.access_token().await?;
    let mut candidates = Vec::new();

    let mut response: ListFolderResponse = self
      .client
      .post(format!("{}/2/files/list_folder", self.options.endpoint))
      .bearer_auth(&token)
      .json(&json!({ "path": self.options.remote_path }))
      .send()
      .await
      .context("dropbox list_folder failed")?
      .json()
      .await
      .context("failed to parse dropbox list_folder response")?;

    loop {
      for entry in &response.entries {
        if entry.tag != "file" || !entry.name.starts_with(prefix) {
          continue;
        }
        let Some(modified) = entry
          .server_modified
          .as_deref()
          .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        else {
          continue;
        };
        candidates.push(CandidateEntry {
          name: entry.name.clone(),
          modified: modified.with_timezone(&Utc),
        });
      }

      if !response.has_more {
        break;
      }
      response = self
        .client
        .post(format!("{}/2/files/list_folder/continue", self.options.endpoint))
        .bearer_auth(&token)
        .json(&json!({ "cursor": response.cursor }))
        .send()
        .await
        .context("dropbox list_folder/continue failed")?
        .json()
        .await
        .context("failed to parse dropbox list_folder/continue response")?;
    }

    let decision = decide(candidates, deadline, self.name());
    let mut stats = decision.stats;

    for entry in &decision.to_delete {
      let response = self
        .client
        .post(format!("{}/2/files/delete_v2", self.options.endpoint))
        .bearer_auth(&token)
        .json(&json!({ "path": self.remote_file(&entry.name) }))
        .send()
        .await;
      match response {
        Ok(response) if response.status().is_success() => {}
        _ => stats.prune_errors += 1,
      }
    }

    Ok(stats)
  }
}

impl DropboxBackend {
  async fn upload_whole(
    &self,
    token: &str,
    remote_path: &str,
    data: Vec<u8>,
  ) -> anyhow::Result<()> {
    let args = json!({ "path": remote_path, "mode": "overwrite", "mute": true });
    let response = self
      .client
      .post(format!("{}/2/files/upload", self.options.endpoint))
      .bearer_auth(token)
      .header("Dropbox-API-Arg", args.to_string())
      .header("Content-Type", "application/octet-stream")
      .body(data)
      .send()
      .await
      .context("dropbox single-shot upload failed")?;
    if !response.status().is_success() {
      bail!("dropbox upload returned {}", response.status());
    }
    Ok(())
  }

  /// Uploads `data` in `concurrencyLevel`-bounded sessions of `CHUNK_SIZE`
  /// bytes, then commits the full file in one call. Chunk offsets are
  /// fixed ahead of time so the bounded concurrency doesn't reorder
  /// append calls against a single upload session.
  async fn upload_chunked(
    &self,
    token: &str,
    remote_path: &str,
    data: Vec<u8>,
  ) -> anyhow::Result<()> {
    let first_chunk = &data[..CHUNK_SIZE.min(data.len())];
    let start_response = self
      .client
      .post(format!("{}/2/files/upload_session/start", self.options.endpoint))
      .bearer_auth(token)
      .header("Dropbox-API-Arg", json!({ "close": false }).to_string())
      .header("Content-Type", "application/octet-stream")
      .body(first_chunk.to_vec())
      .send()
      .await
      .context("dropbox upload_session/start failed")?;
    if !start_response.status().is_success() {
      bail!("dropbox upload_session/start returned {}", start_response.status());
    }
    #[derive(Deserialize)]
    struct StartResponse {
      session_id: String,
    }
    let session: StartResponse = start_response
      .json()
      .await
      .context("failed to parse upload_session/start response")?;

    let remaining_chunks: Vec<(u64, &[u8])> = data[CHUNK_SIZE.min(data.len())..]
      .chunks(CHUNK_SIZE)
      .enumerate()
      .map(|(i, chunk)| (CHUNK_SIZE as u64 * (i as u64 + 1), chunk))
      .collect();

    let semaphore = tokio::sync::Semaphore::new(self.options.concurrency_level.max(1));
    let last_offset = remaining_chunks.last().map(|(offset, chunk)| offset + chunk.len() as u64);

    for (offset, chunk) in &remaining_chunks {
      let _permit = semaphore.acquire().await.expect("semaphore not closed");
      let cursor = json!({ "session_id": session.session_id, "offset": offset });
      let response = self
        .client
        .post(format!("{}/2/files/upload_session/append_v2", self.options.endpoint))
        .bearer_auth(token)
        .header("Dropbox-API-Arg", json!({ "cursor": cursor, "close": false }).to_string())
        .header("Content-Type", "application/octet-stream")
        .body(chunk.to_vec())
        .send()
        .await
        .with_context(|| format!("dropbox upload_session/append_v2 failed at offset {offset}"))?;
      if !response.status().is_success() {
        bail!("dropbox append_v2 at offset {offset} returned {}", response.status());
      }
    }

    let final_offset = last_offset.unwrap_or(first_chunk.len() as u64);
    let cursor = json!({ "session_id": session.session_id, "offset": final_offset });
    let commit = json!({ "path": remote_path, "mode": "overwrite", "mute": true });
    let finish_response = self
      .client
      .post(format!("{}/2/files/upload_session/finish", self.options.endpoint))
      .bearer_auth(token)
      .header("Dropbox-API-Arg", json!({ "cursor": cursor, "commit": commit }).to_string())
      .header("Content-Type", "application/octet-stream")
      .body(Vec::<u8>::new())
      .send()
      .await
      .context("dropbox upload_session/finish failed")?;
    if !finish_response.status().is_success() {
      bail!("dropbox upload_session/finish returned {}", finish_response.status());
    }
    Ok(())
  }
}
