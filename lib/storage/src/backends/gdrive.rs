use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header as JwtHeader};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::backend::StorageBackend;
use crate::retention::decide;
use crate::types::{BackendStats, CandidateEntry};

const SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const API_URL: &str = "https://www.googleapis.com/drive/v3/files";

#[derive(Deserialize)]
struct ServiceAccountCredentials {
  client_email: String,
  private_key: String,
  #[serde(default)]
  token_uri: Option<String>,
}

#[derive(Serialize)]
struct Claims {
  iss: String,
  scope: String,
  aud: String,
  exp: u64,
  iat: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  sub: Option<String>,
}

pub struct GDriveOptions {
  pub credentials_json: String,
  pub folder_id: String,
  pub impersonate_subject: Option<String>,
}

pub struct GDriveBackend {
  client: Client,
  credentials: ServiceAccountCredentials,
  options: GDriveOptions,
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
}

#[derive(Deserialize)]
struct FileListResponse {
  files: Vec<DriveFile>,
  #[serde(rename = "nextPageToken")]
  next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DriveFile {
  id: String,
  name: String,
  #[serde(rename = "modifiedTime")]
  modified_time: String,
}

impl GDriveBackend {
  pub fn new(options: GDriveOptions) -> anyhow::Result<Self> {
    let credentials: ServiceAccountCredentials =
      serde_json::from_str(&options.credentials_json)
        .context("failed to parse google drive service account json")?;
    let client = Client::builder()
      .build()
      .context("failed to build google drive http client")?;
    Ok(Self {
      client,
      credentials,
      options,
    })
  }

  async fn access_token(&self) -> anyhow::Result<String> {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .context("system clock before epoch")?
      .as_secs();

    let claims = Claims {
      iss: self.credentials.client_email.clone(),
      scope: SCOPE.to_string(),
      aud: self
        .credentials
        .token_uri
        .clone()
        .unwrap_or_else(|| TOKEN_URL.to_string()),
      exp: now + 3600,
      iat: now,
      sub: self.options.impersonate_subject.clone(),
    };

    let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
      .context("failed to parse service account private key")?;
    let assertion = jsonwebtoken::encode(&JwtHeader::new(Algorithm::RS256), &claims, &key)
      .context("failed to sign service account jwt")?;

    let response = self
      .client
      .post(TOKEN_URL)
      .form(&[
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("assertion", assertion.as_str()),
      ])
      .send()
      .await
      .context("failed to exchange jwt for access token")?;

    if !response.status().is_success() {
      bail!("google token endpoint returned {}", response.status());
    }

    let parsed: TokenResponse = response
      .json()
      .await
      .context("failed to parse google token response")?;
    Ok(parsed.access_token)
  }

  async fn find_file_id(&self, token: &str, name: &str) -> anyhow::Result<Option<String>> {
    let query = format!(
      "name = '{}' and '{}' in parents and trashed = false",
      name.replace('\'', "\\'"),
      self.options.folder_id
    );
    let response = self
      .client
      .get(API_URL)
      .bearer_auth(token)
      .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
      .send()
      .await
      .context("google drive file search failed")?;
    let parsed: FileListResponse = response
      .json()
      .await
      .context("failed to parse google drive search response")?;
    Ok(parsed.files.into_iter().next().map(|f| f.id))
  }
}

#[async_trait]
impl StorageBackend for GDriveBackend {
  fn name(&self) -> &str {
    "GoogleDrive"
  }

  async fn copy(&self, local_path: &Path) -> anyhow::Result<()> {
    let token = self.access_token().await?;
    let file_name = local_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| anyhow::anyhow!("archive path has no filename"))?;

    let data = tokio::fs::read(local_path)
      .await
      .with_context(|| format!("failed to read {} for upload", local_path.display()))?;

    let existing = self.find_file_id(&token, file_name).await?;

    let metadata = json!({
      "name": file_name,
      "parents": [self.options.folder_id],
    });

    let boundary = "backup-orchestrator-multipart-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes());
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes());
    body.extend_from_slice(&data);
    body.extend_from_slice(format!("\r\n--{boundary}--").as_bytes());

    let response = if let Some(id) = existing {
      self
        .client
        .patch(format!("{UPLOAD_URL}/{id}?uploadType=multipart"))
        .bearer_auth(&token)
        .header("Content-Type", format!("multipart/related; boundary={boundary}"))
        .body(body)
        .send()
        .await
        .context("google drive update upload failed")?
    } else {
      self
        .client
        .post(format!("{UPLOAD_URL}?uploadType=multipart"))
        .bearer_auth(&token)
        .header("Content-Type", format!("multipart/related; boundary={boundary}"))
        .body(body)
        .send()
        .await
        .context("google drive create upload failed")?
    };

    if !response.status().is_success() {
      bail!("google drive upload returned {}", response.status());
    }

    info!(file = %file_name, folder = %self.options.folder_id, "copied archive to google drive");
    Ok(())
  }

  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats> {
    let token = self.access_token().await?;
    let query = format!("'{}' in parents and trashed = false", self.options.folder_id);

    let mut candidates = Vec::new();
    let mut ids_by_name = std::collections::HashMap::new();
    let mut page_token: Option<String> = None;

    loop {
      let mut request = self
        .client
        .get(API_URL)
        .bearer_auth(&token)
        .query(&[("q", query.as_str()), ("fields", "nextPageToken,files(id,name,modifiedTime)")]);
      if let Some(token) = &page_token {
        request = request.query(&[("pageToken", token.as_str())]);
      }
      let response: FileListResponse = request
        .send()
        .await
        .context("google drive list failed")?
        .json()
        .await
        .context("failed to parse google drive list response")?;

      for file in response.files {
        if !file.name.starts_with(prefix) {
          continue;
        }
        let Ok(modified) = DateTime::parse_from_rfc3339(&file.modified_time) else {
          continue;
        };
        ids_by_name.insert(file.name.clone(), file.id);
        candidates.push(CandidateEntry {
          name: file.name,
          modified: modified.with_timezone(&Utc),
        });
      }

      page_token = response.next_page_token;
      if page_token.is_none() {
        break;
      }
    }

    let decision = decide(candidates, deadline, self.name());
    let mut stats = decision.stats;

    for entry in &decision.to_delete {
      let Some(id) = ids_by_name.get(&entry.name) else {
        continue;
      };
      let response = self
        .client
        .delete(format!("{API_URL}/{id}"))
        .bearer_auth(&token)
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
