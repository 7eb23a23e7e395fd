use std::path::Path;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use tracing::info;

use crate::backend::StorageBackend;
use crate::retention::decide;
use crate::types::{BackendStats, CandidateEntry};

pub struct WebDavOptions {
  pub url: String,
  pub username: Option<String>,
  pub password: Option<String>,
  pub path: String,
  pub url_insecure: bool,
}

pub struct WebDavBackend {
  client: Client,
  options: WebDavOptions,
}

impl WebDavBackend {
  pub fn new(options: WebDavOptions) -> anyhow::Result<Self> {
    let client = Client::builder()
      .danger_accept_invalid_certs(options.url_insecure)
      .build()
      .context("failed to build webdav http client")?;
    Ok(Self { client, options })
  }

  fn resource_url(&self, relative: &str) -> String {
    format!(
      "{}/{}/{}",
      self.options.url.trim_end_matches('/'),
      self.options.path.trim_matches('/'),
      relative.trim_start_matches('/')
    )
  }

  fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
    let mut request = self.client.request(method, url);
    if let (Some(user), Some(pass)) = (&self.options.username, &self.options.password) {
      request = request.basic_auth(user, Some(pass));
    }
    request
  }

  /// Creates every path segment under the configured destination path,
  /// ignoring "already exists" responses, mirroring `MkdirAll`.
  async fn mkdir_all(&self) -> anyhow::Result<()> {
    let mut accumulated = String::new();
    for segment in self.options.path.trim_matches('/').split('/') {
      if segment.is_empty() {
        continue;
      }
      accumulated.push('/');
      accumulated.push_str(segment);
      let url = format!("{}{}", self.options.url.trim_end_matches('/'), accumulated);
      let response = self
        .request(Method::from_bytes(b"MKCOL").unwrap(), &url)
        .send()
        .await
        .with_context(|| format!("MKCOL failed for {url}"))?;
      if !response.status().is_success()
        && response.status() != StatusCode::METHOD_NOT_ALLOWED
        && response.status() != StatusCode::CONFLICT
      {
        bail!("MKCOL {url} returned {}", response.status());
      }
    }
    Ok(())
  }
}

#[async_trait]
impl StorageBackend for WebDavBackend {
  fn name(&self) -> &str {
    "WebDAV"
  }

  async fn copy(&self, local_path: &Path) -> anyhow::Result<()> {
    self.mkdir_all().await?;

    let file_name = local_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| anyhow::anyhow!("archive path has no filename"))?;
    let url = self.resource_url(file_name);

    let body = tokio::fs::read(local_path)
      .await
      .with_context(|| format!("failed to read {} for upload", local_path.display()))?;

    let response = self
      .request(Method::PUT, &url)
      .body(body)
      .send()
      .await
      .with_context(|| format!("PUT failed for {url}"))?;

    if !response.status().is_success() {
      bail!("webdav PUT {url} returned {}", response.status());
    }

    info!(url = %url, "copied archive to webdav");
    Ok(())
  }

  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats> {
    let url = self.resource_url("");
    let body = r#"<?xml version="1.0"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:getlastmodified/><d:resourcetype/></d:prop>
</d:propfind>"#;

    let response = self
      .request(Method::from_bytes(b"PROPFIND").unwrap(), &url)
      .header("Depth", "1")
      .header("Content-Type", "application/xml")
      .body(body)
      .send()
      .await
      .with_context(|| format!("PROPFIND failed for {url}"))?;

    if !response.status().is_success() {
      bail!("webdav PROPFIND {url} returned {}", response.status());
    }

    let xml = response.text().await.context("failed to read propfind body")?;
    let candidates = parse_propfind_entries(&xml, prefix);

    let decision = decide(candidates, deadline, self.name());
    let mut stats = decision.stats;

    for entry in &decision.to_delete {
      let target = self.resource_url(&entry.name);
      let response = self
        .request(Method::DELETE, &target)
        .send()
        .await
        .with_context(|| format!("DELETE failed for {target}"))?;
      if !response.status().is_success() {
        stats.prune_errors += 1;
      }
    }

    Ok(stats)
  }
}

/// Minimal, dependency-free extraction of `<d:href>`/`<d:getlastmodified>`
/// pairs from a WebDAV PROPFIND multistatus response. A full XML parser
/// is unnecessary for the flat, single-namespace responses this backend
/// targets.
fn parse_propfind_entries(xml: &str, prefix: &str) -> Vec<CandidateEntry> {
  let mut entries = Vec::new();
  for response_block in xml.split("<d:response>").skip(1) {
    let Some(href) = extract_tag(response_block, "href") else {
      continue;
    };
    let name = href.rsplit('/').next().unwrap_or(&href).to_string();
    if !name.starts_with(prefix) {
      continue;
    }
    let Some(raw_modified) = extract_tag(response_block, "getlastmodified") else {
      continue;
    };
    let Ok(modified) = DateTime::parse_from_rfc2822(&raw_modified) else {
      continue;
    };
    entries.push(CandidateEntry {
      name,
      modified: modified.with_timezone(&Utc),
    });
  }
  entries
}

fn extract_tag(xml: &str, tag: &str) -> Option<String> {
  for prefixed in [format!("d:{tag}"), tag.to_string()] {
    let open = format!("<{prefixed}>");
    let close = format!("</{prefixed}>");
    if let Some(start) = xml.find(&open) {
      let start = start + open.len();
      if let Some(end) = xml[start..].find(&close) {
        return Some(xml[start..start + end].trim().to_string());
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_propfind_entries_with_matching_prefix() {
    let xml = r#"<d:multistatus xmlns:d="DAV:">
      <d:response>
        <d:href>/backups/b-20260101.tar.gz</d:href>
        <d:propstat><d:prop><d:getlastmodified>Mon, 01 Jan 2026 00:00:00 GMT</d:getlastmodified></d:prop></d:propstat>
      </d:response>
      <d:response>
        <d:href>/backups/other.txt</d:href>
        <d:propstat><d:prop><d:getlastmodified>Mon, 01 Jan 2026 00:00:00 GMT</d:getlastmodified></d:prop></d:propstat>
      </d:response>
    </d:multistatus>"#;
    let entries = parse_propfind_entries(xml, "b-");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "b-20260101.tar.gz");
  }
}
