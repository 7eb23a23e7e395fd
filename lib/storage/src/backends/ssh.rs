use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use tracing::info;

use crate::backend::StorageBackend;
use crate::retention::decide;
use crate::types::{BackendStats, CandidateEntry};

const CHUNK_SIZE: usize = 1024 * 1024;

pub struct SshOptions {
  pub host: String,
  pub port: u16,
  pub user: String,
  pub password: Option<String>,
  pub identity_file: Option<String>,
  pub identity_passphrase: Option<String>,
  pub remote_path: String,
}

pub struct SshBackend {
  options: SshOptions,
}

impl SshBackend {
  pub fn new(options: SshOptions) -> Self {
    Self { options }
  }

  async fn connect(&self) -> anyhow::Result<russh_sftp::client::SftpSession> {
    struct NoopHandler;
    impl client::Handler for NoopHandler {
      type Error = russh::Error;

      async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::ssh_key::PublicKey,
      ) -> Result<bool, Self::Error> {
        Ok(true)
      }
    }

    let config = Arc::new(client::Config::default());
    let mut session: Handle<NoopHandler> = client::connect(
      config,
      (self.options.host.as_str(), self.options.port),
      NoopHandler,
    )
    .await
    .with_context(|| format!("failed to connect to ssh host {}", self.options.host))?;

    let authenticated = if let Some(identity_file) = &self.options.identity_file {
      let key = load_secret_key(
        identity_file,
        self.options.identity_passphrase.as_deref(),
      )
      .with_context(|| format!("failed to load identity file {identity_file}"))?;
      session
        .authenticate_publickey(
          &self.options.user,
          PrivateKeyWithHashAlg::new(Arc::new(key), None),
        )
        .await
        .context("ssh public key authentication failed")?
        .success()
    } else if let Some(password) = &self.options.password {
      session
        .authenticate_password(&self.options.user, password)
        .await
        .context("ssh password authentication failed")?
        .success()
    } else {
      bail!("ssh backend requires either a password or an identity file");
    };

    if !authenticated {
      bail!("ssh authentication rejected for user {}", self.options.user);
    }

    let channel = session
      .channel_open_session()
      .await
      .context("failed to open ssh channel")?;
    channel
      .request_subsystem(true, "sftp")
      .await
      .context("failed to request sftp subsystem")?;

    russh_sftp::client::SftpSession::new(channel.into_stream())
      .await
      .context("failed to start sftp session")
  }
}

#[async_trait]
impl StorageBackend for SshBackend {
  fn name(&self) -> &str {
    "SSH"
  }

  async fn copy(&self, local_path: &Path) -> anyhow::Result<()> {
    let sftp = self.connect().await?;

    let remote_dir = self.options.remote_path.trim_end_matches('/').to_string();
    let mut accumulated = String::new();
    for segment in remote_dir.trim_start_matches('/').split('/') {
      if segment.is_empty() {
        continue;
      }
      accumulated.push('/');
      accumulated.push_str(segment);
      let _ = sftp.create_dir(&accumulated).await;
    }

    let file_name = local_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| anyhow::anyhow!("archive path has no filename"))?;
    let remote_file = format!("{remote_dir}/{file_name}");

    let data = tokio::fs::read(local_path)
      .await
      .with_context(|| format!("failed to read {} for upload", local_path.display()))?;

    let mut remote = sftp
      .create(&remote_file)
      .await
      .with_context(|| format!("failed to create remote file {remote_file}"))?;

    use tokio::io::AsyncWriteExt;
    let mut written = 0usize;
    for chunk in data.chunks(CHUNK_SIZE) {
      remote
        .write_all(chunk)
        .await
        .with_context(|| format!("failed writing chunk at offset {written} to {remote_file}"))?;
      written += chunk.len();
    }
    if written != data.len() {
      bail!("short write to {remote_file}: wrote {written} of {} bytes", data.len());
    }
    remote.shutdown().await.ok();

    info!(remote_file = %remote_file, "copied archive over sftp");
    Ok(())
  }

  async fn prune(
    &self,
    deadline: DateTime<Utc>,
    prefix: &str,
  ) -> anyhow::Result<BackendStats> {
    let sftp = self.connect().await?;
    let remote_dir = self.options.remote_path.trim_end_matches('/');

    let listing = sftp
      .read_dir(remote_dir)
      .await
      .with_context(|| format!("failed to list {remote_dir}"))?;

    let mut candidates = Vec::new();
    for entry in listing {
      let name = entry.file_name();
      if !name.starts_with(prefix) {
        continue;
      }
      if entry.file_type().is_dir() {
        continue;
      }
      let Some(modified) = entry.metadata().modified().ok() else {
        continue;
      };
      let modified: DateTime<Utc> = modified.into();
      candidates.push(CandidateEntry { name, modified });
    }

    let decision = decide(candidates, deadline, self.name());
    let mut stats = decision.stats;

    for entry in &decision.to_delete {
      let path = format!("{remote_dir}/{}", entry.name);
      if let Err(e) = sftp.remove_file(&path).await {
        tracing::warn!(path = %path, error = %e, "failed to prune remote archive over sftp");
        stats.prune_errors += 1;
      }
    }

    Ok(stats)
  }
}
