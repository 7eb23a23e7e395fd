use std::path::PathBuf;

use azure_storage_blobs::prelude::AccessTier;
use backup_config::Config;
use backup_storage::{
  AzureAuth, AzureBackend, AzureOptions, DropboxBackend, DropboxOptions, GDriveBackend,
  GDriveOptions, LocalBackend, S3Backend, S3Options, SshBackend, SshOptions, StorageBackend,
  WebDavBackend, WebDavOptions,
};
use tracing::warn;

fn parse_access_tier(value: &str) -> Option<AccessTier> {
  match value.to_ascii_lowercase().as_str() {
    "hot" => Some(AccessTier::Hot),
    "cool" => Some(AccessTier::Cool),
    "archive" => Some(AccessTier::Archive),
    other => {
      warn!(tier = other, "unrecognized azure access tier, ignoring");
      None
    }
  }
}

/// Builds the configured backends in the canonical order from the spec
/// (Local, S3, WebDAV, SSH, Azure, Dropbox, GoogleDrive), so log output
/// and fan-out order are deterministic across runs. Backends whose
/// required options are absent are silently skipped: they were never
/// configured for this run.
pub async fn configured_backends(
  config: &Config,
) -> Vec<(String, Box<dyn StorageBackend>)> {
  let mut backends: Vec<(String, Box<dyn StorageBackend>)> = Vec::new();

  if let Some(archive) = &config.storage.local.archive {
    let backend = LocalBackend::new(
      PathBuf::from(archive),
      config.filename.latest_symlink.clone(),
    );
    backends.push(("Local".to_string(), Box::new(backend)));
  }

  if let Some(bucket) = &config.storage.s3.bucket_name {
    let options = S3Options {
      bucket: bucket.clone(),
      endpoint: config.storage.s3.endpoint.clone(),
      endpoint_insecure: config.storage.s3.endpoint_insecure,
      access_key_id: config.storage.s3.access_key_id.clone(),
      secret_access_key: config.storage.s3.secret_access_key.clone(),
      path: config.storage.s3.path.clone(),
      storage_class: config.storage.s3.storage_class.clone(),
    };
    match S3Backend::new(options).await {
      Ok(backend) => backends.push(("S3".to_string(), Box::new(backend))),
      Err(e) => warn!(error = %e, "failed to construct S3 backend, skipping"),
    }
  }

  if let Some(url) = &config.storage.webdav.url {
    let options = WebDavOptions {
      url: url.clone(),
      username: config.storage.webdav.username.clone(),
      password: config.storage.webdav.password.clone(),
      path: config.storage.webdav.path.clone(),
      url_insecure: config.storage.webdav.url_insecure,
    };
    match WebDavBackend::new(options) {
      Ok(backend) => backends.push(("WebDAV".to_string(), Box::new(backend))),
      Err(e) => warn!(error = %e, "failed to construct WebDAV backend, skipping"),
    }
  }

  if let Some(host) = &config.storage.ssh.host_name {
    let options = SshOptions {
      host: host.clone(),
      port: config.storage.ssh.port.unwrap_or(22),
      user: config.storage.ssh.user.clone().unwrap_or_default(),
      password: config.storage.ssh.password.clone(),
      identity_file: config.storage.ssh.identity_file.clone(),
      identity_passphrase: config.storage.ssh.identity_passphrase.clone(),
      remote_path: config.storage.ssh.remote_path.clone(),
    };
    backends.push(("SSH".to_string(), Box::new(SshBackend::new(options))));
  }

  let azure_auth = if let (Some(account), Some(key)) = (
    &config.storage.azure.storage_account_name,
    &config.storage.azure.storage_primary_account_key,
  ) {
    Some(AzureAuth::SharedKey {
      account: account.clone(),
      key: key.clone(),
    })
  } else if let Some(connection_string) = &config.storage.azure.storage_connection_string {
    Some(AzureAuth::ConnectionString(connection_string.clone()))
  } else if let Some(account) = &config.storage.azure.storage_account_name {
    Some(AzureAuth::ManagedIdentity {
      account: account.clone(),
    })
  } else {
    None
  };
  if let (Some(auth), Some(container)) =
    (azure_auth, &config.storage.azure.storage_container_name)
  {
    let options = AzureOptions {
      auth,
      container: container.clone(),
      path: config.storage.azure.storage_path.clone(),
      access_tier: config
        .storage
        .azure
        .storage_access_tier
        .as_deref()
        .and_then(parse_access_tier),
    };
    match AzureBackend::new(options) {
      Ok(backend) => backends.push(("Azure".to_string(), Box::new(backend))),
      Err(e) => warn!(error = %e, "failed to construct Azure backend, skipping"),
    }
  }

  if let (Some(refresh_token), Some(app_key), Some(app_secret)) = (
    &config.storage.dropbox.refresh_token,
    &config.storage.dropbox.app_key,
    &config.storage.dropbox.app_secret,
  ) {
    let options = DropboxOptions {
      endpoint: config
        .storage
        .dropbox
        .endpoint
        .clone()
        .unwrap_or_else(|| "https://content.dropboxapi.com".to_string()),
      oauth2_endpoint: config
        .storage
        .dropbox
        .oauth2_endpoint
        .clone()
        .unwrap_or_else(|| "https://api.dropboxapi.com/oauth2/token".to_string()),
      refresh_token: refresh_token.clone(),
      app_key: app_key.clone(),
      app_secret: app_secret.clone(),
      remote_path: config.storage.dropbox.remote_path.clone(),
      concurrency_level: config.storage.dropbox.concurrency_level.unwrap_or(1).max(1),
    };
    match DropboxBackend::new(options) {
      Ok(backend) => backends.push(("Dropbox".to_string(), Box::new(backend))),
      Err(e) => warn!(error = %e, "failed to construct Dropbox backend, skipping"),
    }
  }

  if let (Some(credentials_json), Some(folder_id)) = (
    &config.storage.gdrive.credentials_json,
    &config.storage.gdrive.folder_id,
  ) {
    let options = GDriveOptions {
      credentials_json: credentials_json.clone(),
      folder_id: folder_id.clone(),
      impersonate_subject: config.storage.gdrive.impersonate_subject.clone(),
    };
    match GDriveBackend::new(options) {
      Ok(backend) => backends.push(("GoogleDrive".to_string(), Box::new(backend))),
      Err(e) => warn!(error = %e, "failed to construct Google Drive backend, skipping"),
    }
  }

  backends
}
