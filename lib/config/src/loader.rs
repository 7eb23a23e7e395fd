use std::{collections::HashMap, path::Path, path::PathBuf};

use anyhow::Context;
use wildcard::Wildcard;

use crate::cli::CliArgs;
use crate::env::Env;
use crate::secret::{resolve_path_secret, resolve_secret};
use crate::types::*;

/// Finds the conf files a directory-or-file `--config-path` entry
/// resolves to. Files are included verbatim; directories are scanned
/// (non-recursive) for entries whose name matches one of `keywords`.
fn discover_conf_files(
  paths: &[PathBuf],
  keywords: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
  let mut found = Vec::new();
  for path in paths {
    let metadata = std::fs::metadata(path)
      .with_context(|| format!("config path {} does not exist", path.display()))?;
    if metadata.is_file() {
      found.push(path.clone());
      continue;
    }
    for entry in std::fs::read_dir(path)
      .with_context(|| format!("failed to read config directory {}", path.display()))?
    {
      let entry = entry?;
      if !entry.file_type()?.is_file() {
        continue;
      }
      let name = entry.file_name();
      let name = name.to_string_lossy();
      let matched = keywords.iter().any(|keyword| {
        Wildcard::new(keyword.as_bytes())
          .map(|pattern| pattern.is_match(name.as_bytes()))
          .unwrap_or(false)
      });
      if matched {
        found.push(entry.path());
      }
    }
  }
  found.sort();
  Ok(found)
}

/// Parses a `.env`-style conf file into the same shape as the process
/// environment, so it can be merged with identical precedence logic.
fn parse_conf_file(path: &Path) -> anyhow::Result<Env> {
  let pairs: HashMap<String, String> = dotenvy::from_filename_iter(path)
    .with_context(|| format!("failed to open conf file {}", path.display()))?
    .collect::<Result<_, _>>()
    .with_context(|| format!("failed to parse conf file {}", path.display()))?;
  envy::from_iter::<_, Env>(pairs)
    .with_context(|| format!("failed to parse conf file {}", path.display()))
}

/// Merges two layers of [`Env`], preferring values from `primary`.
fn merge_env(primary: Env, fallback: Env) -> Env {
  Env {
    backup_config_paths: primary.backup_config_paths,
    backup_config_keywords: primary.backup_config_keywords,
    backup_cron_expression: primary.backup_cron_expression.or(fallback.backup_cron_expression),
    backup_sources: primary.backup_sources.or(fallback.backup_sources),
    backup_filename: primary.backup_filename.or(fallback.backup_filename),
    backup_filename_expand: primary.backup_filename_expand.or(fallback.backup_filename_expand),
    backup_pruning_prefix: primary.backup_pruning_prefix.or(fallback.backup_pruning_prefix),
    backup_latest_symlink: primary.backup_latest_symlink.or(fallback.backup_latest_symlink),
    backup_compression: primary.backup_compression.or(fallback.backup_compression),
    backup_retention_days: primary.backup_retention_days.or(fallback.backup_retention_days),
    backup_pruning_leeway: primary.backup_pruning_leeway.or(fallback.backup_pruning_leeway),
    backup_skip_backends_from_prune: primary
      .backup_skip_backends_from_prune
      .or(fallback.backup_skip_backends_from_prune),
    backup_stop_during_backup_label: primary
      .backup_stop_during_backup_label
      .or(fallback.backup_stop_during_backup_label),
    backup_stop_container_label: primary
      .backup_stop_container_label
      .or(fallback.backup_stop_container_label),
    docker_host: primary.docker_host.or(fallback.docker_host),
    exec_label: primary.exec_label.or(fallback.exec_label),
    exec_forward_output: primary.exec_forward_output.or(fallback.exec_forward_output),
    gpg_passphrase: primary.gpg_passphrase.or(fallback.gpg_passphrase),
    gpg_passphrase_file: primary.gpg_passphrase_file.or(fallback.gpg_passphrase_file),
    gpg_public_key_ring_file: primary
      .gpg_public_key_ring_file
      .or(fallback.gpg_public_key_ring_file),
    age_passphrase: primary.age_passphrase.or(fallback.age_passphrase),
    age_passphrase_file: primary.age_passphrase_file.or(fallback.age_passphrase_file),
    age_public_keys: primary.age_public_keys.or(fallback.age_public_keys),
    backup_archive: primary.backup_archive.or(fallback.backup_archive),
    aws_s3_bucket_name: primary.aws_s3_bucket_name.or(fallback.aws_s3_bucket_name),
    aws_endpoint: primary.aws_endpoint.or(fallback.aws_endpoint),
    aws_endpoint_proto: primary.aws_endpoint_proto.or(fallback.aws_endpoint_proto),
    aws_endpoint_insecure: primary.aws_endpoint_insecure.or(fallback.aws_endpoint_insecure),
    aws_access_key_id: primary.aws_access_key_id.or(fallback.aws_access_key_id),
    aws_access_key_id_file: primary.aws_access_key_id_file.or(fallback.aws_access_key_id_file),
    aws_secret_access_key: primary.aws_secret_access_key.or(fallback.aws_secret_access_key),
    aws_secret_access_key_file: primary
      .aws_secret_access_key_file
      .or(fallback.aws_secret_access_key_file),
    aws_iam_role_endpoint: primary.aws_iam_role_endpoint.or(fallback.aws_iam_role_endpoint),
    aws_s3_path: primary.aws_s3_path.or(fallback.aws_s3_path),
    aws_storage_class: primary.aws_storage_class.or(fallback.aws_storage_class),
    webdav_url: primary.webdav_url.or(fallback.webdav_url),
    webdav_username: primary.webdav_username.or(fallback.webdav_username),
    webdav_password: primary.webdav_password.or(fallback.webdav_password),
    webdav_password_file: primary.webdav_password_file.or(fallback.webdav_password_file),
    webdav_path: primary.webdav_path.or(fallback.webdav_path),
    webdav_url_insecure: primary.webdav_url_insecure.or(fallback.webdav_url_insecure),
    ssh_host_name: primary.ssh_host_name.or(fallback.ssh_host_name),
    ssh_port: primary.ssh_port.or(fallback.ssh_port),
    ssh_user: primary.ssh_user.or(fallback.ssh_user),
    ssh_password: primary.ssh_password.or(fallback.ssh_password),
    ssh_password_file: primary.ssh_password_file.or(fallback.ssh_password_file),
    ssh_identity_file: primary.ssh_identity_file.or(fallback.ssh_identity_file),
    ssh_identity_passphrase: primary
      .ssh_identity_passphrase
      .or(fallback.ssh_identity_passphrase),
    ssh_identity_passphrase_file: primary
      .ssh_identity_passphrase_file
      .or(fallback.ssh_identity_passphrase_file),
    ssh_remote_path: primary.ssh_remote_path.or(fallback.ssh_remote_path),
    azure_storage_account_name: primary
      .azure_storage_account_name
      .or(fallback.azure_storage_account_name),
    azure_storage_primary_account_key: primary
      .azure_storage_primary_account_key
      .or(fallback.azure_storage_primary_account_key),
    azure_storage_primary_account_key_file: primary
      .azure_storage_primary_account_key_file
      .or(fallback.azure_storage_primary_account_key_file),
    azure_storage_connection_string: primary
      .azure_storage_connection_string
      .or(fallback.azure_storage_connection_string),
    azure_storage_connection_string_file: primary
      .azure_storage_connection_string_file
      .or(fallback.azure_storage_connection_string_file),
    azure_storage_container_name: primary
      .azure_storage_container_name
      .or(fallback.azure_storage_container_name),
    azure_storage_endpoint: primary.azure_storage_endpoint.or(fallback.azure_storage_endpoint),
    azure_storage_path: primary.azure_storage_path.or(fallback.azure_storage_path),
    azure_storage_access_tier: primary
      .azure_storage_access_tier
      .or(fallback.azure_storage_access_tier),
    dropbox_endpoint: primary.dropbox_endpoint.or(fallback.dropbox_endpoint),
    dropbox_oauth2_endpoint: primary.dropbox_oauth2_endpoint.or(fallback.dropbox_oauth2_endpoint),
    dropbox_refresh_token: primary.dropbox_refresh_token.or(fallback.dropbox_refresh_token),
    dropbox_refresh_token_file: primary
      .dropbox_refresh_token_file
      .or(fallback.dropbox_refresh_token_file),
    dropbox_app_key: primary.dropbox_app_key.or(fallback.dropbox_app_key),
    dropbox_app_secret: primary.dropbox_app_secret.or(fallback.dropbox_app_secret),
    dropbox_app_secret_file: primary
      .dropbox_app_secret_file
      .or(fallback.dropbox_app_secret_file),
    dropbox_remote_path: primary.dropbox_remote_path.or(fallback.dropbox_remote_path),
    dropbox_concurrency_level: primary
      .dropbox_concurrency_level
      .or(fallback.dropbox_concurrency_level),
    google_drive_credentials_json: primary
      .google_drive_credentials_json
      .or(fallback.google_drive_credentials_json),
    google_drive_credentials_json_file: primary
      .google_drive_credentials_json_file
      .or(fallback.google_drive_credentials_json_file),
    google_drive_folder_id: primary.google_drive_folder_id.or(fallback.google_drive_folder_id),
    google_drive_impersonate_subject: primary
      .google_drive_impersonate_subject
      .or(fallback.google_drive_impersonate_subject),
    notification_urls: primary.notification_urls.or(fallback.notification_urls),
    notification_level: primary.notification_level.or(fallback.notification_level),
    lock_timeout: primary.lock_timeout.or(fallback.lock_timeout),
  }
}

/// Resolves one [`Config`] from a merged [`Env`] layer (CLI args are
/// folded in by the caller before this runs), applying `_FILE`
/// indirection and built-in defaults.
fn resolve(env: Env) -> anyhow::Result<Config> {
  let mut config = Config::default();

  if let Some(cron) = env.backup_cron_expression {
    config.schedule.cron_expression = Some(cron);
  }

  if let Some(sources) = env.backup_sources {
    config.sources.sources = sources;
  }

  if let Some(filename) = env.backup_filename {
    config.filename.filename = filename;
  }
  if let Some(expand) = env.backup_filename_expand {
    config.filename.filename_expand = expand;
  }
  if let Some(prefix) = env.backup_pruning_prefix {
    config.filename.pruning_prefix = prefix;
  }
  if let Some(symlink) = env.backup_latest_symlink {
    config.filename.latest_symlink = Some(symlink);
  }

  if let Some(compression) = env.backup_compression {
    config.compression.compression = compression;
  }

  if let Some(days) = env.backup_retention_days {
    config.retention.retention_days = days;
  }
  if let Some(leeway) = env.backup_pruning_leeway {
    config.retention.pruning_leeway_secs = leeway;
  }
  if let Some(skip) = env.backup_skip_backends_from_prune {
    config.retention.skip_backends_from_prune = skip;
  }

  config.lifecycle.stop_during_backup_label = env
    .backup_stop_during_backup_label
    .or(env.backup_stop_container_label.inspect(|_| {
      tracing::warn!(
        "BACKUP_STOP_CONTAINER_LABEL is deprecated, use BACKUP_STOP_DURING_BACKUP_LABEL"
      );
    }));

  if let Some(host) = env.docker_host {
    config.engine.docker_host = Some(host);
  }

  if let Some(label) = env.exec_label {
    config.hooks.exec_label = Some(label);
  }
  if let Some(forward) = env.exec_forward_output {
    config.hooks.exec_forward_output = forward;
  }

  config.encryption.gpg_passphrase = resolve_secret(
    "gpgPassphrase",
    env.gpg_passphrase,
    env.gpg_passphrase_file,
  )?;
  config.encryption.gpg_public_key_ring_file = env.gpg_public_key_ring_file;
  config.encryption.age_passphrase = resolve_secret(
    "agePassphrase",
    env.age_passphrase,
    env.age_passphrase_file,
  )?;
  if let Some(keys) = env.age_public_keys {
    config.encryption.age_public_keys = keys;
  }

  config.storage.local.archive = env.backup_archive;

  config.storage.s3.bucket_name = env.aws_s3_bucket_name;
  config.storage.s3.endpoint = env.aws_endpoint;
  config.storage.s3.endpoint_proto = env.aws_endpoint_proto;
  if let Some(insecure) = env.aws_endpoint_insecure {
    config.storage.s3.endpoint_insecure = insecure;
  }
  config.storage.s3.access_key_id = resolve_secret(
    "awsAccessKeyId",
    env.aws_access_key_id,
    env.aws_access_key_id_file,
  )?;
  config.storage.s3.secret_access_key = resolve_secret(
    "awsSecretAccessKey",
    env.aws_secret_access_key,
    env.aws_secret_access_key_file,
  )?;
  config.storage.s3.iam_role_endpoint = env.aws_iam_role_endpoint;
  if let Some(path) = env.aws_s3_path {
    config.storage.s3.path = path;
  }
  config.storage.s3.storage_class = env.aws_storage_class;

  config.storage.webdav.url = env.webdav_url;
  config.storage.webdav.username = env.webdav_username;
  config.storage.webdav.password = resolve_secret(
    "webdavPassword",
    env.webdav_password,
    env.webdav_password_file,
  )?;
  if let Some(path) = env.webdav_path {
    config.storage.webdav.path = path;
  }
  if let Some(insecure) = env.webdav_url_insecure {
    config.storage.webdav.url_insecure = insecure;
  }

  config.storage.ssh.host_name = env.ssh_host_name;
  config.storage.ssh.port = env.ssh_port;
  config.storage.ssh.user = env.ssh_user;
  config.storage.ssh.password =
    resolve_secret("sshPassword", env.ssh_password, env.ssh_password_file)?;
  config.storage.ssh.identity_file = env.ssh_identity_file;
  config.storage.ssh.identity_passphrase = resolve_secret(
    "sshIdentityPassphrase",
    env.ssh_identity_passphrase,
    env.ssh_identity_passphrase_file,
  )?;
  if let Some(path) = env.ssh_remote_path {
    config.storage.ssh.remote_path = path;
  }

  config.storage.azure.storage_account_name = env.azure_storage_account_name;
  config.storage.azure.storage_primary_account_key = resolve_secret(
    "azureStoragePrimaryAccountKey",
    env.azure_storage_primary_account_key,
    env.azure_storage_primary_account_key_file,
  )?;
  config.storage.azure.storage_connection_string = resolve_secret(
    "azureStorageConnectionString",
    env.azure_storage_connection_string,
    env.azure_storage_connection_string_file,
  )?;
  config.storage.azure.storage_container_name = env.azure_storage_container_name;
  config.storage.azure.storage_endpoint = env.azure_storage_endpoint;
  if let Some(path) = env.azure_storage_path {
    config.storage.azure.storage_path = path;
  }
  config.storage.azure.storage_access_tier = env.azure_storage_access_tier;

  config.storage.dropbox.endpoint = env.dropbox_endpoint;
  config.storage.dropbox.oauth2_endpoint = env.dropbox_oauth2_endpoint;
  config.storage.dropbox.refresh_token = resolve_secret(
    "dropboxRefreshToken",
    env.dropbox_refresh_token,
    env.dropbox_refresh_token_file,
  )?;
  config.storage.dropbox.app_key = env.dropbox_app_key;
  config.storage.dropbox.app_secret = resolve_secret(
    "dropboxAppSecret",
    env.dropbox_app_secret,
    env.dropbox_app_secret_file,
  )?;
  if let Some(path) = env.dropbox_remote_path {
    config.storage.dropbox.remote_path = path;
  }
  config.storage.dropbox.concurrency_level = env.dropbox_concurrency_level;

  config.storage.gdrive.credentials_json = resolve_path_secret(
    "googleDriveCredentialsJson",
    env.google_drive_credentials_json,
    env.google_drive_credentials_json_file,
  )?;
  config.storage.gdrive.folder_id = env.google_drive_folder_id;
  config.storage.gdrive.impersonate_subject = env.google_drive_impersonate_subject;

  if let Some(urls) = env.notification_urls {
    config.notifications.urls = urls;
  }
  config.notifications.level = env.notification_level;

  if let Some(timeout) = env.lock_timeout {
    config.locking.timeout_secs = timeout;
  }

  Ok(config)
}

/// Loads every [`Config`] governed by `args`: one per matching conf
/// file, or a single one built from just CLI args + environment +
/// defaults if no conf paths resolve to anything.
pub fn load_all(args: &CliArgs) -> anyhow::Result<Vec<Config>> {
  let process_env = Env::load()?;

  let config_paths = args
    .config_path
    .clone()
    .unwrap_or_else(|| process_env.backup_config_paths.clone());
  let config_keywords = args
    .config_keyword
    .clone()
    .unwrap_or_else(|| process_env.backup_config_keywords.clone());

  if config_paths.is_empty() {
    return Ok(vec![resolve(process_env)?]);
  }

  let files = discover_conf_files(&config_paths, &config_keywords)?;
  if files.is_empty() {
    return Ok(vec![resolve(process_env)?]);
  }

  files
    .iter()
    .map(|file| {
      let file_env = parse_conf_file(file)?;
      resolve(merge_env(process_env.clone(), file_env))
    })
    .collect()
}
