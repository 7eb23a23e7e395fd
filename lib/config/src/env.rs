use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

fn space_separated<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  Ok(raw.map(|raw| {
    raw
      .split_whitespace()
      .map(str::to_string)
      .collect::<Vec<_>>()
  }))
}

fn default_config_keywords() -> Vec<String> {
  vec!["backup".to_string()]
}

/// # Backup Agent Environment Variables
///
/// Every field mirrors an option from the configuration surface table.
/// Field names here are `snake_case`; the matching env var is its
/// `UPPER_SNAKE_CASE` form. If the equivalent [`crate::cli::CliArgs`]
/// value is set, it wins over whatever is found here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Env {
  #[serde(default)]
  pub backup_config_paths: Vec<PathBuf>,
  #[serde(default = "default_config_keywords")]
  pub backup_config_keywords: Vec<String>,

  pub backup_cron_expression: Option<String>,

  #[serde(default, deserialize_with = "space_separated")]
  pub backup_sources: Option<Vec<String>>,

  pub backup_filename: Option<String>,
  pub backup_filename_expand: Option<bool>,
  pub backup_pruning_prefix: Option<String>,
  pub backup_latest_symlink: Option<String>,

  pub backup_compression: Option<String>,

  pub backup_retention_days: Option<i64>,
  pub backup_pruning_leeway: Option<u64>,
  #[serde(default, deserialize_with = "space_separated")]
  pub backup_skip_backends_from_prune: Option<Vec<String>>,

  pub backup_stop_during_backup_label: Option<String>,
  /// Deprecated alias for `backup_stop_during_backup_label`.
  pub backup_stop_container_label: Option<String>,

  pub docker_host: Option<String>,

  pub exec_label: Option<String>,
  pub exec_forward_output: Option<bool>,

  pub gpg_passphrase: Option<String>,
  pub gpg_passphrase_file: Option<String>,
  pub gpg_public_key_ring_file: Option<String>,
  pub age_passphrase: Option<String>,
  pub age_passphrase_file: Option<String>,
  #[serde(default, deserialize_with = "space_separated")]
  pub age_public_keys: Option<Vec<String>>,

  pub backup_archive: Option<String>,

  pub aws_s3_bucket_name: Option<String>,
  pub aws_endpoint: Option<String>,
  pub aws_endpoint_proto: Option<String>,
  pub aws_endpoint_insecure: Option<bool>,
  pub aws_access_key_id: Option<String>,
  pub aws_access_key_id_file: Option<String>,
  pub aws_secret_access_key: Option<String>,
  pub aws_secret_access_key_file: Option<String>,
  pub aws_iam_role_endpoint: Option<String>,
  pub aws_s3_path: Option<String>,
  pub aws_storage_class: Option<String>,

  pub webdav_url: Option<String>,
  pub webdav_username: Option<String>,
  pub webdav_password: Option<String>,
  pub webdav_password_file: Option<String>,
  pub webdav_path: Option<String>,
  pub webdav_url_insecure: Option<bool>,

  pub ssh_host_name: Option<String>,
  pub ssh_port: Option<u16>,
  pub ssh_user: Option<String>,
  pub ssh_password: Option<String>,
  pub ssh_password_file: Option<String>,
  pub ssh_identity_file: Option<String>,
  pub ssh_identity_passphrase: Option<String>,
  pub ssh_identity_passphrase_file: Option<String>,
  pub ssh_remote_path: Option<String>,

  pub azure_storage_account_name: Option<String>,
  pub azure_storage_primary_account_key: Option<String>,
  pub azure_storage_primary_account_key_file: Option<String>,
  pub azure_storage_connection_string: Option<String>,
  pub azure_storage_connection_string_file: Option<String>,
  pub azure_storage_container_name: Option<String>,
  pub azure_storage_endpoint: Option<String>,
  pub azure_storage_path: Option<String>,
  pub azure_storage_access_tier: Option<String>,

  pub dropbox_endpoint: Option<String>,
  pub dropbox_oauth2_endpoint: Option<String>,
  pub dropbox_refresh_token: Option<String>,
  pub dropbox_refresh_token_file: Option<String>,
  pub dropbox_app_key: Option<String>,
  pub dropbox_app_secret: Option<String>,
  pub dropbox_app_secret_file: Option<String>,
  pub dropbox_remote_path: Option<String>,
  pub dropbox_concurrency_level: Option<usize>,

  pub google_drive_credentials_json: Option<String>,
  pub google_drive_credentials_json_file: Option<String>,
  pub google_drive_folder_id: Option<String>,
  pub google_drive_impersonate_subject: Option<String>,

  #[serde(default, deserialize_with = "space_separated")]
  pub notification_urls: Option<Vec<String>>,
  pub notification_level: Option<String>,

  pub lock_timeout: Option<u64>,
}

impl Env {
  pub fn load() -> anyhow::Result<Self> {
    Ok(envy::from_env::<Env>()?)
  }
}
