use serde::{Deserialize, Serialize};

fn default_true() -> bool {
  true
}

fn default_filename() -> String {
  "backup-{{ .Extension }}".to_string()
}

fn default_compression() -> String {
  "gz".to_string()
}

fn default_lock_timeout_secs() -> u64 {
  60
}

fn default_retention_days() -> i64 {
  -1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
  #[serde(default)]
  pub cron_expression: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
  #[serde(default)]
  pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenameConfig {
  #[serde(default = "default_filename")]
  pub filename: String,
  #[serde(default = "default_true")]
  pub filename_expand: bool,
  #[serde(default)]
  pub pruning_prefix: String,
  #[serde(default)]
  pub latest_symlink: Option<String>,
}

impl Default for FilenameConfig {
  fn default() -> Self {
    Self {
      filename: default_filename(),
      filename_expand: true,
      pruning_prefix: String::new(),
      latest_symlink: None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
  #[serde(default = "default_compression")]
  pub compression: String,
}

impl Default for CompressionConfig {
  fn default() -> Self {
    Self {
      compression: default_compression(),
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
  #[serde(default = "default_retention_days")]
  pub retention_days: i64,
  #[serde(default)]
  pub pruning_leeway_secs: u64,
  #[serde(default)]
  pub skip_backends_from_prune: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleConfig {
  #[serde(default)]
  pub stop_during_backup_label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
  #[serde(default)]
  pub docker_host: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
  #[serde(default)]
  pub exec_label: Option<String>,
  #[serde(default)]
  pub exec_forward_output: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
  #[serde(default)]
  pub gpg_passphrase: Option<String>,
  #[serde(default)]
  pub gpg_public_key_ring_file: Option<String>,
  #[serde(default)]
  pub age_passphrase: Option<String>,
  #[serde(default)]
  pub age_public_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalStorageConfig {
  #[serde(default)]
  pub archive: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3StorageConfig {
  #[serde(default)]
  pub bucket_name: Option<String>,
  #[serde(default)]
  pub endpoint: Option<String>,
  #[serde(default)]
  pub endpoint_proto: Option<String>,
  #[serde(default)]
  pub endpoint_insecure: bool,
  #[serde(default)]
  pub access_key_id: Option<String>,
  #[serde(default)]
  pub secret_access_key: Option<String>,
  #[serde(default)]
  pub iam_role_endpoint: Option<String>,
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebdavStorageConfig {
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub url_insecure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshStorageConfig {
  #[serde(default)]
  pub host_name: Option<String>,
  #[serde(default)]
  pub port: Option<u16>,
  #[serde(default)]
  pub user: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
  #[serde(default)]
  pub identity_file: Option<String>,
  #[serde(default)]
  pub identity_passphrase: Option<String>,
  #[serde(default)]
  pub remote_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureStorageConfig {
  #[serde(default)]
  pub storage_account_name: Option<String>,
  #[serde(default)]
  pub storage_primary_account_key: Option<String>,
  #[serde(default)]
  pub storage_connection_string: Option<String>,
  #[serde(default)]
  pub storage_container_name: Option<String>,
  #[serde(default)]
  pub storage_endpoint: Option<String>,
  #[serde(default)]
  pub storage_path: String,
  #[serde(default)]
  pub storage_access_tier: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropboxStorageConfig {
  #[serde(default)]
  pub endpoint: Option<String>,
  #[serde(default)]
  pub oauth2_endpoint: Option<String>,
  #[serde(default)]
  pub refresh_token: Option<String>,
  #[serde(default)]
  pub app_key: Option<String>,
  #[serde(default)]
  pub app_secret: Option<String>,
  #[serde(default)]
  pub remote_path: String,
  #[serde(default)]
  pub concurrency_level: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GDriveStorageConfig {
  #[serde(default)]
  pub credentials_json: Option<String>,
  #[serde(default)]
  pub folder_id: Option<String>,
  #[serde(default)]
  pub impersonate_subject: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
  #[serde(default)]
  pub local: LocalStorageConfig,
  #[serde(default)]
  pub s3: S3StorageConfig,
  #[serde(default)]
  pub webdav: WebdavStorageConfig,
  #[serde(default)]
  pub ssh: SshStorageConfig,
  #[serde(default)]
  pub azure: AzureStorageConfig,
  #[serde(default)]
  pub dropbox: DropboxStorageConfig,
  #[serde(default)]
  pub gdrive: GDriveStorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
  #[serde(default)]
  pub urls: Vec<String>,
  #[serde(default)]
  pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
  #[serde(default = "default_lock_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for LockingConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_lock_timeout_secs(),
    }
  }
}

/// The fully resolved configuration for a single run, after layering
/// CLI args over environment variables over a conf file over defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub schedule: ScheduleConfig,
  #[serde(default)]
  pub sources: SourcesConfig,
  #[serde(default)]
  pub filename: FilenameConfig,
  #[serde(default)]
  pub compression: CompressionConfig,
  #[serde(default)]
  pub retention: RetentionConfig,
  #[serde(default)]
  pub lifecycle: LifecycleConfig,
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub hooks: HooksConfig,
  #[serde(default)]
  pub encryption: EncryptionConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub notifications: NotificationsConfig,
  #[serde(default)]
  pub locking: LockingConfig,
}
