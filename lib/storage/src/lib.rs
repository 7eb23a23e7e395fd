mod backend;
pub mod backends;
mod retention;
mod types;

pub use backend::StorageBackend;
pub use backends::azure::{AzureAuth, AzureBackend, AzureOptions};
pub use backends::dropbox::{DropboxBackend, DropboxOptions};
pub use backends::gdrive::{GDriveBackend, GDriveOptions};
pub use backends::local::LocalBackend;
pub use backends::s3::{S3Backend, S3Options};
pub use backends::ssh::{SshBackend, SshOptions};
pub use backends::webdav::{WebDavBackend, WebDavOptions};
pub use retention::decide as decide_retention;
pub use types::{BackendStats, CandidateEntry};
