pub mod azure;
pub mod dropbox;
pub mod gdrive;
pub mod local;
pub mod s3;
pub mod ssh;
pub mod webdav;
