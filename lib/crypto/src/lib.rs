mod age_crypto;
mod gpg;
mod types;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

pub use types::EncryptionMode;

/// Encrypts `archive_path` in place according to `mode`, removing the
/// unencrypted original and returning the new path. A `mode` of `None`
/// is a no-op that returns the path unchanged.
pub async fn encrypt(
  archive_path: &Path,
  mode: &EncryptionMode,
) -> anyhow::Result<PathBuf> {
  let Some(extension) = mode.extension() else {
    return Ok(archive_path.to_path_buf());
  };

  let dest = append_suffix(archive_path, extension);

  match mode {
    EncryptionMode::None => unreachable!("None has no extension"),
    EncryptionMode::GpgSymmetric { passphrase } => {
      gpg::encrypt_symmetric(archive_path, &dest, passphrase).await?
    }
    EncryptionMode::GpgAsymmetric {
      public_key_ring_file,
    } => gpg::encrypt_asymmetric(archive_path, &dest, public_key_ring_file).await?,
    EncryptionMode::AgeSymmetric { passphrase } => {
      age_crypto::encrypt_symmetric(archive_path, &dest, passphrase).await?
    }
    EncryptionMode::AgeAsymmetric { recipients } => {
      age_crypto::encrypt_asymmetric(archive_path, &dest, recipients).await?
    }
  }

  tokio::fs::remove_file(archive_path)
    .await
    .with_context(|| format!("failed to remove unencrypted archive {}", archive_path.display()))?;
  info!(path = %dest.display(), "archive encrypted");
  Ok(dest)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
  let mut name = path
    .file_name()
    .map(|n| n.to_os_string())
    .unwrap_or_default();
  name.push(".");
  name.push(suffix);
  path.with_file_name(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn none_mode_returns_same_path() {
    let path = PathBuf::from("/tmp/archive.tar.gz");
    let result = encrypt(&path, &EncryptionMode::None).await.unwrap();
    assert_eq!(result, path);
  }

  #[test]
  fn append_suffix_adds_extension() {
    let path = Path::new("/staging/b.tar.gz");
    assert_eq!(
      append_suffix(path, "gpg"),
      PathBuf::from("/staging/b.tar.gz.gpg")
    );
  }
}
