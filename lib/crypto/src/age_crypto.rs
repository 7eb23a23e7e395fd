use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use age::Recipient;
use age::secrecy::SecretString;
use anyhow::{Context, bail};

/// Symmetric Age encryption (scrypt-based passphrase).
pub async fn encrypt_symmetric(
  src: &Path,
  dest: &Path,
  passphrase: &str,
) -> anyhow::Result<()> {
  let plaintext = tokio::fs::read(src)
    .await
    .with_context(|| format!("failed to read {} for encryption", src.display()))?;
  let passphrase = passphrase.to_string();

  let ciphertext = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
    let encryptor = age::Encryptor::with_user_passphrase(SecretString::from(passphrase));
    let mut output = Vec::new();
    let mut writer = encryptor
      .wrap_output(&mut output)
      .context("failed to initialize age encryption stream")?;
    writer
      .write_all(&plaintext)
      .context("failed to write plaintext into age stream")?;
    writer.finish().context("failed to finalize age stream")?;
    Ok(output)
  })
  .await
  .context("age encryption task panicked")??;

  tokio::fs::write(dest, ciphertext)
    .await
    .with_context(|| format!("failed to write encrypted archive {}", dest.display()))
}

/// Asymmetric, potentially multi-recipient Age encryption against a list
/// of `age1...` public key strings.
pub async fn encrypt_asymmetric(
  src: &Path,
  dest: &Path,
  recipients: &[String],
) -> anyhow::Result<()> {
  if recipients.is_empty() {
    bail!("age asymmetric encryption requires at least one recipient");
  }

  let mut parsed: Vec<Box<dyn Recipient + Send>> = Vec::with_capacity(recipients.len());
  for recipient in recipients {
    let key = age::x25519::Recipient::from_str(recipient)
      .map_err(|e| anyhow::anyhow!("invalid age recipient '{recipient}': {e}"))?;
    parsed.push(Box::new(key));
  }

  let plaintext = tokio::fs::read(src)
    .await
    .with_context(|| format!("failed to read {} for encryption", src.display()))?;

  let ciphertext = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
    let encryptor = age::Encryptor::with_recipients(
      parsed.iter().map(|r| r.as_ref() as &dyn Recipient),
    )
    .context("no valid age recipients")?;
    let mut output = Vec::new();
    let mut writer = encryptor
      .wrap_output(&mut output)
      .context("failed to initialize age encryption stream")?;
    writer
      .write_all(&plaintext)
      .context("failed to write plaintext into age stream")?;
    writer.finish().context("failed to finalize age stream")?;
    Ok(output)
  })
  .await
  .context("age encryption task panicked")??;

  tokio::fs::write(dest, ciphertext)
    .await
    .with_context(|| format!("failed to write encrypted archive {}", dest.display()))
}
