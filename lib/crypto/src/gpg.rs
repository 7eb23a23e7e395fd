use std::path::Path;

use anyhow::{Context, bail};
use backup_command::{run_standard_command, sanitize_output};
use tracing::debug;

/// Symmetric GPG encryption via the `gpg` binary, shelled out the same
/// way the rest of this codebase wraps external tools: no library binds
/// OpenPGP well enough to match gpg's own trust/keyring semantics.
pub async fn encrypt_symmetric(
  src: &Path,
  dest: &Path,
  passphrase: &str,
) -> anyhow::Result<()> {
  let command = format!(
    "gpg --batch --yes --symmetric --cipher-algo AES256 --passphrase-fd 0 -o {} {}",
    shlex::try_quote(dest.to_string_lossy().as_ref())?,
    shlex::try_quote(src.to_string_lossy().as_ref())?,
  );
  run_gpg_with_stdin(&command, passphrase).await
}

/// Asymmetric GPG encryption against every public key found in
/// `public_key_ring_file`, producing one multi-recipient output file.
pub async fn encrypt_asymmetric(
  src: &Path,
  dest: &Path,
  public_key_ring_file: &Path,
) -> anyhow::Result<()> {
  let gnupg_home = tempfile::tempdir().context("failed to create temporary gnupg home")?;
  let home = gnupg_home.path();

  let import_command = format!(
    "gpg --homedir {} --batch --yes --import {}",
    shlex::try_quote(home.to_string_lossy().as_ref())?,
    shlex::try_quote(public_key_ring_file.to_string_lossy().as_ref())?,
  );
  let import_output = run_standard_command(&import_command, None).await;
  if !import_output.success() {
    bail!(
      "failed to import gpg public key ring: {}",
      import_output.stderr.trim()
    );
  }

  let list_command = format!(
    "gpg --homedir {} --batch --list-keys --with-colons",
    shlex::try_quote(home.to_string_lossy().as_ref())?,
  );
  let list_output = run_standard_command(&list_command, None).await;
  let recipients = parse_fingerprints(&list_output.stdout);
  if recipients.is_empty() {
    bail!("public key ring {} contained no usable keys", public_key_ring_file.display());
  }
  debug!(count = recipients.len(), "encrypting archive to recipients");

  let mut command = format!(
    "gpg --homedir {} --batch --yes --trust-model always -o {} --encrypt",
    shlex::try_quote(home.to_string_lossy().as_ref())?,
    shlex::try_quote(dest.to_string_lossy().as_ref())?,
  );
  for recipient in &recipients {
    command.push_str(&format!(" -r {}", shlex::try_quote(recipient)?));
  }
  command.push(' ');
  command.push_str(&shlex::try_quote(src.to_string_lossy().as_ref())?);

  let output = run_standard_command(&command, None).await;
  if !output.success() {
    bail!("gpg asymmetric encryption failed: {}", output.stderr.trim());
  }
  Ok(())
}

fn parse_fingerprints(colon_output: &str) -> Vec<String> {
  colon_output
    .lines()
    .filter(|line| line.starts_with("fpr:"))
    .filter_map(|line| line.split(':').nth(9))
    .filter(|fpr| !fpr.is_empty())
    .map(|fpr| fpr.to_string())
    .collect()
}

async fn run_gpg_with_stdin(command: &str, stdin: &str) -> anyhow::Result<()> {
  use tokio::io::AsyncWriteExt;
  use tokio::process::Command;

  let mut child = Command::new(backup_command::shell())
    .arg("-c")
    .arg(command)
    .stdin(std::process::Stdio::piped())
    .stdout(std::process::Stdio::piped())
    .stderr(std::process::Stdio::piped())
    .spawn()
    .context("failed to spawn gpg")?;

  let mut stdin_pipe = child.stdin.take().expect("stdin was piped");
  stdin_pipe
    .write_all(stdin.as_bytes())
    .await
    .context("failed to write passphrase to gpg stdin")?;
  stdin_pipe.shutdown().await.ok();
  drop(stdin_pipe);

  let result = child.wait_with_output().await;
  let mut captured = backup_command::CommandOutput::from(result);
  sanitize_output(&mut captured, &[stdin]);
  if !captured.success() {
    bail!("gpg symmetric encryption failed: {}", captured.stderr.trim());
  }
  Ok(())
}
