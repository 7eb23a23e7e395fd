use std::{
  path::{Path, PathBuf},
  process::Stdio,
  sync::OnceLock,
};

mod output;
pub use output::*;

use tokio::process::Command;

/// Commands are run directly, and cannot include shell operators like `&&`.
pub async fn run_standard_command(
  command: &str,
  path: impl Into<Option<&Path>>,
) -> CommandOutput {
  let lexed = match shlex::split(command) {
    Some(lexed) if !lexed.is_empty() => lexed,
    _ => {
      return CommandOutput::from_err(std::io::Error::other(
        "command lexed into empty args",
      ));
    }
  };

  let mut cmd = Command::new(&lexed[0]);
  cmd
    .args(&lexed[1..])
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if let Some(path) = path.into() {
    match path.canonicalize() {
      Ok(path) => {
        cmd.current_dir(path);
      }
      Err(e) => return CommandOutput::from_err(e),
    }
  }

  CommandOutput::from(cmd.output().await)
}

/// Commands are wrapped in `sh -c`, and can include `&&`, pipes, etc.
pub async fn run_shell_command(
  command: &str,
  path: impl Into<Option<&Path>>,
) -> CommandOutput {
  let mut cmd = Command::new(shell());
  cmd
    .args(["-c", command])
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if let Some(path) = path.into() {
    match path.canonicalize() {
      Ok(path) => {
        cmd.current_dir(path);
      }
      Err(e) => return CommandOutput::from_err(e),
    }
  }

  CommandOutput::from(cmd.output().await)
}

pub fn shell() -> &'static str {
  static DEFAULT_SHELL: OnceLock<String> = OnceLock::new();
  DEFAULT_SHELL.get_or_init(|| {
    if PathBuf::from("/bin/bash").exists()
      || PathBuf::from("/usr/bin/bash").exists()
    {
      String::from("bash")
    } else {
      String::from("sh")
    }
  })
}

/// Replaces every occurrence of `find` in `stdout`/`stderr` with `"***"`,
/// used to keep secrets (passphrases, tokens) that were interpolated into
/// a shell command out of logs and notification bodies.
pub fn sanitize_output(output: &mut CommandOutput, secrets: &[&str]) {
  for secret in secrets.iter().filter(|s| !s.is_empty()) {
    output.stdout = output.stdout.replace(*secret, "***");
    output.stderr = output.stderr.replace(*secret, "***");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn standard_command_runs() {
    let out = run_standard_command("echo hello", None).await;
    assert!(out.success());
    assert_eq!(out.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn shell_command_supports_pipes() {
    let out =
      run_shell_command("echo hello | tr a-z A-Z", None).await;
    assert!(out.success());
    assert_eq!(out.stdout.trim(), "HELLO");
  }

  #[tokio::test]
  async fn empty_command_fails_gracefully() {
    let out = run_standard_command("   ", None).await;
    assert!(!out.success());
  }

  #[test]
  fn sanitize_output_redacts_secret() {
    use std::os::unix::process::ExitStatusExt;
    let mut out = CommandOutput {
      status: std::process::ExitStatus::from_raw(0),
      stdout: "token=sekret123 ok".to_string(),
      stderr: String::new(),
    };
    sanitize_output(&mut out, &["sekret123"]);
    assert_eq!(out.stdout, "token=*** ok");
  }
}
