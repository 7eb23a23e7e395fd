use std::fmt;

/// The taxonomy of failures a run can accumulate. Carried alongside the
/// underlying [`anyhow::Error`] so notifications and logs can group and
/// count failures by kind without string-matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Configuration,
  LockTimeout,
  Engine,
  Archive,
  Encrypt,
  Backend,
  Hook,
  Notify,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ErrorKind::Configuration => "configuration",
      ErrorKind::LockTimeout => "lock-timeout",
      ErrorKind::Engine => "engine",
      ErrorKind::Archive => "archive",
      ErrorKind::Encrypt => "encrypt",
      ErrorKind::Backend => "backend",
      ErrorKind::Hook => "hook",
      ErrorKind::Notify => "notify",
    };
    f.write_str(s)
  }
}

/// A single stage failure, wrapped with the pipeline stage name it
/// occurred in. Backend failures additionally carry the backend name.
#[derive(Debug)]
pub struct StageError {
  pub kind: ErrorKind,
  pub stage: &'static str,
  pub backend: Option<String>,
  pub source: anyhow::Error,
}

impl fmt::Display for StageError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.backend {
      Some(backend) => write!(
        f,
        "[{}:{}] backend {backend}: {}",
        self.stage, self.kind, self.source
      ),
      None => write!(f, "[{}:{}] {}", self.stage, self.kind, self.source),
    }
  }
}

impl StageError {
  pub fn new(kind: ErrorKind, stage: &'static str, source: anyhow::Error) -> Self {
    Self {
      kind,
      stage,
      backend: None,
      source,
    }
  }

  pub fn backend(kind: ErrorKind, stage: &'static str, backend: &str, source: anyhow::Error) -> Self {
    Self {
      kind,
      stage,
      backend: Some(backend.to_string()),
      source,
    }
  }
}

/// Maps the accumulated run errors to the process exit code from the
/// external interface contract: 0 all clear, 2 lock timeout took
/// priority over everything else, 1 any other accumulated failure.
pub fn exit_code(errors: &[StageError]) -> i32 {
  if errors.iter().any(|e| e.kind == ErrorKind::LockTimeout) {
    2
  } else if errors.is_empty() {
    0
  } else {
    1
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_errors_is_exit_code_zero() {
    assert_eq!(exit_code(&[]), 0);
  }

  #[test]
  fn non_lock_errors_are_exit_code_one() {
    let errors = vec![StageError::new(
      ErrorKind::Backend,
      "copy",
      anyhow::anyhow!("boom"),
    )];
    assert_eq!(exit_code(&errors), 1);
  }

  #[test]
  fn lock_timeout_takes_priority_over_other_errors() {
    let errors = vec![
      StageError::new(ErrorKind::Archive, "create-archive", anyhow::anyhow!("boom")),
      StageError::new(ErrorKind::LockTimeout, "acquire-lock", anyhow::anyhow!("timed out")),
    ];
    assert_eq!(exit_code(&errors), 2);
  }

  #[test]
  fn backend_display_includes_backend_name() {
    let error = StageError::backend(ErrorKind::Backend, "prune", "S3", anyhow::anyhow!("denied"));
    assert!(error.to_string().contains("S3"));
    assert!(error.to_string().contains("prune"));
  }
}
