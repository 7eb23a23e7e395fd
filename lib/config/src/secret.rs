use anyhow::{Context, bail};

/// Resolves the `_FILE` indirection for a secret-bearing option: `value`
/// is the plain env/file value, `file_value` is the path named by the
/// `_FILE` variant. Supplying both is a configuration error (Open
/// Question 3: the source fails in this case, which this adopts).
pub fn resolve_secret(
  option_name: &str,
  value: Option<String>,
  file_value: Option<String>,
) -> anyhow::Result<Option<String>> {
  match (value, file_value) {
    (Some(_), Some(_)) => bail!(
      "configuration error: both '{option_name}' and '{option_name}_FILE' are set; supply only one"
    ),
    (Some(value), None) => Ok(Some(value)),
    (None, Some(path)) => {
      let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {option_name}_FILE at {path}"))?;
      Ok(Some(contents.trim_end_matches(['\n', '\r']).to_string()))
    }
    (None, None) => Ok(None),
  }
}

/// As [`resolve_secret`], for options backed by a file path that should
/// stay a path on disk rather than be read into memory (e.g. a keyring
/// file passed by reference). Only used to catch the both-set error;
/// when only one side is set, preserves whichever value was given.
pub fn resolve_path_secret(
  option_name: &str,
  value: Option<String>,
  file_value: Option<String>,
) -> anyhow::Result<Option<String>> {
  if value.is_some() && file_value.is_some() {
    bail!(
      "configuration error: both '{option_name}' and '{option_name}_FILE' are set; supply only one"
    );
  }
  Ok(value.or(file_value))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_value_passes_through() {
    let result = resolve_secret("gpgPassphrase", Some("hunter2".to_string()), None).unwrap();
    assert_eq!(result, Some("hunter2".to_string()));
  }

  #[test]
  fn file_value_is_read_and_trimmed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secret");
    std::fs::write(&path, "hunter2\n").unwrap();
    let result = resolve_secret(
      "gpgPassphrase",
      None,
      Some(path.to_string_lossy().into_owned()),
    )
    .unwrap();
    assert_eq!(result, Some("hunter2".to_string()));
  }

  #[test]
  fn both_set_is_a_configuration_error() {
    let result = resolve_secret(
      "gpgPassphrase",
      Some("a".to_string()),
      Some("/tmp/b".to_string()),
    );
    assert!(result.is_err());
  }

  #[test]
  fn neither_set_is_none() {
    let result = resolve_secret("gpgPassphrase", None, None).unwrap();
    assert_eq!(result, None);
  }
}
