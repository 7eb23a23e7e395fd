use serde_json::Value;

const REDACTED: &str = "***";

/// Keys whose values are replaced with a redaction marker before a
/// [`crate::Config`] is logged. `show-config` bypasses this deliberately:
/// the agent's own operators are its only audience there.
const SECRET_KEYS: &[&str] = &[
  "gpg_passphrase",
  "gpg_public_key_ring_file",
  "age_passphrase",
  "age_public_keys",
  "access_key_id",
  "secret_access_key",
  "password",
  "identity_passphrase",
  "primary_account_key",
  "connection_string",
  "refresh_token",
  "app_secret",
  "credentials_json",
];

/// Produces a redacted copy of a serializable config value suitable for
/// inclusion in log lines or notification bodies.
pub fn sanitize(value: &Value) -> Value {
  match value {
    Value::Object(map) => Value::Object(
      map
        .iter()
        .map(|(key, value)| {
          if SECRET_KEYS.iter().any(|secret| key.contains(secret)) {
            (key.clone(), Value::String(REDACTED.to_string()))
          } else {
            (key.clone(), sanitize(value))
          }
        })
        .collect(),
    ),
    Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
    other => other.clone(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn redacts_known_secret_keys() {
    let raw = json!({
      "encryption": { "gpg_passphrase": "hunter2", "age_public_keys": ["a"] },
      "storage": { "s3": { "secret_access_key": "abcd" } },
      "filename": "backup.tar.gz",
    });
    let clean = sanitize(&raw);
    assert_eq!(clean["encryption"]["gpg_passphrase"], json!(REDACTED));
    assert_eq!(clean["encryption"]["age_public_keys"], json!(REDACTED));
    assert_eq!(clean["storage"]["s3"]["secret_access_key"], json!(REDACTED));
    assert_eq!(clean["filename"], json!("backup.tar.gz"));
  }
}
