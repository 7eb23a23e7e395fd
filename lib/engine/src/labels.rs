use std::collections::HashMap;

use tracing::warn;

/// Namespace prefix for every label this engine understands.
pub const NAMESPACE: &str = "docker-volume-backup";

const STOP_DURING_BACKUP: &str = "docker-volume-backup.stop-during-backup";
const STOP_DURING_BACKUP_LEGACY: &str = "docker-volume-backup.stop-container-label";
const EXEC_LABEL: &str = "docker-volume-backup.exec-label";

/// A label's value as either a boolean toggle (`"true"`) or a selector
/// string matched against the `--stop-during-backup`/`--exec-label`
/// argument passed at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
  Enabled,
  Named(String),
}

impl Selector {
  fn parse(value: &str) -> Self {
    if value.eq_ignore_ascii_case("true") {
      Selector::Enabled
    } else {
      Selector::Named(value.to_string())
    }
  }

  /// A selector matches when the label is a bare `true` and the caller
  /// didn't ask for a specific named group, or when both sides name the
  /// same group. `wanted = Some("true")` is the explicit spelling of the
  /// default group and is treated the same as `None`.
  pub fn matches(&self, wanted: Option<&str>) -> bool {
    let wanted = wanted.filter(|w| !w.eq_ignore_ascii_case("true"));
    match (self, wanted) {
      (Selector::Enabled, None) => true,
      (Selector::Enabled, Some(_)) => false,
      (Selector::Named(name), Some(wanted)) => name == wanted,
      (Selector::Named(_), None) => false,
    }
  }
}

/// Reads `docker-volume-backup.stop-during-backup[=selector]`, falling
/// back to the deprecated `stop-container-label` spelling with a warning.
pub fn stop_during_backup_selector(
  labels: &HashMap<String, String>,
) -> Option<Selector> {
  if let Some(value) = labels.get(STOP_DURING_BACKUP) {
    return Some(Selector::parse(value));
  }
  if let Some(value) = labels.get(STOP_DURING_BACKUP_LEGACY) {
    warn!(
      label = STOP_DURING_BACKUP_LEGACY,
      replacement = STOP_DURING_BACKUP,
      "container uses a deprecated label, update it"
    );
    return Some(Selector::parse(value));
  }
  None
}

/// Reads `docker-volume-backup.exec-label[=selector]`, which gates
/// whether a container is a candidate to run hook commands in.
pub fn exec_label_selector(
  labels: &HashMap<String, String>,
) -> Option<Selector> {
  labels.get(EXEC_LABEL).map(|v| Selector::parse(v))
}

/// The four phases a hook command can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
  Archive,
  Process,
  Copy,
  Prune,
}

impl HookPhase {
  fn key(self) -> &'static str {
    match self {
      HookPhase::Archive => "archive",
      HookPhase::Process => "process",
      HookPhase::Copy => "copy",
      HookPhase::Prune => "prune",
    }
  }

  /// Deprecated phase spellings that still resolve, each logging once
  /// per resolution so operators notice and migrate.
  fn legacy_key(self) -> Option<&'static str> {
    match self {
      HookPhase::Archive => Some("exec"),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTiming {
  Pre,
  Post,
}

impl HookTiming {
  fn key(self) -> &'static str {
    match self {
      HookTiming::Pre => "pre",
      HookTiming::Post => "post",
    }
  }
}

/// A hook command resolved from a container's labels: the command line
/// to run and the user to run it as, if overridden.
#[derive(Debug, Clone)]
pub struct HookCommand {
  pub container_id: String,
  pub container_name: String,
  pub phase: HookPhase,
  pub timing: HookTiming,
  pub command: String,
  pub user: Option<String>,
}

/// Resolves a single container's label set into the hook command for
/// `phase`/`timing`, if present. Accepts the legacy `exec-pre`/`exec-post`
/// spelling for the archive phase with a deprecation warning.
pub fn resolve_hook(
  container_id: &str,
  container_name: &str,
  labels: &HashMap<String, String>,
  phase: HookPhase,
  timing: HookTiming,
) -> Option<HookCommand> {
  let modern_key = format!(
    "{NAMESPACE}.{}-{}",
    phase.key(),
    timing.key()
  );
  let command = if let Some(command) = labels.get(&modern_key) {
    command.clone()
  } else if let Some(legacy_phase) = phase.legacy_key() {
    let legacy_key = format!("{NAMESPACE}.{}-{}", legacy_phase, timing.key());
    let command = labels.get(&legacy_key)?;
    warn!(
      container = container_name,
      label = legacy_key,
      replacement = modern_key,
      "container uses a deprecated hook label, update it"
    );
    command.clone()
  } else {
    return None;
  };

  let user_key = format!("{NAMESPACE}.{}-{}.user", phase.key(), timing.key());
  let user = labels.get(&user_key).cloned();

  Some(HookCommand {
    container_id: container_id.to_string(),
    container_name: container_name.to_string(),
    phase,
    timing,
    command,
    user,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn bare_true_selector_matches_unnamed_request() {
    let sel = Selector::parse("true");
    assert!(sel.matches(None));
    assert!(!sel.matches(Some("nightly")));
  }

  #[test]
  fn bare_true_selector_matches_explicit_true_request() {
    let sel = Selector::parse("true");
    assert!(sel.matches(Some("true")));
  }

  #[test]
  fn named_selector_matches_only_same_name() {
    let sel = Selector::parse("nightly");
    assert!(sel.matches(Some("nightly")));
    assert!(!sel.matches(Some("weekly")));
    assert!(!sel.matches(None));
  }

  #[test]
  fn legacy_stop_label_is_honored() {
    let labels = labels(&[("docker-volume-backup.stop-container-label", "true")]);
    let selector = stop_during_backup_selector(&labels);
    assert_eq!(selector, Some(Selector::Enabled));
  }

  #[test]
  fn resolve_hook_prefers_modern_label() {
    let labels = labels(&[
      ("docker-volume-backup.archive-pre", "echo hi"),
      ("docker-volume-backup.exec-pre", "echo legacy"),
    ]);
    let hook = resolve_hook(
      "c1",
      "web",
      &labels,
      HookPhase::Archive,
      HookTiming::Pre,
    )
    .unwrap();
    assert_eq!(hook.command, "echo hi");
  }

  #[test]
  fn resolve_hook_falls_back_to_legacy_exec_label() {
    let labels = labels(&[("docker-volume-backup.exec-post", "echo bye")]);
    let hook = resolve_hook(
      "c1",
      "web",
      &labels,
      HookPhase::Archive,
      HookTiming::Post,
    )
    .unwrap();
    assert_eq!(hook.command, "echo bye");
  }

  #[test]
  fn resolve_hook_reads_user_override() {
    let labels = labels(&[
      ("docker-volume-backup.copy-pre", "echo hi"),
      ("docker-volume-backup.copy-pre.user", "backup"),
    ]);
    let hook =
      resolve_hook("c1", "db", &labels, HookPhase::Copy, HookTiming::Pre)
        .unwrap();
    assert_eq!(hook.user.as_deref(), Some("backup"));
  }

  #[test]
  fn resolve_hook_absent_returns_none() {
    let labels = labels(&[]);
    assert!(resolve_hook("c1", "db", &labels, HookPhase::Prune, HookTiming::Pre)
      .is_none());
  }
}
