use tera::{Context as TeraContext, Tera};

use crate::context::NotificationContext;
use crate::functions::{Env, FormatBytesBin, FormatBytesDec, FormatTime, ToJson, ToPrettyJson};

/// Renders a notification body template with the `Config`/`Error`/
/// `Stats` fields and helper functions documented for the notification
/// surface.
pub fn render(template: &str, context: &NotificationContext) -> anyhow::Result<String> {
  let mut tera = Tera::default();
  tera.register_function("formatTime", FormatTime);
  tera.register_function("formatBytesBin", FormatBytesBin);
  tera.register_function("formatBytesDec", FormatBytesDec);
  tera.register_function("env", Env);
  tera.register_function("toJson", ToJson);
  tera.register_function("toPrettyJson", ToPrettyJson);

  tera
    .add_raw_template("notification", template)
    .map_err(|e| anyhow::anyhow!("invalid notification template: {e}"))?;

  let mut tera_context = TeraContext::new();
  tera_context.insert("Config", &context.config);
  tera_context.insert("Error", &context.error);
  tera_context.insert("Stats", &context.stats);

  tera
    .render("notification", &tera_context)
    .map_err(|e| anyhow::anyhow!("failed to render notification template: {e}"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::RunStats;

  #[test]
  fn renders_basic_success_template() {
    let context = NotificationContext {
      config: serde_json::json!({}),
      error: None,
      stats: RunStats {
        backup_file: "b.tar.gz".to_string(),
        ..Default::default()
      },
    };
    let rendered = render("backup {{ Stats.backup_file }} complete", &context).unwrap();
    assert_eq!(rendered, "backup b.tar.gz complete");
  }

  #[test]
  fn renders_error_branch_when_present() {
    let context = NotificationContext {
      config: serde_json::json!({}),
      error: Some("lock timeout".to_string()),
      stats: RunStats::default(),
    };
    let template = "{% if Error %}failed: {{ Error }}{% else %}ok{% endif %}";
    let rendered = render(template, &context).unwrap();
    assert_eq!(rendered, "failed: lock timeout");
  }
}
