use reqwest::Client;
use tracing::{info, warn};

use crate::context::NotificationContext;
use crate::templating::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationLevel {
  #[default]
  Error,
  Info,
}

impl NotificationLevel {
  fn should_send(self, context: &NotificationContext) -> bool {
    match self {
      NotificationLevel::Error => context.is_failure(),
      NotificationLevel::Info => true,
    }
  }
}

/// Sends the rendered notification body to every configured URL,
/// treating each as a webhook endpoint: the transport library that
/// fans a single message out to provider-specific schemes (Slack,
/// Discord, email, ...) is a named external collaborator, not part of
/// this crate's contract.
pub async fn dispatch(
  client: &Client,
  urls: &[String],
  level: NotificationLevel,
  template: &str,
  context: &NotificationContext,
) -> anyhow::Result<()> {
  if !level.should_send(context) {
    info!("notification level gate suppressed this run's notification");
    return Ok(());
  }
  if urls.is_empty() {
    return Ok(());
  }

  let body = render(template, context)?;

  for url in urls {
    let response = client.post(url).body(body.clone()).send().await;
    match response {
      Ok(response) if response.status().is_success() => {
        info!(url = %url, "notification delivered");
      }
      Ok(response) => {
        warn!(url = %url, status = %response.status(), "notification endpoint returned an error status");
      }
      Err(e) => {
        warn!(url = %url, error = %e, "failed to deliver notification");
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::RunStats;

  fn ctx(failure: bool) -> NotificationContext {
    NotificationContext {
      config: serde_json::json!({}),
      error: failure.then(|| "boom".to_string()),
      stats: RunStats::default(),
    }
  }

  #[test]
  fn error_level_suppresses_successful_runs() {
    assert!(!NotificationLevel::Error.should_send(&ctx(false)));
    assert!(NotificationLevel::Error.should_send(&ctx(true)));
  }

  #[test]
  fn info_level_always_sends() {
    assert!(NotificationLevel::Info.should_send(&ctx(false)));
    assert!(NotificationLevel::Info.should_send(&ctx(true)));
  }
}
