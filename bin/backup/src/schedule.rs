use std::sync::Arc;

use backup_config::Config;
use backup_lock::LockRegistry;
use backup_logger::LogCapture;
use chrono::Utc;
use tracing::{error, info, warn};

/// One entry per schedule registered by the coordinator: its resolved
/// config and the name its advisory lock key is filed under.
struct Schedule {
  name: String,
  config: Config,
  cron: croner::Cron,
}

fn build_schedules(configs: Vec<Config>) -> Vec<Schedule> {
  configs
    .into_iter()
    .enumerate()
    .filter_map(|(i, config)| {
      let Some(expr) = config.schedule.cron_expression.clone() else {
        warn!(index = i, "config has no cron expression, skipping in scheduler mode");
        return None;
      };
      let name = format!("schedule-{i}");
      match croner::Cron::new(&expr)
        .with_seconds_optional()
        .with_dom_and_dow()
        .parse()
      {
        Ok(cron) => Some(Schedule { name, config, cron }),
        Err(e) => {
          error!(schedule = name.as_str(), error = %e, "failed to parse cron expression, skipping");
          None
        }
      }
    })
    .collect()
}

/// Registers one job per config at its cron expression and runs forever,
/// firing jobs in parallel tasks. The process-wide lock registry
/// serializes each schedule's critical section; two schedules firing at
/// the same instant still run concurrently with respect to each other.
pub async fn run_forever(
  configs: Vec<Config>,
  lock_registry: Arc<LockRegistry>,
  log_capture: LogCapture,
) -> anyhow::Result<()> {
  let schedules = build_schedules(configs);
  if schedules.is_empty() {
    anyhow::bail!("no schedule has a usable cron expression; nothing to run");
  }

  for schedule in schedules {
    let lock_registry = lock_registry.clone();
    let log_capture = log_capture.clone();
    tokio::spawn(async move {
      loop {
        let now = Utc::now();
        let next = match schedule.cron.find_next_occurrence(&now, false) {
          Ok(next) => next,
          Err(e) => {
            error!(schedule = schedule.name.as_str(), error = %e, "failed to compute next occurrence, stopping schedule");
            return;
          }
        };
        let wait = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(wait).await;

        info!(schedule = schedule.name.as_str(), "schedule firing");
        let outcome = backup_orchestrator::run(
          schedule.config.clone(),
          &schedule.name,
          &lock_registry,
          &log_capture,
        )
        .await;
        if outcome.error_count > 0 {
          warn!(
            schedule = schedule.name.as_str(),
            errors = outcome.error_count,
            exit_code = outcome.exit_code,
            "scheduled run completed with errors"
          );
        } else {
          info!(schedule = schedule.name.as_str(), "scheduled run completed");
        }
      }
    });
  }

  // Park the calling task; the spawned schedule loops run until the
  // process is terminated.
  std::future::pending::<()>().await;
  Ok(())
}
