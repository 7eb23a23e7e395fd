use std::sync::Arc;

use backup_config::CliArgs;
use backup_lock::LockRegistry;
use backup_logger::LogConfig;
use clap::Parser;

#[macro_use]
extern crate tracing;

mod schedule;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  let args = CliArgs::parse();

  let mut log_config = LogConfig::default();
  if let Some(level) = args.log_level {
    log_config.level = level;
  }
  let log_capture = backup_logger::init(&log_config)?;

  let configs = backup_config::load_all(&args)?;

  if args.show_config {
    for config in &configs {
      println!("{}", serde_json::to_string_pretty(config)?);
    }
    return Ok(());
  }

  info!("backup agent v{}", env!("CARGO_PKG_VERSION"));

  let lock_registry = Arc::new(LockRegistry::new());

  if args.once {
    let mut worst_exit = 0;
    for (i, config) in configs.into_iter().enumerate() {
      let name = format!("schedule-{i}");
      let outcome =
        backup_orchestrator::run(config, &name, &lock_registry, &log_capture).await;
      if outcome.error_count > 0 {
        warn!(
          schedule = name.as_str(),
          errors = outcome.error_count,
          "run completed with errors"
        );
      }
      worst_exit = worst_exit.max(outcome.exit_code);
    }
    std::process::exit(worst_exit);
  }

  schedule::run_forever(configs, lock_registry, log_capture).await
}
