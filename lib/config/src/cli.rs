use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for the `backup` agent.
///
/// Configuration is assembled from three sources, in strictly
/// hierarchical priority: these args, then the environment, then the
/// conf directory, then built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "backup", author, about, version)]
pub struct CliArgs {
  /// Path to a conf file or directory to use. Can be passed multiple
  /// times; directories are scanned for files matching `--config-keyword`.
  #[arg(long, short = 'c')]
  pub config_path: Option<Vec<PathBuf>>,

  /// Keyword used to match config file names inside a directory passed
  /// to `--config-path`. Supports wildcard syntax. Can be passed
  /// multiple times.
  #[arg(long, short = 'm')]
  pub config_keyword: Option<Vec<String>>,

  /// Run once and exit instead of registering cron schedules.
  #[arg(long)]
  pub once: bool,

  /// Print the fully resolved configuration (including secrets) to
  /// stdout instead of running.
  #[arg(long)]
  pub show_config: bool,

  /// Override the logging level: error, warn, info, debug, trace.
  #[arg(long)]
  pub log_level: Option<tracing::Level>,
}
