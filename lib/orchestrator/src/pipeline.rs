use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use backup_archive::{create_archive, render_filename, Compression};
use backup_config::Config;
use backup_crypto::EncryptionMode;
use backup_engine::{DockerClient, HookPhase, HookTiming, StoppedTarget};
use backup_lock::LockRegistry;
use backup_logger::LogCapture;
use backup_notify::{dispatch, NotificationContext, NotificationLevel, RunStats, StorageStats};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::backends::configured_backends;
use crate::context::RunContext;
use crate::error::{exit_code, ErrorKind, StageError};
use crate::hooks::run_hooks;

const DEFAULT_NOTIFICATION_TEMPLATE: &str = r#"
{%- if Error -%}
Backup run FAILED at {{ formatTime(time=Stats.end_time) }}: {{ Error }}
{%- else -%}
Backup run succeeded at {{ formatTime(time=Stats.end_time) }} in {{ Stats.took_seconds }}s.
{%- endif %}
Archive: {{ Stats.backup_file }}
Containers touched: {{ Stats.containers }}, services touched: {{ Stats.services }}
{% for name, storage in Stats.storages -%}
  {{ name }}: total={{ storage.total }} pruned={{ storage.pruned }} errors={{ storage.prune_errors }}
{% endfor -%}
---
{{ Stats.log_output }}
"#;

/// Outcome of a single run, used by the multi-schedule coordinator to
/// decide the process exit code and whether to keep scheduling.
pub struct RunOutcome {
  pub exit_code: i32,
  pub error_count: usize,
}

fn resolve_encryption_mode(config: &Config) -> anyhow::Result<EncryptionMode> {
  let mut modes = Vec::new();
  if let Some(passphrase) = &config.encryption.gpg_passphrase {
    modes.push(EncryptionMode::GpgSymmetric {
      passphrase: passphrase.clone(),
    });
  }
  if let Some(ring) = &config.encryption.gpg_public_key_ring_file {
    modes.push(EncryptionMode::GpgAsymmetric {
      public_key_ring_file: PathBuf::from(ring),
    });
  }
  if let Some(passphrase) = &config.encryption.age_passphrase {
    modes.push(EncryptionMode::AgeSymmetric {
      passphrase: passphrase.clone(),
    });
  }
  if !config.encryption.age_public_keys.is_empty() {
    modes.push(EncryptionMode::AgeAsymmetric {
      recipients: config.encryption.age_public_keys.clone(),
    });
  }
  match modes.len() {
    0 => Ok(EncryptionMode::None),
    1 => Ok(modes.into_iter().next().unwrap()),
    _ => Err(anyhow::anyhow!(
      "configuration error: more than one encryption mode configured; they are mutually exclusive"
    )),
  }
}

/// Resumes every target still recorded as stopped in `ctx`, draining
/// the list so a later call (the terminal finalizer) is a no-op.
/// Swarm-member containers are restarted via a single force-update per
/// service name rather than being started individually.
async fn resume_all(engine: &DockerClient, ctx: &mut RunContext, stage: &'static str) {
  let targets = std::mem::take(&mut ctx.stopped_targets);
  let mut updated_services = std::collections::HashSet::new();

  for target in targets {
    let result = match &target {
      StoppedTarget::Container {
        swarm_service: Some(service),
        ..
      } => {
        if updated_services.insert(service.clone()) {
          engine.force_update_service(service).await
        } else {
          Ok(())
        }
      }
      StoppedTarget::Container { id, .. } => engine.start_container(id).await,
      StoppedTarget::Service {
        id,
        previous_replicas,
        ..
      } => engine.scale_service(id, *previous_replicas).await,
    };
    if let Err(e) = result {
      error!(target = target.display_name(), error = %e, "failed to resume target");
      ctx.push(StageError::new(
        ErrorKind::Engine,
        stage,
        e.context(format!("failed to resume {}", target.display_name())),
      ));
    } else {
      info!(target = target.display_name(), "target resumed");
    }
  }
}

/// Runs exactly one backup, end to end, for `config` under `schedule`
/// (the schedule name identifies the advisory lock this run contends
/// for; single-shot invocations use a fixed name).
pub async fn run(
  config: Config,
  schedule: &str,
  lock_registry: &LockRegistry,
  log_capture: &LogCapture,
) -> RunOutcome {
  let start_time = Utc::now();
  let mut ctx = RunContext::new(start_time);

  let lock_timeout = Duration::from_secs(config.locking.timeout_secs);
  let guard = match lock_registry.acquire(schedule, lock_timeout).await {
    Ok(guard) => guard,
    Err(e) => {
      ctx.push(StageError::new(
        ErrorKind::LockTimeout,
        "acquire-lock",
        anyhow::Error::new(e),
      ));
      return finalize(config, ctx, None, None, log_capture).await;
    }
  };
  ctx.locked_at = Some(Utc::now());

  let engine = match DockerClient::connect(config.engine.docker_host.as_deref()) {
    Ok(engine) => Some(engine),
    Err(e) => {
      warn!(error = %e, "engine unavailable, skipping hook/quiescence stages");
      ctx.push(StageError::new(ErrorKind::Engine, "connect-engine", e));
      None
    }
  };

  if let Some(engine) = &engine {
    let errors = run_hooks(engine, &config, "archive-pre", HookPhase::Archive, HookTiming::Pre).await;
    ctx.errors.extend(errors);

    quiesce(engine, &config, &mut ctx).await;
  }

  let staging_dir = std::env::temp_dir().join("backup-staging");
  let compression = Compression::from_str(&config.compression.compression)
    .unwrap_or(Compression::Gzip);
  let filename = render_filename(
    &config.filename.filename,
    config.filename.filename_expand,
    compression.extension(),
    start_time,
  );
  let staging_path = staging_dir.join(&filename);
  let sources: Vec<PathBuf> = config.sources.sources.iter().map(PathBuf::from).collect();

  match create_archive(&sources, &staging_path, compression).await {
    Ok(()) => {
      ctx.archive_path = Some(staging_path.clone());
      info!(path = %staging_path.display(), "archive created");
    }
    Err(e) => {
      ctx.push(StageError::new(ErrorKind::Archive, "create-archive", e));
    }
  }

  if let Some(engine) = &engine {
    let errors = run_hooks(engine, &config, "archive-post", HookPhase::Archive, HookTiming::Post).await;
    ctx.errors.extend(errors);
  }

  if let Some(path) = ctx.archive_path.clone() {
    match resolve_encryption_mode(&config) {
      Ok(EncryptionMode::None) => {}
      Ok(mode) => match backup_crypto::encrypt(&path, &mode).await {
        Ok(new_path) => {
          ctx.archive_path = Some(new_path);
          ctx.post_processed = true;
        }
        Err(e) => {
          ctx.push(StageError::new(ErrorKind::Encrypt, "post-process", e));
        }
      },
      Err(e) => {
        ctx.push(StageError::new(ErrorKind::Configuration, "post-process", e));
      }
    }
  }

  if ctx.post_processed {
    if let Some(engine) = &engine {
      let errors =
        run_hooks(engine, &config, "process-post", HookPhase::Process, HookTiming::Post).await;
      ctx.errors.extend(errors);
    }
  }

  if let Some(engine) = &engine {
    resume_all(engine, &mut ctx, "resume-targets").await;
  }

  if let Some(engine) = &engine {
    let errors = run_hooks(engine, &config, "copy-pre", HookPhase::Copy, HookTiming::Pre).await;
    ctx.errors.extend(errors);
  }

  if let Some(archive_path) = ctx.archive_path.clone() {
    let backends = configured_backends(&config).await;
    for (name, backend) in &backends {
      match backend.copy(&archive_path).await {
        Ok(()) => info!(backend = name.as_str(), "archive copied"),
        Err(e) => {
          ctx.push(StageError::backend(ErrorKind::Backend, "copy", name, e));
        }
      }
    }

    if let Some(engine) = &engine {
      let errors = run_hooks(engine, &config, "copy-post", HookPhase::Copy, HookTiming::Post).await;
      ctx.errors.extend(errors);
    }

    if config.retention.retention_days > 0 {
      if let Some(engine) = &engine {
        let errors =
          run_hooks(engine, &config, "prune-pre", HookPhase::Prune, HookTiming::Pre).await;
        ctx.errors.extend(errors);
      }

      if config.retention.pruning_leeway_secs > 0 {
        tokio::time::sleep(Duration::from_secs(config.retention.pruning_leeway_secs)).await;
      }

      let deadline = Utc::now() - chrono::Duration::days(config.retention.retention_days);
      for (name, backend) in &backends {
        if config
          .retention
          .skip_backends_from_prune
          .iter()
          .any(|skip| skip.eq_ignore_ascii_case(name))
        {
          continue;
        }
        match backend.prune(deadline, &config.filename.pruning_prefix).await {
          Ok(stats) => {
            ctx.backend_stats.insert(name.clone(), stats);
          }
          Err(e) => {
            ctx.push(StageError::backend(ErrorKind::Backend, "prune", name, e));
          }
        }
      }

      if let Some(engine) = &engine {
        let errors =
          run_hooks(engine, &config, "prune-post", HookPhase::Prune, HookTiming::Post).await;
        ctx.errors.extend(errors);
      }
    } else {
      info!("retentionDays <= 0, skipping prune stage entirely");
    }
  }

  finalize(config, ctx, Some(guard), engine, log_capture).await
}

async fn quiesce(engine: &DockerClient, config: &Config, ctx: &mut RunContext) {
  let wanted = config.lifecycle.stop_during_backup_label.as_deref();

  let containers = match engine.list_containers().await {
    Ok(containers) => containers,
    Err(e) => {
      ctx.push(StageError::new(ErrorKind::Engine, "quiesce", e));
      return;
    }
  };
  let services = match engine.list_swarm_services().await {
    Ok(services) => services,
    Err(e) => {
      ctx.push(StageError::new(ErrorKind::Engine, "quiesce", e));
      Vec::new()
    }
  };

  let mut quiesced_services = std::collections::HashSet::new();

  for service in &services {
    let Some(selector) = backup_engine::stop_during_backup_selector(&service.labels) else {
      continue;
    };
    if !selector.matches(wanted) {
      continue;
    }
    let Some(replicas) = service.replicas else {
      continue;
    };
    match engine.scale_service(&service.id, 0).await {
      Ok(()) => {
        quiesced_services.insert(service.name.clone());
        ctx.services_touched += 1;
        ctx.stopped_targets.push(StoppedTarget::Service {
          id: service.id.clone(),
          name: service.name.clone(),
          previous_replicas: replicas,
        });
        info!(service = service.name.as_str(), "service scaled to 0");
      }
      Err(e) => {
        ctx.push(StageError::new(
          ErrorKind::Engine,
          "quiesce",
          e.context(format!("failed to scale down service {}", service.name)),
        ));
      }
    }
  }

  for container in &containers {
    let Some(selector) = backup_engine::stop_during_backup_selector(&container.labels) else {
      continue;
    };
    if !selector.matches(wanted) {
      continue;
    }
    if let Some(service) = &container.swarm_service {
      if quiesced_services.contains(service) {
        continue;
      }
    }
    match engine.stop_container(&container.id).await {
      Ok(()) => {
        ctx.containers_touched += 1;
        ctx.stopped_targets.push(StoppedTarget::Container {
          id: container.id.clone(),
          name: container.name.clone(),
          swarm_service: container.swarm_service.clone(),
        });
        info!(container = container.name.as_str(), "container stopped");
      }
      Err(e) => {
        ctx.push(StageError::new(
          ErrorKind::Engine,
          "quiesce",
          e.context(format!("failed to stop container {}", container.name)),
        ));
      }
    }
  }
}

async fn finalize(
  config: Config,
  mut ctx: RunContext,
  guard: Option<backup_lock::LockGuard>,
  engine: Option<DockerClient>,
  log_capture: &LogCapture,
) -> RunOutcome {
  let backup_file = ctx
    .archive_path
    .as_ref()
    .map(|path| path.display().to_string())
    .unwrap_or_default();

  if let Some(path) = ctx.archive_path.take() {
    if let Err(e) = tokio::fs::remove_file(&path).await {
      if e.kind() != std::io::ErrorKind::NotFound {
        warn!(path = %path.display(), error = %e, "failed to clean up staging file");
      }
    }
  }

  if let Some(engine) = &engine {
    resume_all(engine, &mut ctx, "finalize").await;
  }

  let end_time = Utc::now();
  let took_seconds = (end_time - ctx.start_time).num_milliseconds() as f64 / 1000.0;
  let locked_seconds = ctx
    .locked_at
    .map(|locked_at| (end_time - locked_at).num_milliseconds() as f64 / 1000.0)
    .unwrap_or(0.0);

  let storages = ctx
    .backend_stats
    .iter()
    .map(|(name, stats)| {
      (
        name.clone(),
        StorageStats {
          total: stats.total,
          pruned: stats.pruned,
          prune_errors: stats.prune_errors,
        },
      )
    })
    .collect();

  let error_message = if ctx.errors.is_empty() {
    None
  } else {
    Some(
      ctx
        .errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; "),
    )
  };

  let stats = RunStats {
    start_time: Some(ctx.start_time),
    end_time: Some(end_time),
    took_seconds,
    locked_seconds,
    log_output: log_capture.snapshot(),
    containers: ctx.containers_touched,
    services: ctx.services_touched,
    backup_file,
    storages,
  };

  let level = config
    .notifications
    .level
    .as_deref()
    .map(|level| match level.to_ascii_lowercase().as_str() {
      "info" => NotificationLevel::Info,
      _ => NotificationLevel::Error,
    })
    .unwrap_or_default();

  let notification_ctx = NotificationContext {
    config: backup_config::sanitize(&serde_json::to_value(&config).unwrap_or_default()),
    error: error_message,
    stats,
  };

  if let Ok(client) = reqwest::Client::builder().build() {
    if let Err(e) = dispatch(
      &client,
      &config.notifications.urls,
      level,
      DEFAULT_NOTIFICATION_TEMPLATE,
      &notification_ctx,
    )
    .await
    {
      ctx.push(StageError::new(ErrorKind::Notify, "notify", e));
    }
  }

  log_capture.clear();
  drop(guard);

  RunOutcome {
    exit_code: exit_code(&ctx.errors),
    error_count: ctx.errors.len(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test_config(source: &std::path::Path, dest: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.sources.sources = vec![source.display().to_string()];
    config.filename.filename = "test-{{ .Extension }}".to_string();
    config.filename.filename_expand = false;
    config.storage.local.archive = Some(dest.display().to_string());
    config.retention.retention_days = 0;
    config.locking.timeout_secs = 5;
    config
  }

  #[tokio::test]
  async fn engine_unavailable_does_not_block_archive_and_copy() {
    let src_dir = tempfile::tempdir().unwrap();
    tokio::fs::write(src_dir.path().join("data.txt"), b"hello")
      .await
      .unwrap();
    let dest_dir = tempfile::tempdir().unwrap();

    let config = test_config(src_dir.path(), dest_dir.path());
    let lock_registry = LockRegistry::new();
    let log_capture = LogCapture::new(4096);

    let outcome = run(config, "test", &lock_registry, &log_capture).await;

    // No docker socket is available in this environment, so the
    // connect-engine stage records exactly one non-fatal error; the
    // rest of the pipeline still runs to completion.
    assert_eq!(outcome.error_count, 1);
    assert_eq!(outcome.exit_code, 1);
    assert!(dest_dir.path().join("test-tar.gz").exists());
  }

  #[tokio::test]
  async fn retention_days_zero_skips_prune_entirely() {
    let src_dir = tempfile::tempdir().unwrap();
    tokio::fs::write(src_dir.path().join("data.txt"), b"hello")
      .await
      .unwrap();
    let dest_dir = tempfile::tempdir().unwrap();

    let old_path = dest_dir.path().join("old-1.tar.gz");
    tokio::fs::write(&old_path, b"stale").await.unwrap();
    let old_time = std::time::SystemTime::now() - Duration::from_secs(400 * 24 * 3600);
    let file = std::fs::File::options().write(true).open(&old_path).unwrap();
    file.set_modified(old_time).unwrap();

    let mut config = test_config(src_dir.path(), dest_dir.path());
    config.filename.pruning_prefix = "old-".to_string();
    config.retention.retention_days = 0;

    let lock_registry = LockRegistry::new();
    let log_capture = LogCapture::new(4096);
    run(config, "test", &lock_registry, &log_capture).await;

    assert!(old_path.exists(), "prune must not run when retentionDays <= 0");
  }

  #[tokio::test]
  async fn lock_timeout_short_circuits_and_reports_exit_code_two() {
    let lock_registry = LockRegistry::new();
    let held = lock_registry
      .acquire("test", Duration::from_secs(5))
      .await
      .unwrap();

    let src_dir = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(src_dir.path(), dest_dir.path());
    config.locking.timeout_secs = 0;

    let log_capture = LogCapture::new(4096);
    let outcome = run(config, "test", &lock_registry, &log_capture).await;

    assert_eq!(outcome.exit_code, 2);
    assert_eq!(outcome.error_count, 1);
    drop(held);
  }

  #[test]
  fn resolve_encryption_mode_rejects_multiple_modes() {
    let mut config = Config::default();
    config.encryption.gpg_passphrase = Some("a".to_string());
    config.encryption.age_passphrase = Some("b".to_string());
    assert!(resolve_encryption_mode(&config).is_err());
  }

  #[test]
  fn resolve_encryption_mode_defaults_to_none() {
    let config = Config::default();
    assert!(matches!(
      resolve_encryption_mode(&config).unwrap(),
      EncryptionMode::None
    ));
  }
}
