use backup_config::Config;
use backup_engine::{
  exec_label_selector, resolve_hook, DockerClient, HookCommand, HookPhase, HookTiming, Selector,
};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, StageError};

/// Resolves and runs every container's hook command for `phase`/`timing`
/// concurrently, awaiting all of them before returning: the phase
/// boundary is a barrier, but hooks within it run in parallel.
pub async fn run_hooks(
  engine: &DockerClient,
  config: &Config,
  stage: &'static str,
  phase: HookPhase,
  timing: HookTiming,
) -> Vec<StageError> {
  let containers = match engine.list_containers().await {
    Ok(containers) => containers,
    Err(e) => {
      return vec![StageError::new(ErrorKind::Engine, stage, e)];
    }
  };

  let wanted = config.hooks.exec_label.as_deref();
  let hooks: Vec<HookCommand> = containers
    .iter()
    .filter(|c| {
      exec_label_selector(&c.labels)
        .unwrap_or(Selector::Enabled)
        .matches(wanted)
    })
    .filter_map(|c| resolve_hook(&c.id, &c.name, &c.labels, phase, timing))
    .collect();

  let forward_output = config.hooks.exec_forward_output;
  let runs = hooks.into_iter().map(|hook| async move {
    let command = vec![
      backup_command::shell().to_string(),
      "-c".to_string(),
      hook.command.clone(),
    ];
    let result = engine
      .exec(&hook.container_id, command, hook.user.as_deref())
      .await;
    (hook, result)
  });

  let results = futures_util::future::join_all(runs).await;
  let mut errors = Vec::new();
  for (hook, result) in results {
    match result {
      Ok(output) if output.success() => {
        if forward_output {
          info!(
            container = hook.container_name,
            stdout = output.stdout,
            stderr = output.stderr,
            "hook command completed"
          );
        } else {
          debug!(container = hook.container_name, "hook command completed");
        }
      }
      Ok(output) => {
        warn!(
          container = hook.container_name,
          exit_code = output.exit_code,
          stderr = output.stderr,
          "hook command exited non-zero"
        );
        errors.push(StageError::new(
          ErrorKind::Hook,
          stage,
          anyhow::anyhow!(
            "hook on container {} exited {}",
            hook.container_name,
            output.exit_code
          ),
        ));
      }
      Err(e) => {
        errors.push(StageError::new(ErrorKind::Hook, stage, e));
      }
    }
  }
  errors
}
