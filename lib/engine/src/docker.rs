use std::collections::HashMap;

use anyhow::{Context, anyhow};
use bollard::Docker;
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::query_parameters::{
  InspectServiceOptions, ListContainersOptions, ListServicesOptions,
  StartContainerOptions, StopContainerOptions, UpdateServiceOptions,
};
use futures_util::StreamExt;

use crate::types::{
  ContainerSummary, ExecOutput, SwarmServiceSummary,
};

/// Thin adapter over the container engine's API. Mirrors exactly the
/// operations the orchestrator needs: list, stop, start, scale,
/// force-update, exec.
pub struct DockerClient {
  docker: Docker,
}

impl DockerClient {
  pub fn connect(host: Option<&str>) -> anyhow::Result<Self> {
    let docker = match host {
      Some(host) => Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
        .with_context(|| format!("failed to connect to docker host {host}"))?,
      None => Docker::connect_with_local_defaults()
        .context("failed to connect to local docker socket")?,
    };
    Ok(Self { docker })
  }

  pub async fn list_containers(
    &self,
  ) -> anyhow::Result<Vec<ContainerSummary>> {
    let containers = self
      .docker
      .list_containers(Some(ListContainersOptions {
        all: true,
        ..Default::default()
      }))
      .await
      .context("failed to list containers")?;

    let mut summaries = Vec::with_capacity(containers.len());
    for c in containers {
      let id = c.id.clone().unwrap_or_default();
      let name = c
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
      let labels = c.labels.clone().unwrap_or_default();
      let swarm_service = labels
        .get("com.docker.swarm.service.name")
        .cloned();
      summaries.push(ContainerSummary {
        id,
        name,
        labels,
        swarm_service,
      });
    }
    Ok(summaries)
  }

  pub async fn stop_container(&self, id: &str) -> anyhow::Result<()> {
    self
      .docker
      .stop_container(id, None::<StopContainerOptions>)
      .await
      .with_context(|| format!("failed to stop container {id}"))
  }

  pub async fn start_container(&self, id: &str) -> anyhow::Result<()> {
    self
      .docker
      .start_container(id, None::<StartContainerOptions>)
      .await
      .with_context(|| format!("failed to start container {id}"))
  }

  pub async fn list_swarm_services(
    &self,
  ) -> anyhow::Result<Vec<SwarmServiceSummary>> {
    let services = self
      .docker
      .list_services(Option::<ListServicesOptions>::None)
      .await
      .context("failed to list swarm services")?;

    let mut summaries = Vec::with_capacity(services.len());
    for s in services {
      let Some(spec) = s.spec else { continue };
      let id = s.id.unwrap_or_default();
      let name = spec.name.unwrap_or_default();
      let labels = spec.labels.unwrap_or_default();
      let replicas = spec
        .mode
        .and_then(|mode| mode.replicated)
        .and_then(|replicated| replicated.replicas)
        .and_then(|r| u64::try_from(r).ok());
      summaries.push(SwarmServiceSummary {
        id,
        name,
        labels,
        replicas,
      });
    }
    Ok(summaries)
  }

  /// Scales a replicated service to `replicas`. Used to quiesce (0) and
  /// to resume (previous replica count) a swarm service.
  pub async fn scale_service(
    &self,
    service_id: &str,
    replicas: u64,
  ) -> anyhow::Result<()> {
    let current = self
      .docker
      .inspect_service(
        service_id,
        Some(InspectServiceOptions {
          insert_defaults: true,
        }),
      )
      .await
      .with_context(|| {
        format!("failed to inspect service {service_id} before scaling")
      })?;

    let version = current
      .version
      .and_then(|v| v.index)
      .ok_or_else(|| anyhow!("service {service_id} missing version"))?;

    let mut spec = current
      .spec
      .ok_or_else(|| anyhow!("service {service_id} missing spec"))?;

    let mut mode = spec.mode.unwrap_or_default();
    let mut replicated = mode.replicated.unwrap_or_default();
    replicated.replicas = Some(i64::try_from(replicas).unwrap_or(i64::MAX));
    mode.replicated = Some(replicated);
    spec.mode = Some(mode);

    self
      .docker
      .update_service(
        service_id,
        spec,
        Some(UpdateServiceOptions {
          version,
          ..Default::default()
        }),
        None,
      )
      .await
      .with_context(|| format!("failed to scale service {service_id} to {replicas}"))?;
    Ok(())
  }

  /// Forces a rolling update of `service_name` with no spec changes, used
  /// to restart every container belonging to the service after quiescence
  /// when the containers were stopped rather than scaled.
  pub async fn force_update_service(
    &self,
    service_id: &str,
  ) -> anyhow::Result<()> {
    let current = self
      .docker
      .inspect_service(
        service_id,
        Some(InspectServiceOptions {
          insert_defaults: true,
        }),
      )
      .await
      .with_context(|| {
        format!("failed to inspect service {service_id} before force update")
      })?;

    let version = current
      .version
      .and_then(|v| v.index)
      .ok_or_else(|| anyhow!("service {service_id} missing version"))?;
    let mut spec = current
      .spec
      .ok_or_else(|| anyhow!("service {service_id} missing spec"))?;

    let mut task_template = spec.task_template.unwrap_or_default();
    let force_update = task_template.force_update.unwrap_or(0);
    task_template.force_update = Some(force_update + 1);
    spec.task_template = Some(task_template);

    self
      .docker
      .update_service(
        service_id,
        spec,
        Some(UpdateServiceOptions {
          version,
          ..Default::default()
        }),
        None,
      )
      .await
      .with_context(|| format!("failed to force-update service {service_id}"))?;
    Ok(())
  }

  /// Runs `command` inside `container_id` via create/start/inspect exec,
  /// the mechanism hook commands use (spec.md's label namespace runs
  /// hooks inside the labeled container, not on the host).
  pub async fn exec(
    &self,
    container_id: &str,
    command: Vec<String>,
    user: Option<&str>,
  ) -> anyhow::Result<ExecOutput> {
    let exec = self
      .docker
      .create_exec(
        container_id,
        CreateExecOptions {
          cmd: Some(command),
          attach_stdout: Some(true),
          attach_stderr: Some(true),
          user: user.map(|u| u.to_string()),
          ..Default::default()
        },
      )
      .await
      .with_context(|| {
        format!("failed to create exec in container {container_id}")
      })?;

    let mut stdout = String::new();
    let mut stderr = String::new();

    let start_result = self
      .docker
      .start_exec(&exec.id, Some(StartExecOptions::default()))
      .await
      .with_context(|| {
        format!("failed to start exec in container {container_id}")
      })?;

    if let bollard::exec::StartExecResults::Attached { mut output, .. } =
      start_result
    {
      while let Some(Ok(msg)) = output.next().await {
        match msg {
          bollard::container::LogOutput::StdOut { message } => {
            stdout.push_str(&String::from_utf8_lossy(&message));
          }
          bollard::container::LogOutput::StdErr { message } => {
            stderr.push_str(&String::from_utf8_lossy(&message));
          }
          _ => {}
        }
      }
    }

    let inspected = self
      .docker
      .inspect_exec(&exec.id)
      .await
      .with_context(|| {
        format!("failed to inspect exec in container {container_id}")
      })?;

    Ok(ExecOutput {
      exit_code: inspected.exit_code.unwrap_or(-1),
      stdout,
      stderr,
    })
  }
}

/// Extracted for testability: given raw label maps keyed by container
/// name, produce the id->name map used for log messages.
fn names_by_id(
  containers: &[ContainerSummary],
) -> HashMap<String, String> {
  containers
    .iter()
    .map(|c| (c.id.clone(), c.name.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_by_id_maps_correctly() {
    let containers = vec![ContainerSummary {
      id: "abc".into(),
      name: "web".into(),
      labels: HashMap::new(),
      swarm_service: None,
    }];
    let map = names_by_id(&containers);
    assert_eq!(map.get("abc").map(String::as_str), Some("web"));
  }
}
