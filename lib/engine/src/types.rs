use std::collections::HashMap;

/// A container as seen by `list_containers`, trimmed to the fields the
/// label resolver and quiescence stage need.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
  pub id: String,
  pub name: String,
  pub labels: HashMap<String, String>,
  /// Name of the swarm service this container's task belongs to, if any.
  pub swarm_service: Option<String>,
}

/// A swarm service as seen by `list_swarm_services`.
#[derive(Debug, Clone)]
pub struct SwarmServiceSummary {
  pub id: String,
  pub name: String,
  pub labels: HashMap<String, String>,
  /// `Some` only for replicated-mode services; global-mode services
  /// cannot be scaled to zero and are excluded from quiescence.
  pub replicas: Option<u64>,
}

/// What the quiescence stage paused, and what is needed to resume it.
#[derive(Debug, Clone)]
pub enum StoppedTarget {
  Container {
    id: String,
    name: String,
    /// If the container belongs to a swarm service, it must be resumed
    /// by force-updating the service rather than starting it directly.
    swarm_service: Option<String>,
  },
  Service {
    id: String,
    name: String,
    previous_replicas: u64,
  },
}

impl StoppedTarget {
  pub fn display_name(&self) -> &str {
    match self {
      StoppedTarget::Container { name, .. } => name,
      StoppedTarget::Service { name, .. } => name,
    }
  }
}

/// Output of a hook command executed inside a container via exec.
#[derive(Debug, Clone)]
pub struct ExecOutput {
  pub exit_code: i64,
  pub stdout: String,
  pub stderr: String,
}

impl ExecOutput {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }
}
