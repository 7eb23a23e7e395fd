mod docker;
mod labels;
mod types;

pub use docker::DockerClient;
pub use labels::{
  exec_label_selector, resolve_hook, stop_during_backup_selector, HookCommand,
  HookPhase, HookTiming, Selector, NAMESPACE,
};
pub use types::{ContainerSummary, ExecOutput, StoppedTarget, SwarmServiceSummary};
