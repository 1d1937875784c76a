//! Per-workspace agent sandboxes backed by a container runtime.

pub mod command;
pub mod error;
pub mod hosts;
pub mod manager;
pub mod process;
pub mod runtime;
pub mod settings;

pub use command::{Operation, SandboxState};
pub use error::SandboxError;
pub use manager::{Provision, SandboxManager};
pub use process::{OutputStream, ProcessExit, SandboxProcess};
pub use runtime::DockerCli;
pub use settings::SandboxConfig;

/// Manager for the configured workspace, driving the configured runtime binary.
pub fn manager_from_config(
    config: &crate::config::Config,
) -> Result<SandboxManager<DockerCli>, SandboxError> {
    let settings = SandboxConfig::from_config(config)?;
    let runtime = DockerCli::new(settings.runtime.clone());
    Ok(SandboxManager::new(settings, runtime))
}
