//! Sandbox lifecycle: existence, creation and the operations run against it.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::command::{CommandSpec, Operation, SandboxState, build_command};
use super::error::SandboxError;
use super::hosts::{HostMapping, map_hosts, resolve_hosts};
use super::process::{OutputStream, SandboxProcess};
use super::runtime::{ContainerRuntime, ExecOutcome, sandbox_exists};
use super::settings::SandboxConfig;

/// What `ensure_exists` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provision {
    Existing,
    Created,
}

/// Result of one host's proxy bypass attempt.
#[derive(Debug)]
pub struct HostOutcome {
    pub mapping: HostMapping,
    pub error: Option<SandboxError>,
}

impl HostOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Point-in-time summary for `turbo status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxStatus {
    pub identity: String,
    pub image: String,
    pub workspace: PathBuf,
    pub runtime: String,
    pub runtime_available: bool,
    pub state: SandboxState,
}

/// Drives one workspace's sandbox through a container runtime.
///
/// Holds no sandbox state of its own: every decision re-queries the runtime.
pub struct SandboxManager<R: ContainerRuntime> {
    config: SandboxConfig,
    runtime: R,
}

impl<R: ContainerRuntime> SandboxManager<R> {
    pub fn new(config: SandboxConfig, runtime: R) -> Self {
        Self { config, runtime }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn identity(&self) -> String {
        self.config.identity()
    }

    pub fn exists(&self) -> bool {
        sandbox_exists(&self.runtime, &self.identity())
    }

    pub fn state(&self) -> SandboxState {
        SandboxState::from_exists(self.exists())
    }

    pub fn runtime_available(&self) -> bool {
        self.runtime.is_available()
    }

    /// Fail with [`SandboxError::RuntimeUnavailable`] when the runtime binary is missing.
    pub fn require_runtime(&self) -> Result<(), SandboxError> {
        if self.runtime_available() {
            Ok(())
        } else {
            Err(SandboxError::runtime_unavailable(
                self.runtime.binary(),
                format!("'{}' was not found in PATH", self.runtime.binary()),
            ))
        }
    }

    /// Command for `operation` against the state observed right now.
    ///
    /// A missing runtime is reported as such, not as an absent sandbox.
    pub fn command_for(&self, operation: Operation<'_>) -> Result<CommandSpec, SandboxError> {
        self.require_runtime()?;
        build_command(operation, &self.config, self.state())
    }

    /// Build the sandbox image from the template source.
    pub fn build_image(
        &self,
        sink: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ExecOutcome, SandboxError> {
        self.require_runtime()?;
        let spec = build_command(Operation::Build, &self.config, SandboxState::Absent)?;
        info!(image = %self.config.image, "sandbox:build");
        let outcome = self.runtime.execute(spec, sink)?;
        outcome.ensure_success("Image build")?;
        Ok(outcome)
    }

    /// Create the sandbox unless the runtime already lists it.
    ///
    /// Two calls in a row issue at most one create: the second observes the
    /// first one's sandbox.
    pub fn ensure_exists(&self) -> Result<Provision, SandboxError> {
        let name = self.identity();
        if sandbox_exists(&self.runtime, &name) {
            debug!(name, "sandbox:ensure existing");
            return Ok(Provision::Existing);
        }

        self.require_runtime()?;
        let spec = build_command(Operation::Create, &self.config, SandboxState::Absent)?;
        info!(name, workspace = %self.config.workspace.display(), "sandbox:create");
        let outcome = self.runtime.execute(spec, &mut |_, _| {})?;
        if !outcome.success() {
            let detail = if outcome.stderr.trim().is_empty() {
                &outcome.output
            } else {
                &outcome.stderr
            };
            return Err(SandboxError::from_create_failure(
                &name,
                outcome.exit.code(),
                detail,
            ));
        }
        Ok(Provision::Created)
    }

    /// Ensure the sandbox, then build the run command for an existing one.
    fn run_spec(&self, operation: Operation<'_>) -> Result<CommandSpec, SandboxError> {
        self.ensure_exists()?;
        build_command(operation, &self.config, SandboxState::Exists)
    }

    /// A not-yet-started agent session attached to the caller's terminal.
    pub fn interactive_process(&self) -> Result<SandboxProcess, SandboxError> {
        let spec = self.run_spec(Operation::Interactive)?;
        info!(name = %self.identity(), "sandbox:interactive");
        Ok(SandboxProcess::new(spec))
    }

    /// A not-yet-started process answering one prompt. The caller drives it,
    /// usually through a poll loop.
    pub fn prompt_process(&self, prompt: &str) -> Result<SandboxProcess, SandboxError> {
        let spec = self.run_spec(Operation::Prompt(prompt))?;
        info!(name = %self.identity(), "sandbox:prompt");
        Ok(SandboxProcess::new(spec))
    }

    /// Run raw agent CLI arguments, capturing the output.
    pub fn agent_command(&self, args: &[String]) -> Result<ExecOutcome, SandboxError> {
        let spec = self.run_spec(Operation::AgentCommand(args))?;
        info!(name = %self.identity(), args = ?args, "sandbox:agent command");
        self.runtime.execute(spec, &mut |_, _| {})
    }

    /// A not-yet-started arbitrary command in the sandbox. Refused when the
    /// sandbox does not exist.
    pub fn exec_process(&self, command: &[String]) -> Result<SandboxProcess, SandboxError> {
        let spec = self.command_for(Operation::Exec(command))?;
        info!(name = %self.identity(), command = ?command, "sandbox:exec");
        Ok(SandboxProcess::new(spec))
    }

    /// Remove the sandbox. Refused, without calling the runtime, when absent.
    pub fn remove(&self) -> Result<(), SandboxError> {
        let spec = self.command_for(Operation::Remove)?;
        info!(name = %self.identity(), "sandbox:remove");
        self.runtime
            .execute(spec, &mut |_, _| {})?
            .ensure_success("Sandbox remove")
    }

    /// Remove the sandbox if present, then create it from scratch.
    pub fn recreate(&self) -> Result<(), SandboxError> {
        match self.remove() {
            Err(e) if e.is_not_found() => {
                debug!(name = %self.identity(), "sandbox:recreate nothing to remove")
            }
            other => other?,
        }
        match self.ensure_exists()? {
            Provision::Created => Ok(()),
            Provision::Existing => Err(SandboxError::InvalidState {
                operation: "recreate",
                name: self.identity(),
                state: SandboxState::Exists.as_str(),
            }),
        }
    }

    /// Let the sandbox reach every resolved host through the proxy.
    ///
    /// Every host is attempted even after a failure; `on_host` sees each
    /// outcome as it happens. Returns the mappings when all succeeded.
    pub fn prepare_networking(
        &self,
        mut on_host: impl FnMut(&HostOutcome),
    ) -> Result<Vec<HostMapping>, SandboxError> {
        let hosts = resolve_hosts(&self.config.workspace, &self.config.extra_hosts);
        if hosts.is_empty() {
            info!("sandbox:prepare no hosts to bypass");
            return Ok(Vec::new());
        }

        self.ensure_exists()?;
        let bridge = self.runtime.bridge_address()?;
        let mappings = map_hosts(&hosts, &bridge);
        info!(name = %self.identity(), bridge, hosts = ?hosts, "sandbox:prepare");

        let mut failed = Vec::new();
        for mapping in &mappings {
            let error = self.bypass_host(&mapping.hostname).err();
            if let Some(e) = &error {
                warn!(host = %mapping.hostname, error = %e, "proxy bypass failed");
                failed.push(mapping.hostname.clone());
            }
            on_host(&HostOutcome {
                mapping: mapping.clone(),
                error,
            });
        }

        if failed.is_empty() {
            Ok(mappings)
        } else {
            Err(SandboxError::NetworkPrepare { hosts: failed })
        }
    }

    fn bypass_host(&self, host: &str) -> Result<(), SandboxError> {
        let spec = build_command(
            Operation::ProxyBypass(host),
            &self.config,
            SandboxState::Exists,
        )?;
        self.runtime
            .execute(spec, &mut |_, _| {})?
            .ensure_success("Proxy bypass")
    }

    /// Register a plugin marketplace and install one plugin from it.
    pub fn install_plugins(&self, marketplace: &str, plugin: &str) -> Result<(), SandboxError> {
        let add = [
            "plugin".to_string(),
            "marketplace".to_string(),
            "add".to_string(),
            marketplace.to_string(),
        ];
        let outcome = self.agent_command(&add)?;
        if !outcome.success() && !already_installed(&outcome) {
            outcome.ensure_success("Plugin marketplace add")?;
        }

        let install = [
            "plugin".to_string(),
            "install".to_string(),
            plugin.to_string(),
        ];
        let outcome = self.agent_command(&install)?;
        if !outcome.success() && !already_installed(&outcome) {
            outcome.ensure_success("Plugin install")?;
        }
        Ok(())
    }

    pub fn status(&self) -> SandboxStatus {
        SandboxStatus {
            identity: self.identity(),
            image: self.config.image.clone(),
            workspace: self.config.workspace.clone(),
            runtime: self.config.runtime.clone(),
            runtime_available: self.runtime_available(),
            state: self.state(),
        }
    }
}

fn already_installed(outcome: &ExecOutcome) -> bool {
    let text = format!("{}{}", outcome.output, outcome.stderr).to_lowercase();
    text.contains("already installed")
}
