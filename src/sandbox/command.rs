//! Argument vectors for every lifecycle operation.
//!
//! Pure: no I/O, no environment lookups. The same inputs always produce the
//! same tokens, which keeps the echoed command line and the tests honest.

use std::fmt;

use super::error::SandboxError;
use super::settings::SandboxConfig;

/// Port used for proxy bypass rules when the host carries none.
pub const DEFAULT_BYPASS_PORT: u16 = 80;

/// Whether the named sandbox is currently known to the runtime.
///
/// Re-queried for every operation; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Absent,
    Exists,
}

impl SandboxState {
    pub fn from_exists(exists: bool) -> Self {
        if exists { Self::Exists } else { Self::Absent }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Exists => "present",
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the child process is attached to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// No terminal; output streamed line by line to a callback.
    Batch,
    /// The caller's own stdin/stdout/stderr are handed to the child.
    Terminal,
    /// A pseudo-terminal for the child while the parent captures the output.
    Capture,
}

/// One external-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    tokens: Vec<String>,
    mode: AttachMode,
}

impl CommandSpec {
    pub fn new(tokens: Vec<String>, mode: AttachMode) -> Self {
        Self { tokens, mode }
    }

    pub fn program(&self) -> &str {
        self.tokens().first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.tokens().get(1..).unwrap_or_default()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn mode(&self) -> AttachMode {
        self.mode
    }

    /// Readable rendering for display. Not meant for re-execution.
    pub fn command_line(&self) -> String {
        self.tokens.join(" ")
    }

    /// Shell-quoted rendering, safe to paste into a shell.
    pub fn shell_line(&self) -> String {
        crate::shell::quote_command(&self.tokens)
    }
}

/// A lifecycle operation together with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    Build,
    Create,
    Interactive,
    Prompt(&'a str),
    /// Raw agent CLI arguments passed after the separator.
    AgentCommand(&'a [String]),
    Exec(&'a [String]),
    Remove,
    ProxyBypass(&'a str),
}

impl Operation<'_> {
    fn verb(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Create => "create",
            Self::Interactive | Self::Prompt(_) | Self::AgentCommand(_) => "run",
            Self::Exec(_) => "exec",
            Self::Remove => "remove",
            Self::ProxyBypass(_) => "configure network for",
        }
    }

    /// Attachment mode each operation is executed with.
    pub fn attach_mode(&self) -> AttachMode {
        match self {
            Self::Interactive | Self::Exec(_) => AttachMode::Terminal,
            Self::Prompt(_) | Self::AgentCommand(_) => AttachMode::Capture,
            Self::Build | Self::Create | Self::Remove | Self::ProxyBypass(_) => AttachMode::Batch,
        }
    }
}

/// Produce the command for `operation` given the sandbox's current state.
///
/// Operations that only make sense for one state are refused for the other
/// rather than handed to the runtime to fail ambiguously.
pub fn build_command(
    operation: Operation<'_>,
    config: &SandboxConfig,
    state: SandboxState,
) -> Result<CommandSpec, SandboxError> {
    let name = config.identity();
    let mode = operation.attach_mode();
    let refuse = |state: SandboxState| SandboxError::InvalidState {
        operation: operation.verb(),
        name: name.clone(),
        state: state.as_str(),
    };

    let tokens = match operation {
        Operation::Build => build_tokens(config),
        Operation::Create => {
            if state == SandboxState::Exists {
                return Err(refuse(state));
            }
            provision_tokens(config, "create", &name)
        }
        Operation::Interactive => run_tokens(config, state, &name),
        Operation::Prompt(prompt) => {
            let mut tokens = run_tokens(config, state, &name);
            tokens.extend(["--".to_string(), "-p".to_string(), prompt.to_string()]);
            tokens
        }
        Operation::AgentCommand(args) => {
            let mut tokens = run_tokens(config, state, &name);
            tokens.push("--".to_string());
            tokens.extend(args.iter().cloned());
            tokens
        }
        Operation::Exec(command) => {
            if state == SandboxState::Absent {
                return Err(SandboxError::not_found(name.clone()));
            }
            if command.is_empty() {
                return Err(SandboxError::configuration("exec requires a command"));
            }
            let mut tokens = sandbox_tokens(config, "exec");
            tokens.extend([name.clone(), "--".to_string()]);
            tokens.extend(command.iter().cloned());
            tokens
        }
        Operation::Remove => {
            if state == SandboxState::Absent {
                return Err(SandboxError::not_found(name.clone()));
            }
            let mut tokens = sandbox_tokens(config, "rm");
            tokens.push(name.clone());
            tokens
        }
        Operation::ProxyBypass(host) => {
            if state == SandboxState::Absent {
                return Err(SandboxError::not_found(name.clone()));
            }
            let mut tokens = sandbox_tokens(config, "network");
            tokens.extend([
                "proxy".to_string(),
                name.clone(),
                "--bypass-host".to_string(),
                bypass_target(host),
            ]);
            tokens
        }
    };

    Ok(CommandSpec::new(tokens, mode))
}

/// `host` with the default port appended unless it already names one.
pub fn bypass_target(host: &str) -> String {
    if has_explicit_port(host) {
        host.to_string()
    } else if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{DEFAULT_BYPASS_PORT}")
    } else {
        format!("{host}:{DEFAULT_BYPASS_PORT}")
    }
}

/// `name:port` or `[v6]:port`. A bare IPv6 literal carries no port.
fn has_explicit_port(host: &str) -> bool {
    host.rsplit_once(':').is_some_and(|(name, port)| {
        !name.is_empty()
            && (!name.contains(':') || name.ends_with(']'))
            && !port.is_empty()
            && port.chars().all(|c| c.is_ascii_digit())
    })
}

fn build_tokens(config: &SandboxConfig) -> Vec<String> {
    vec![
        config.runtime.clone(),
        "build".to_string(),
        "--progress=quiet".to_string(),
        "-t".to_string(),
        config.image.clone(),
        "-f".to_string(),
        config.template_source.to_string_lossy().into_owned(),
        config.build_context().to_string_lossy().into_owned(),
    ]
}

fn sandbox_tokens(config: &SandboxConfig, subcommand: &str) -> Vec<String> {
    vec![
        config.runtime.clone(),
        "sandbox".to_string(),
        subcommand.to_string(),
    ]
}

/// Tokens that both provision and name a sandbox (`create`, or `run` on an absent one).
fn provision_tokens(config: &SandboxConfig, subcommand: &str, name: &str) -> Vec<String> {
    let mut tokens = sandbox_tokens(config, subcommand);
    tokens.extend([
        "--load-local-template".to_string(),
        "-t".to_string(),
        config.image.clone(),
        "--name".to_string(),
        name.to_string(),
        config.entrypoint.clone(),
        config.workspace.to_string_lossy().into_owned(),
    ]);
    tokens
}

fn run_tokens(config: &SandboxConfig, state: SandboxState, name: &str) -> Vec<String> {
    match state {
        SandboxState::Absent => provision_tokens(config, "run", name),
        SandboxState::Exists => {
            let mut tokens = sandbox_tokens(config, "run");
            tokens.push(name.to_string());
            tokens
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> SandboxConfig {
        SandboxConfig::new(
            "docker",
            "turbo",
            "/opt/turbo/docker/Dockerfile",
            "/home/user/shop",
            "claude",
            vec!["api.test".to_string()],
        )
        .unwrap()
    }

    fn has(spec: &CommandSpec, token: &str) -> bool {
        spec.tokens().iter().any(|t| t == token)
    }

    fn tokens(op: Operation<'_>, state: SandboxState) -> Vec<String> {
        build_command(op, &make_config(), state)
            .unwrap()
            .tokens()
            .to_vec()
    }

    #[test]
    fn test_build_command_shape() {
        let spec = build_command(Operation::Build, &make_config(), SandboxState::Absent).unwrap();
        assert_eq!(
            spec.tokens(),
            [
                "docker",
                "build",
                "--progress=quiet",
                "-t",
                "turbo",
                "-f",
                "/opt/turbo/docker/Dockerfile",
                "/opt/turbo/docker",
            ]
        );
        assert_eq!(spec.mode(), AttachMode::Batch);
    }

    #[test]
    fn test_build_ignores_state() {
        assert_eq!(
            tokens(Operation::Build, SandboxState::Absent),
            tokens(Operation::Build, SandboxState::Exists)
        );
    }

    #[test]
    fn test_create_command_shape() {
        assert_eq!(
            tokens(Operation::Create, SandboxState::Absent),
            [
                "docker",
                "sandbox",
                "create",
                "--load-local-template",
                "-t",
                "turbo",
                "--name",
                "claude-shop",
                "claude",
                "/home/user/shop",
            ]
        );
    }

    #[test]
    fn test_create_refused_when_exists() {
        let err =
            build_command(Operation::Create, &make_config(), SandboxState::Exists).unwrap_err();
        assert!(matches!(err, SandboxError::InvalidState { .. }));
    }

    #[test]
    fn test_interactive_absent_provisions() {
        let spec =
            build_command(Operation::Interactive, &make_config(), SandboxState::Absent).unwrap();
        assert_eq!(spec.tokens()[..3], ["docker", "sandbox", "run"]);
        assert!(has(&spec, "--load-local-template"));
        assert!(has(&spec, "/home/user/shop"));
        assert_eq!(spec.mode(), AttachMode::Terminal);
    }

    #[test]
    fn test_interactive_exists_attaches_by_name() {
        let spec =
            build_command(Operation::Interactive, &make_config(), SandboxState::Exists).unwrap();
        assert_eq!(spec.tokens(), ["docker", "sandbox", "run", "claude-shop"]);
        assert!(!has(&spec, "--load-local-template"));
        assert!(!has(&spec, "/home/user/shop"));
    }

    #[test]
    fn test_prompt_keeps_text_as_one_token() {
        let spec = build_command(
            Operation::Prompt("fix the failing tests please"),
            &make_config(),
            SandboxState::Exists,
        )
        .unwrap();
        assert_eq!(
            spec.tokens(),
            [
                "docker",
                "sandbox",
                "run",
                "claude-shop",
                "--",
                "-p",
                "fix the failing tests please",
            ]
        );
        assert_eq!(spec.mode(), AttachMode::Capture);
    }

    #[test]
    fn test_prompt_absent_includes_template_and_workspace() {
        let t = tokens(Operation::Prompt("hello"), SandboxState::Absent);
        assert!(t.contains(&"--load-local-template".to_string()));
        assert!(t.contains(&"/home/user/shop".to_string()));
        assert_eq!(t[t.len() - 3..], ["--", "-p", "hello"]);
    }

    #[test]
    fn test_agent_command_passes_args_verbatim() {
        let args = vec![
            "plugin".to_string(),
            "install".to_string(),
            "superpowers@superpowers-marketplace".to_string(),
        ];
        let t = tokens(Operation::AgentCommand(&args), SandboxState::Exists);
        assert_eq!(
            t,
            [
                "docker",
                "sandbox",
                "run",
                "claude-shop",
                "--",
                "plugin",
                "install",
                "superpowers@superpowers-marketplace",
            ]
        );
    }

    #[test]
    fn test_exec_command_shape() {
        let cmd = vec!["ls".to_string(), "-la".to_string()];
        assert_eq!(
            tokens(Operation::Exec(&cmd), SandboxState::Exists),
            ["docker", "sandbox", "exec", "claude-shop", "--", "ls", "-la"]
        );
    }

    #[test]
    fn test_exec_requires_existing_sandbox() {
        let cmd = vec!["ls".to_string()];
        let err = build_command(Operation::Exec(&cmd), &make_config(), SandboxState::Absent)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_exec_requires_command() {
        let err = build_command(Operation::Exec(&[]), &make_config(), SandboxState::Exists)
            .unwrap_err();
        assert!(matches!(err, SandboxError::Configuration { .. }));
    }

    #[test]
    fn test_remove_command_shape() {
        assert_eq!(
            tokens(Operation::Remove, SandboxState::Exists),
            ["docker", "sandbox", "rm", "claude-shop"]
        );
    }

    #[test]
    fn test_remove_refused_when_absent() {
        let err =
            build_command(Operation::Remove, &make_config(), SandboxState::Absent).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_proxy_bypass_defaults_port() {
        assert_eq!(
            tokens(Operation::ProxyBypass("api.test"), SandboxState::Exists),
            [
                "docker",
                "sandbox",
                "network",
                "proxy",
                "claude-shop",
                "--bypass-host",
                "api.test:80",
            ]
        );
    }

    #[test]
    fn test_bypass_target_preserves_explicit_port() {
        assert_eq!(bypass_target("api.test:8080"), "api.test:8080");
        assert_eq!(bypass_target("api.test"), "api.test:80");
        assert_eq!(bypass_target("127.0.0.1:3000"), "127.0.0.1:3000");
    }

    #[test]
    fn test_bypass_target_ipv6_literals() {
        assert_eq!(bypass_target("::1"), "[::1]:80");
        assert_eq!(bypass_target("fe80::1"), "[fe80::1]:80");
        assert_eq!(bypass_target("[::1]"), "[::1]:80");
        assert_eq!(bypass_target("[::1]:8080"), "[::1]:8080");
    }

    #[test]
    fn test_command_line_is_unquoted() {
        let spec = build_command(
            Operation::Prompt("two words"),
            &make_config(),
            SandboxState::Exists,
        )
        .unwrap();
        assert_eq!(
            spec.command_line(),
            "docker sandbox run claude-shop -- -p two words"
        );
        assert_eq!(
            spec.shell_line(),
            "docker sandbox run claude-shop -- -p 'two words'"
        );
    }
}
