//! The seam between the lifecycle manager and the container runtime CLI.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cmd::Cmd;

use super::command::CommandSpec;
use super::error::SandboxError;
use super::process::{OutputStream, ProcessExit, SandboxProcess};

/// Result of running one command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit: ProcessExit,
    /// Captured stdout, or the whole pseudo-terminal transcript.
    pub output: String,
    pub stderr: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit.success()
    }

    /// Turn a non-zero exit into a [`SandboxError::ChildProcess`].
    pub fn ensure_success(&self, operation: &str) -> Result<(), SandboxError> {
        if self.success() {
            return Ok(());
        }
        let detail = if self.stderr.trim().is_empty() {
            strip_ansi_escapes::strip_str(&self.output)
        } else {
            self.stderr.clone()
        };
        Err(SandboxError::child_process(
            operation,
            self.exit.code(),
            detail,
        ))
    }
}

/// Operations the manager needs from a container runtime.
pub trait ContainerRuntime {
    /// Name of the runtime binary, used in messages.
    fn binary(&self) -> &str;

    /// Names of every sandbox the runtime knows about.
    fn list_sandboxes(&self) -> Result<Vec<String>, SandboxError>;

    /// Address sandboxes use to reach the host.
    fn bridge_address(&self) -> Result<String, SandboxError>;

    /// Run `spec` to completion, forwarding output to `sink` as it arrives.
    fn execute(
        &self,
        spec: CommandSpec,
        sink: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ExecOutcome, SandboxError>;

    /// Whether the runtime binary can be found at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Membership check against a fresh listing.
///
/// A failed or unparseable listing reports `false`: the caller then attempts
/// a create, which the runtime rejects loudly if the name is in fact taken.
pub fn sandbox_exists<R: ContainerRuntime + ?Sized>(runtime: &R, name: &str) -> bool {
    match runtime.list_sandboxes() {
        Ok(names) => {
            let exists = names.iter().any(|n| n == name);
            debug!(name, exists, "sandbox:exists");
            exists
        }
        Err(e) => {
            warn!(name, error = %e, "sandbox listing failed, treating as absent");
            false
        }
    }
}

/// The `docker` CLI (or a compatible binary) driven as a subprocess.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn probe_error(&self, operation: &str, err: anyhow::Error) -> SandboxError {
        match err.downcast_ref::<std::io::Error>() {
            Some(io) if io.kind() == std::io::ErrorKind::NotFound => {
                SandboxError::runtime_unavailable(
                    &self.binary,
                    format!("'{}' was not found in PATH", self.binary),
                )
            }
            _ => SandboxError::child_process(operation, -1, format!("{err:#}")),
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn binary(&self) -> &str {
        &self.binary
    }

    fn list_sandboxes(&self) -> Result<Vec<String>, SandboxError> {
        let stdout = Cmd::new(&self.binary)
            .args(["sandbox", "ls", "--json"])
            .run_and_capture_stdout()
            .map_err(|e| self.probe_error("Sandbox listing", e))?;
        parse_sandbox_names(&stdout)
    }

    fn bridge_address(&self) -> Result<String, SandboxError> {
        let address = Cmd::new(&self.binary)
            .args([
                "network",
                "inspect",
                "bridge",
                "--format",
                "{{range .IPAM.Config}}{{.Gateway}}{{end}}",
            ])
            .run_and_capture_stdout()
            .map_err(|e| self.probe_error("Bridge network lookup", e))?;
        parse_bridge_address(&address)
    }

    fn execute(
        &self,
        spec: CommandSpec,
        sink: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ExecOutcome, SandboxError> {
        let mut process = SandboxProcess::new(spec);
        let exit = process.run(|stream, text| sink(stream, text))?;
        Ok(ExecOutcome {
            exit,
            output: process.stdout().to_string(),
            stderr: process.stderr().to_string(),
        })
    }

    fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct SandboxEntry {
    #[serde(alias = "Name", alias = "id", alias = "ID")]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SandboxListing {
    Entries(Vec<SandboxEntry>),
    Names(Vec<String>),
    Wrapped {
        #[serde(alias = "vms")]
        sandboxes: Vec<SandboxEntry>,
    },
    Single(SandboxEntry),
}

impl SandboxListing {
    fn into_names(self) -> Vec<String> {
        match self {
            Self::Entries(entries) | Self::Wrapped { sandboxes: entries } => {
                entries.into_iter().map(|e| e.name).collect()
            }
            Self::Names(names) => names,
            Self::Single(entry) => vec![entry.name],
        }
    }
}

/// Accepts a JSON document (array of objects, array of names, or an object
/// wrapping the array) or one object per line.
fn parse_sandbox_names(stdout: &str) -> Result<Vec<String>, SandboxError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let names = match serde_json::from_str::<SandboxListing>(trimmed) {
        Ok(listing) => listing.into_names(),
        Err(_) => trimmed
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str::<SandboxEntry>(l)
                    .map(|e| e.name)
                    .map_err(|e| {
                        SandboxError::child_process(
                            "Sandbox listing",
                            0,
                            format!("unparseable row {l:?}: {e}"),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let mut seen = HashSet::new();
    Ok(names
        .into_iter()
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.clone()))
        .collect())
}

fn parse_bridge_address(stdout: &str) -> Result<String, SandboxError> {
    stdout
        .split_whitespace()
        .find(|candidate| candidate.parse::<std::net::IpAddr>().is_ok())
        .map(str::to_string)
        .ok_or_else(|| {
            SandboxError::child_process(
                "Bridge network lookup",
                0,
                format!("no gateway address in {:?}", stdout.trim()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_parse_array_of_objects() {
        let json = r#"[{"name":"claude-shop","status":"running"},{"name":"claude-blog"}]"#;
        assert_eq!(
            parse_sandbox_names(json).unwrap(),
            vec!["claude-shop", "claude-blog"]
        );
    }

    #[test]
    fn test_parse_capitalized_keys() {
        let json = r#"[{"Name":"claude-shop","Status":"stopped"}]"#;
        assert_eq!(parse_sandbox_names(json).unwrap(), vec!["claude-shop"]);
    }

    #[test]
    fn test_parse_wrapped_listing() {
        let json = r#"{"vms":[{"name":"claude-shop"}]}"#;
        assert_eq!(parse_sandbox_names(json).unwrap(), vec!["claude-shop"]);
    }

    #[test]
    fn test_parse_plain_names() {
        assert_eq!(
            parse_sandbox_names(r#"["claude-a","claude-a","claude-b"]"#).unwrap(),
            vec!["claude-a", "claude-b"]
        );
    }

    #[test]
    fn test_parse_ndjson_rows() {
        let out = "{\"name\":\"claude-a\"}\n\n{\"name\":\"claude-b\"}\n";
        assert_eq!(
            parse_sandbox_names(out).unwrap(),
            vec!["claude-a", "claude-b"]
        );
    }

    #[test]
    fn test_parse_empty_output_is_empty_set() {
        assert!(parse_sandbox_names("").unwrap().is_empty());
        assert!(parse_sandbox_names("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_sandbox_names("SANDBOX ID   NAME").is_err());
    }

    #[test]
    fn test_parse_bridge_address() {
        assert_eq!(parse_bridge_address("172.17.0.1\n").unwrap(), "172.17.0.1");
        assert!(parse_bridge_address("").is_err());
        assert!(parse_bridge_address("<no value>").is_err());
    }

    struct FailingRuntime {
        calls: Cell<usize>,
    }

    impl ContainerRuntime for FailingRuntime {
        fn binary(&self) -> &str {
            "docker"
        }

        fn list_sandboxes(&self) -> Result<Vec<String>, SandboxError> {
            self.calls.set(self.calls.get() + 1);
            Err(SandboxError::runtime_unavailable("docker", "daemon down"))
        }

        fn bridge_address(&self) -> Result<String, SandboxError> {
            unreachable!()
        }

        fn execute(
            &self,
            _spec: CommandSpec,
            _sink: &mut dyn FnMut(OutputStream, &str),
        ) -> Result<ExecOutcome, SandboxError> {
            unreachable!()
        }
    }

    #[test]
    fn test_failed_listing_reports_absent() {
        let runtime = FailingRuntime {
            calls: Cell::new(0),
        };
        assert!(!sandbox_exists(&runtime, "claude-shop"));
        assert!(!sandbox_exists(&runtime, "claude-shop"));
        assert_eq!(runtime.calls.get(), 2);
    }

    #[test]
    fn test_missing_binary_listing_is_runtime_unavailable() {
        let err = DockerCli::new("turbo-test-no-such-binary")
            .list_sandboxes()
            .unwrap_err();
        assert!(matches!(err, SandboxError::RuntimeUnavailable { .. }));
    }

    #[test]
    fn test_execute_collects_output() {
        let runtime = DockerCli::new("sh");
        let spec = CommandSpec::new(
            vec!["sh".into(), "-c".into(), "echo out; echo err >&2".into()],
            super::super::command::AttachMode::Batch,
        );
        let mut seen = 0;
        let outcome = runtime.execute(spec, &mut |_, _| seen += 1).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.output, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(seen, 2);
    }
}
