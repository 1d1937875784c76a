//! Typed failures for sandbox lifecycle operations.
//!
//! Callers match on the variant instead of parsing message strings. Failures
//! of the existence query are deliberately absent: they collapse to "absent".

/// Errors that can occur while provisioning or driving a sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Missing or unusable configuration (empty workspace, missing Dockerfile).
    #[error("Invalid sandbox configuration: {message}")]
    Configuration { message: String },

    /// The container runtime binary could not be executed at all.
    #[error("Container runtime '{runtime}' is not available: {message}")]
    RuntimeUnavailable { runtime: String, message: String },

    /// A create raced with another creator and the name is already taken.
    #[error("Sandbox '{name}' already exists:\n{stderr}")]
    CreateConflict { name: String, stderr: String },

    /// An operation that needs an existing sandbox was asked to act on an absent one.
    #[error("Sandbox '{name}' does not exist")]
    NotFound { name: String },

    /// A command shape was requested for a state it cannot be built for.
    #[error("Cannot {operation} sandbox '{name}' while it is {state}")]
    InvalidState {
        operation: &'static str,
        name: String,
        state: &'static str,
    },

    /// The child process ran but exited unsuccessfully.
    #[error("{operation} failed (exit code {code}){}", format_stderr(.stderr))]
    ChildProcess {
        operation: String,
        code: i32,
        stderr: String,
    },

    /// One or more hosts could not be bypassed; every host was still attempted.
    #[error("Failed to configure proxy bypass for: {}", .hosts.join(", "))]
    NetworkPrepare { hosts: Vec<String> },
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}

impl SandboxError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn runtime_unavailable(runtime: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuntimeUnavailable {
            runtime: runtime.into(),
            message: message.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn child_process(operation: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::ChildProcess {
            operation: operation.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Map a failed create to a conflict when the runtime reports the name is taken.
    pub fn from_create_failure(name: &str, code: i32, stderr: &str) -> Self {
        let lowered = stderr.to_lowercase();
        if lowered.contains("already exists") || lowered.contains("already in use") {
            Self::CreateConflict {
                name: name.to_string(),
                stderr: stderr.trim().to_string(),
            }
        } else {
            Self::child_process("Sandbox create", code, stderr)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::CreateConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = SandboxError::configuration("workspace is empty");
        assert_eq!(
            err.to_string(),
            "Invalid sandbox configuration: workspace is empty"
        );
    }

    #[test]
    fn test_child_process_includes_stderr() {
        let err = SandboxError::child_process("Image build", 2, "  no space left  \n");
        assert_eq!(
            err.to_string(),
            "Image build failed (exit code 2):\nno space left"
        );
    }

    #[test]
    fn test_child_process_without_stderr() {
        let err = SandboxError::child_process("Image build", 1, "");
        assert_eq!(err.to_string(), "Image build failed (exit code 1)");
    }

    #[test]
    fn test_create_failure_detects_conflict() {
        let err = SandboxError::from_create_failure(
            "claude-app",
            1,
            "Error: sandbox claude-app already exists\n",
        );
        assert!(err.is_conflict());
        assert!(err.to_string().contains("claude-app"));
    }

    #[test]
    fn test_create_failure_other_is_child_process() {
        let err = SandboxError::from_create_failure("claude-app", 125, "image not found");
        assert!(!err.is_conflict());
        assert!(matches!(err, SandboxError::ChildProcess { code: 125, .. }));
    }

    #[test]
    fn test_network_prepare_lists_hosts() {
        let err = SandboxError::NetworkPrepare {
            hosts: vec!["app.test".to_string(), "api.test:8080".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Failed to configure proxy bypass for: app.test, api.test:8080"
        );
    }

    #[test]
    fn test_not_found_predicate() {
        let err = SandboxError::not_found("claude-app");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Sandbox 'claude-app' does not exist");
    }
}
