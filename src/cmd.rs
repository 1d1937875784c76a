use anyhow::{Context, Result, anyhow};
use std::process::{Command, Output, Stdio};
use tracing::{debug, trace};

/// Builder for short, non-interactive probe commands (listing, inspecting)
/// whose stdout is consumed by the caller.
pub struct Cmd {
    program: String,
    args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }

    fn output(&self) -> Result<Output> {
        trace!(program = %self.program, args = ?self.args, "cmd:run start");
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute command: {}", self.display()))
    }

    /// Execute the command, failing on a non-zero exit with its stderr.
    pub fn run(self) -> Result<Output> {
        let output = self.output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                program = %self.program,
                args = ?self.args,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            return Err(anyhow!(
                "Command failed: {}\n{}",
                self.display(),
                stderr.trim()
            ));
        }
        trace!(program = %self.program, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout as a trimmed string.
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_stdout_is_trimmed() {
        let out = Cmd::new("sh")
            .args(["-c", "echo '  hello  '"])
            .run_and_capture_stdout()
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_failure_includes_stderr() {
        let err = Cmd::new("sh")
            .args(["-c", "echo nope >&2; exit 1"])
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_missing_program_is_error() {
        let err = Cmd::new("turbo-test-no-such-binary")
            .run_and_capture_stdout()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to execute command"));
    }
}
