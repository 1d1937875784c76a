use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::sandbox::{OutputStream, ProcessExit, SandboxError, SandboxProcess};

/// Interval between `is_running` checks while a background process runs.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Create a spinner with consistent styling.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb
}

fn finish<T, E>(pb: &ProgressBar, msg: &str, result: &std::result::Result<T, E>) {
    match result {
        Ok(_) => pb.finish_with_message(format!("✔ {}", msg)),
        Err(_) => pb.finish_with_message(format!("✘ {}", msg)),
    }
}

/// Run an operation with a spinner, showing success/failure.
pub fn with_spinner<T, F>(msg: &str, op: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let pb = create_spinner(msg);
    pb.enable_steady_tick(Duration::from_millis(120));
    let result = op();
    finish(&pb, msg, &result);
    result
}

/// Run an operation with a spinner, printing the output lines it reports
/// above the spinner line.
pub fn with_streaming_output<T, F>(msg: &str, op: F) -> Result<T, SandboxError>
where
    F: FnOnce(&mut dyn FnMut(OutputStream, &str)) -> Result<T, SandboxError>,
{
    let pb = create_spinner(msg);
    pb.enable_steady_tick(Duration::from_millis(120));
    let printer = pb.clone();
    let result = op(&mut |_, line| {
        let line = line.trim_end();
        if !line.trim().is_empty() {
            printer.println(line);
        }
    });
    finish(&pb, msg, &result);
    result
}

/// Start `process` and advance a spinner on every poll until it exits.
///
/// Sleeps [`POLL_INTERVAL`] between checks.
pub fn poll_with_spinner(
    msg: &str,
    process: &mut SandboxProcess,
) -> Result<ProcessExit, SandboxError> {
    let pb = create_spinner(msg);
    let result = process.start().and_then(|()| {
        while process.is_running() {
            pb.tick();
            std::thread::sleep(POLL_INTERVAL);
        }
        process.wait()
    });
    let outcome = match &result {
        Ok(exit) if exit.success() => Ok(()),
        _ => Err(()),
    };
    finish(&pb, msg, &outcome);
    result
}
