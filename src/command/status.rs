use anyhow::Result;
use console::style;

use crate::sandbox::SandboxState;

pub fn run() -> Result<()> {
    let manager = super::load_manager()?;
    let status = manager.status();

    let state = match status.state {
        SandboxState::Exists => style(status.state.as_str()).green(),
        SandboxState::Absent => style(status.state.as_str()).yellow(),
    };
    let runtime = if status.runtime_available {
        style(status.runtime.clone()).green()
    } else {
        style(format!("{} (not found)", status.runtime)).red()
    };

    println!("{:<10} {}", "Sandbox:", style(&status.identity).bold());
    println!("{:<10} {}", "State:", state);
    println!("{:<10} {}", "Image:", status.image);
    println!("{:<10} {}", "Workspace:", status.workspace.display());
    println!("{:<10} {}", "Runtime:", runtime);
    Ok(())
}
