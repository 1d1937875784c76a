use anyhow::Result;
use console::style;

use crate::sandbox::{SandboxError, SandboxState};

pub fn run(yes: bool) -> Result<()> {
    let manager = super::load_manager()?;
    let name = manager.identity();

    manager.require_runtime()?;
    if manager.state() == SandboxState::Absent {
        return Err(SandboxError::not_found(name).into());
    }

    if !yes {
        println!(
            "This will delete sandbox {} and everything installed inside it.",
            style(&name).bold()
        );
        if !super::confirm("Are you sure you want to continue?")? {
            println!("Aborted.");
            return Ok(());
        }
    }

    crate::spinner::with_spinner(&format!("Removing sandbox {name}"), || {
        Ok(manager.remove()?)
    })
}
