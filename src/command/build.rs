use anyhow::Result;
use console::style;

use crate::sandbox::command::build_command;
use crate::sandbox::{Operation, SandboxState};
use crate::spinner;

pub fn run(with_plugins: bool) -> Result<()> {
    let manager = super::load_manager()?;
    let config = manager.config();

    println!(
        "Building sandbox image {}",
        style(&config.image).bold()
    );
    println!("Dockerfile: {}", config.template_source.display());

    // Build does not depend on the sandbox, so skip the existence query.
    let spec = build_command(Operation::Build, config, SandboxState::Absent)?;
    super::display_command(&spec.command_line());

    spinner::with_streaming_output("Building image", |sink| manager.build_image(sink))?;
    println!("{} Sandbox image built", style("✓").green());

    if with_plugins {
        super::install_plugins(&manager)?;
    }
    Ok(())
}
