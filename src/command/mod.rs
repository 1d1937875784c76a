pub mod build;
pub mod claude;
pub mod exec;
pub mod feedback_loops;
pub mod prepare;
pub mod prompt;
pub mod remove;
pub mod setup;
pub mod skills;
pub mod status;

use std::io::{self, Write};

use anyhow::{Context, Result};
use console::style;

use crate::config::Config;
use crate::sandbox::{self, DockerCli, SandboxManager};

/// Marketplace registered inside the sandbox by `build --with-plugins` and `setup`.
pub const PLUGIN_MARKETPLACE: &str = "obra/superpowers-marketplace";
/// Plugin installed from [`PLUGIN_MARKETPLACE`].
pub const PLUGIN: &str = "superpowers@superpowers-marketplace";

/// Load configuration and build the manager for the current workspace.
pub fn load_manager() -> Result<SandboxManager<DockerCli>> {
    let config = Config::load()?;
    Ok(sandbox::manager_from_config(&config)?)
}

/// Show the user the command line about to run, without quoting noise.
pub fn display_command(command_line: &str) {
    println!("{}", style(command_line.replace('\'', "")).green());
}

/// Ask a yes/no question on the terminal. Anything but `y` is a no.
pub fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Register the marketplace and install the plugin inside the sandbox.
pub fn install_plugins(manager: &SandboxManager<DockerCli>) -> Result<()> {
    crate::spinner::with_spinner("Installing agent plugins", || {
        Ok(manager.install_plugins(PLUGIN_MARKETPLACE, PLUGIN)?)
    })
}
