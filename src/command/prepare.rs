use anyhow::Result;
use console::style;

use crate::sandbox::{DockerCli, SandboxManager};

pub fn run() -> Result<()> {
    let manager = super::load_manager()?;
    prepare(&manager)
}

/// Configure proxy bypass for every resolved host, printing one line per host.
pub fn prepare(manager: &SandboxManager<DockerCli>) -> Result<()> {
    let mut attempted = 0;
    let result = manager.prepare_networking(|outcome| {
        attempted += 1;
        if outcome.success() {
            println!("  {} {}", style("✓").green(), outcome.mapping);
        } else if let Some(e) = &outcome.error {
            println!("  {} {}: {}", style("✘").red(), outcome.mapping, e);
        }
    });

    let mappings = result?;
    if attempted == 0 {
        println!("No hosts to configure. Set APP_URL in .env or docker.extra_hosts in .turbo.yaml.");
    } else {
        println!("Configured proxy bypass for {} host(s)", mappings.len());
    }
    Ok(())
}
