use anyhow::Result;
use console::style;

use crate::config::Config;
use crate::skills::feedback;

pub fn run() -> Result<()> {
    let config = Config::load()?;
    let workspace = config.workspace();
    let detected = feedback::detect(&workspace);

    if detected.is_empty() {
        println!("No feedback loops detected in composer.json or package.json.");
        return Ok(());
    }

    println!("Detected feedback loops in {}:", workspace.display());
    for command in &detected {
        println!("  - {command}");
    }

    if config.feedback_loops.as_deref() != Some(detected.as_slice()) {
        println!(
            "\nAdd them to {} to use them in published skills:\n",
            style(".turbo.yaml").bold()
        );
        println!("feedback_loops:");
        for command in &detected {
            println!("  - {command}");
        }
    }
    Ok(())
}
