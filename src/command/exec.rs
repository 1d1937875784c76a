use anyhow::Result;

use crate::sandbox::Provision;

pub fn run(command: &[String]) -> Result<()> {
    let manager = super::load_manager()?;

    if manager.ensure_exists()? == Provision::Created {
        println!("Created sandbox {}", manager.identity());
    }

    let mut process = manager.exec_process(command)?;
    super::display_command(&process.command_line());
    process.run(|_, _| {})?;
    process.ensure_success("Command")?;
    Ok(())
}
