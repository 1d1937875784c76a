use anyhow::Result;
use tracing::info;

pub fn run() -> Result<()> {
    let manager = super::load_manager()?;

    let mut process = manager.interactive_process()?;
    super::display_command(&process.command_line());

    let exit = process.run(|_, _| {})?;
    info!(code = exit.code(), "claude:session ended");
    process.ensure_success("Claude session")?;
    Ok(())
}
