use anyhow::Result;
use console::style;

use crate::sandbox::SandboxError;
use crate::spinner;

pub fn run(prompt: &str) -> Result<()> {
    let manager = super::load_manager()?;

    let mut process = manager.prompt_process(prompt)?;
    super::display_command(&process.command_line());

    let exit = spinner::poll_with_spinner("Running...", &mut process)?;
    println!();

    if exit.success() {
        println!("{}", process.output_plain().trim_end());
        return Ok(());
    }

    let stdout = strip_ansi_escapes::strip_str(process.stdout());
    if !stdout.trim().is_empty() {
        println!("{}", stdout.trim_end());
    }
    let stderr = process.stderr().trim();
    if !stderr.is_empty() {
        eprintln!("{}", style(stderr).red());
    }
    Err(SandboxError::child_process("Prompt", exit.code(), "").into())
}
