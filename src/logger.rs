use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE: &str = "turbo.log";

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Send tracing events to the turbo log file. Console output stays clean.
pub fn init() -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let log_path = log_path(
        std::env::var("XDG_STATE_HOME").ok(),
        home::home_dir(),
        std::env::current_dir()?,
    );
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory at {}", parent.display()))?;
    }

    let (directory, file_name) = split_path(&log_path)?;
    let file_appender = rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    let _ = INIT.set(());
    Ok(())
}

/// `$XDG_STATE_HOME/turbo/turbo.log`, else `~/.local/state/turbo/turbo.log`,
/// else `turbo.log` in the current directory.
fn log_path(state_home: Option<String>, home: Option<PathBuf>, cwd: PathBuf) -> PathBuf {
    if let Some(state_home) = state_home.filter(|s| !s.is_empty()) {
        return PathBuf::from(state_home).join("turbo").join(LOG_FILE);
    }
    match home {
        Some(home) => home.join(".local/state/turbo").join(LOG_FILE),
        None => cwd.join(LOG_FILE),
    }
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name"))?;

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
