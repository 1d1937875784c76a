mod cli;
mod cmd;
mod command;
mod config;
mod logger;
mod sandbox;
mod shell;
mod skills;
mod spinner;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "turbo start");

    match cli::run() {
        Ok(result) => {
            info!("turbo finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "turbo failed");
            Err(err)
        }
    }
}
