use crate::config::Settings;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;

/// Installs a file-backed subscriber. Games own the terminal, so nothing is
/// ever written to stdout or stderr from here.
pub fn init(settings: &Settings) -> Result<()>
{
    let Some(level) = settings.log_level() else {
        return Ok(());
    };

    let dir = settings.data_dir();
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = settings.log_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(level));
    registry
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(())
}
