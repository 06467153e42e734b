//! Log file setup
//!
//! stdout belongs to the wrapped program, so all logging goes to
//! `/tmp/oscbell-<instance>.log`. `OSCBELL_LOG` takes the usual
//! env-filter directives and defaults to `info`.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub const FILTER_ENV: &str = "OSCBELL_LOG";

pub fn log_path(instance: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/oscbell-{}.log", instance))
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns the log file path.
pub fn init(instance: &str) -> Result<PathBuf> {
    let path = log_path(instance);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    Ok(path)
}
