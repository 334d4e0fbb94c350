use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize file logging. Idempotent; safe to call from every binary's
/// main. Log output goes to a file rather than the terminal because stderr
/// is reserved for user-facing error messages.
pub fn init() -> Result<()> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let log_path = log_path()?;
    let directory = log_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log directory at {}", directory.display()))?;

    let file_appender = rolling::never(&directory, "msgmux.log");
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

    Ok(())
}

/// Log file under XDG state: `$XDG_STATE_HOME/msgmux/msgmux.log`, falling
/// back to `~/.local/state/msgmux/msgmux.log`.
fn log_path() -> Result<PathBuf> {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME")
        && !state_home.is_empty()
    {
        return Ok(PathBuf::from(state_home).join("msgmux").join("msgmux.log"));
    }

    if let Some(home_dir) = home::home_dir() {
        return Ok(home_dir
            .join(".local")
            .join("state")
            .join("msgmux")
            .join("msgmux.log"));
    }

    Ok(std::env::current_dir()?.join("msgmux.log"))
}
