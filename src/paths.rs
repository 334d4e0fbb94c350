//! Per-user file locations and the atomic-write discipline shared by the
//! registries.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::{Error, Result};

/// Data directory holding the registries and the history database.
///
/// Honors `XDG_DATA_HOME`, falling back to `~/.local/share`.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME")
        && !data_home.is_empty()
    {
        return Ok(PathBuf::from(data_home).join("msgmux"));
    }

    home::home_dir()
        .map(|home| home.join(".local").join("share").join("msgmux"))
        .ok_or_else(|| Error::Other(anyhow::anyhow!("could not determine home directory")))
}

pub fn registry_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("registry.json"))
}

pub fn remotes_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("remotes.json"))
}

pub fn history_db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("history.db"))
}

/// Write a file atomically: temp file in the same directory, fsync, rename.
/// Readers observe either the old or the new document, never a partial one.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(anyhow::anyhow!("path has no parent: {}", path.display())))?;
    ensure_dir(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content)
        .context("failed to write temp file")?;
    tmp.as_file().sync_all().context("failed to sync temp file")?;
    tmp.persist(path)
        .map_err(|e| Error::Io(e.error))
        .map(|_| ())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    }

    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}
