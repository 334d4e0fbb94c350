use std::path::PathBuf;

use thiserror::Error;

use crate::classify::AgentKind;

/// Errors surfaced by the core. Each variant maps to one row of the failure
/// taxonomy: the CLIs turn them into exit codes, the UI into banners.
#[derive(Debug, Error)]
pub enum Error {
    #[error("tmux server is not running")]
    MultiplexerDown,

    #[error("agent '{name}' not found. Known agents: {}", known_names(.known))]
    NameUnknown { name: String, known: Vec<String> },

    #[error("no live {kind} pane found under {}", .directory.display())]
    PaneNotFound { kind: AgentKind, directory: PathBuf },

    #[error("remote host '{host}' unreachable: {detail}")]
    RemoteUnreachable { host: String, detail: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("message history unavailable: {0}")]
    StoreUnavailable(String),

    #[error("registry file {} is corrupt: {detail}", .path.display())]
    RegistryCorrupt { path: PathBuf, detail: String },

    #[error("'{name}' is already registered to a different {kind} slot")]
    DuplicateName { name: String, kind: AgentKind },

    #[error("{kind} in {} on '{host}' is already registered as '{existing}'", .directory.display())]
    SlotOccupied {
        kind: AgentKind,
        directory: PathBuf,
        host: String,
        existing: String,
    },

    #[error("could not type into pane {0}; the pane may have closed")]
    PaneVanished(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn known_names(known: &[String]) -> String {
    if known.is_empty() {
        "(none)".to_string()
    } else {
        known.join(", ")
    }
}
