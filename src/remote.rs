//! Remote-host plumbing: building SSH invocations, quoting arguments for
//! the remote shell, and probing a remote host's registry.
//!
//! A remote pane's actual tmux address is never known locally. Probing a
//! host means fetching its registry document; delivery is delegated to the
//! host's own `send` tool, so the registered name is all the routing the
//! orchestrating side needs.

use std::time::Duration;

use tracing::debug;

use crate::cmd::Cmd;
use crate::error::{Error, Result};
use crate::hosts::RemoteHost;
use crate::probe::{Activity, PaneFacts, PaneRef};
use crate::registry::RegisteredAgent;

/// Deadline for fetching a remote registry document.
pub const REMOTE_FETCH_DEADLINE: Duration = Duration::from_secs(5);

/// Deadline for a delegated remote delivery.
pub const REMOTE_SEND_DEADLINE: Duration = Duration::from_secs(10);

/// Where every msgmux host keeps its registry document.
const REMOTE_REGISTRY_PATH: &str = "~/.local/share/msgmux/registry.json";

/// Build the argv that opens a shell on `host`: the stored connect tokens,
/// with `-i <key>` inserted after the transport binary when a key is set.
/// The invocation is not otherwise parsed or validated.
pub fn ssh_invocation(host: &RemoteHost) -> Result<Vec<String>> {
    let tokens = host.connect_tokens();
    let (transport, rest) = tokens.split_first().ok_or_else(|| Error::Other(
        anyhow::anyhow!("remote host '{}' has an empty connect command", host.name),
    ))?;

    let mut argv = vec![transport.to_string()];
    if !host.ssh_key.is_empty() {
        argv.push("-i".to_string());
        argv.push(host.ssh_key.clone());
    }
    argv.extend(rest.iter().map(|t| t.to_string()));
    Ok(argv)
}

/// Run a command on `host` with a deadline. Transport failures become
/// [`Error::RemoteUnreachable`]; deadline expiry stays [`Error::Timeout`].
pub fn run_remote(host: &RemoteHost, remote_args: &[String], deadline: Duration) -> Result<String> {
    let argv = ssh_invocation(host)?;
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Other(anyhow::anyhow!("empty remote invocation")))?;

    debug!(host = %host.name, command = ?remote_args, "remote: invoking");
    Cmd::new(program.as_str())
        .args(args.iter().cloned())
        .args(remote_args.iter().cloned())
        .deadline(deadline)
        .run_and_capture_stdout()
        .map_err(|e| match e {
            Error::Timeout { .. } => e,
            other => Error::RemoteUnreachable {
                host: host.name.clone(),
                detail: other.to_string(),
            },
        })
}

/// Fetch and parse a remote host's registry document.
pub fn fetch_remote_registry(host: &RemoteHost) -> Result<Vec<RegisteredAgent>> {
    let raw = run_remote(
        host,
        &["cat".to_string(), REMOTE_REGISTRY_PATH.to_string()],
        REMOTE_FETCH_DEADLINE,
    )?;
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).map_err(|e| Error::RemoteUnreachable {
        host: host.name.clone(),
        detail: format!("unreadable registry document: {e}"),
    })
}

/// Probe a remote host. Each registered remote agent yields one synthetic
/// pane snapshot addressed by its name, marked active.
pub fn probe_remote(host: &RemoteHost) -> Result<Vec<PaneFacts>> {
    let agents = fetch_remote_registry(host)?;
    Ok(agents
        .into_iter()
        .filter(|a| a.kind.is_routable())
        .map(|a| PaneFacts {
            pane: PaneRef {
                host: host.name.clone(),
                address: a.name.clone(),
                label: a.name.clone(),
            },
            directory: a.directory,
            command: a.kind.to_string(),
            kind: a.kind,
            activity: Activity::Active,
        })
        .collect())
}

/// Escape single quotes for embedding in a single-quoted shell argument.
fn shell_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

/// Quote a string for the remote shell. Strings made only of safe
/// characters pass through unchanged, so registered names stay readable in
/// the invocation; anything else is single-quoted with internal quotes
/// escaped.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '@'))
    {
        s.to_string()
    } else {
        format!("'{}'", shell_escape(s))
    }
}
