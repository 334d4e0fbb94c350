//! Pane discovery on the local host.
//!
//! Asks tmux for every pane, classifies each pane's command, and refines
//! panes whose command is a hosting runtime (e.g. `node`) by walking the
//! pane's child processes. Panes that resolve to no known agent are not
//! addressable and are dropped from the result.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::classify::{self, AgentKind};
use crate::cmd::Cmd;
use crate::error::{Error, Result};
use crate::registry::LOCAL_HOST;

/// Deadline for the pane list query.
pub const PANE_LIST_DEADLINE: Duration = Duration::from_secs(2);

/// Deadline for each step of the child-process walk.
pub const PID_WALK_DEADLINE: Duration = Duration::from_secs(1);

const PANE_LIST_FORMAT: &str = "#{session_name}:#{session_id}:#{window_index}.#{pane_index}:#{pane_current_path}:#{pane_current_command}:#{?pane_active,active,idle}";

/// Whether a pane showed activity at the probe instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Active,
    Idle,
    Error,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Activity::Active => "active",
            Activity::Idle => "idle",
            Activity::Error => "error",
        }
    }
}

/// Identifies one pane on one host. Panes are ephemeral: a `PaneRef` is
/// only valid while the pane exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneRef {
    /// Host nickname; [`LOCAL_HOST`] for the local machine.
    pub host: String,
    /// tmux target in `<session>:<window>.<pane>` form. For remote agents
    /// this holds the registered name instead (delivery is delegated to the
    /// remote host's own send tool).
    pub address: String,
    /// Human-friendly rendering of the address.
    pub label: String,
}

/// Snapshot of a pane at a probe instant.
#[derive(Debug, Clone)]
pub struct PaneFacts {
    pub pane: PaneRef,
    pub directory: PathBuf,
    pub command: String,
    pub kind: AgentKind,
    pub activity: Activity,
}

/// Check whether a tmux server is reachable.
pub fn server_running() -> bool {
    Cmd::new("tmux")
        .arg("has-session")
        .deadline(PANE_LIST_DEADLINE)
        .run_as_check()
        .unwrap_or(false)
}

/// Enumerate every agent pane on the local host.
///
/// An empty list is a valid result; an error means the tmux server was not
/// reachable or a query exceeded its deadline.
pub fn probe() -> Result<Vec<PaneFacts>> {
    let output = Cmd::new("tmux")
        .args(["list-panes", "-a", "-F", PANE_LIST_FORMAT])
        .deadline(PANE_LIST_DEADLINE)
        .run_and_capture_stdout()
        .map_err(|e| match e {
            Error::Timeout { .. } => e,
            _ => Error::MultiplexerDown,
        })?;

    let mut panes = Vec::new();
    for line in output.lines() {
        let Some(mut facts) = parse_pane_line(line) else {
            debug!(line, "probe: skipping malformed pane row");
            continue;
        };

        if facts.kind == AgentKind::Unknown && classify::is_hosting_runtime(&facts.command) {
            facts.kind = match refine_via_children(&facts.pane.address) {
                Ok(kind) => kind,
                // Deadline expiry is fatal; a pane that vanished mid-walk
                // just stays unclassified.
                Err(e @ Error::Timeout { .. }) => return Err(e),
                Err(_) => AgentKind::Unknown,
            };
        }

        if facts.kind.is_routable() {
            panes.push(facts);
        }
    }

    Ok(panes)
}

/// Parse one `list-panes` row. The working directory may itself contain
/// colons, so the row is taken apart from both ends: three fields from the
/// left, two from the right, directory in the middle.
fn parse_pane_line(line: &str) -> Option<PaneFacts> {
    let (session, rest) = line.split_once(':')?;
    let (_session_id, rest) = rest.split_once(':')?;
    let (position, rest) = rest.split_once(':')?;
    let (rest, activity) = rest.rsplit_once(':')?;
    let (directory, command) = rest.rsplit_once(':')?;

    if session.is_empty() || !position.contains('.') || !directory.starts_with('/') {
        return None;
    }

    let activity = match activity {
        "active" => Activity::Active,
        "idle" => Activity::Idle,
        _ => Activity::Error,
    };

    let address = format!("{session}:{position}");
    Some(PaneFacts {
        pane: PaneRef {
            host: LOCAL_HOST.to_string(),
            label: address.clone(),
            address,
        },
        directory: PathBuf::from(directory),
        command: command.to_string(),
        kind: classify::classify(command),
        activity,
    })
}

/// Resolve the real program behind a hosting runtime by classifying the
/// pane root's direct children. First recognized child wins; a child that
/// exits mid-walk simply isn't listed.
fn refine_via_children(pane_address: &str) -> Result<AgentKind> {
    let pid = Cmd::new("tmux")
        .args(["display-message", "-p", "-t", pane_address, "#{pane_pid}"])
        .deadline(PID_WALK_DEADLINE)
        .run_and_capture_stdout()?;
    let pid: u32 = match pid.trim().parse() {
        Ok(pid) => pid,
        Err(_) => {
            warn!(pane = pane_address, reported = %pid, "probe: unparseable pane pid");
            return Ok(AgentKind::Unknown);
        }
    };

    for command in child_commands(pid)? {
        let kind = classify::classify(&command);
        if kind.is_routable() {
            debug!(pane = pane_address, child = %command, %kind, "probe: refined via child process");
            return Ok(kind);
        }
    }
    Ok(AgentKind::Unknown)
}

/// Command lines of the direct children of `pid`, via one `ps` pass.
fn child_commands(pid: u32) -> Result<Vec<String>> {
    let output = Cmd::new("ps")
        .args(["-Ao", "ppid=,args="])
        .deadline(PID_WALK_DEADLINE)
        .run_and_capture_stdout()?;
    Ok(parse_ps_children(&output, pid))
}

fn parse_ps_children(ps_output: &str, parent: u32) -> Vec<String> {
    ps_output
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let (ppid, args) = trimmed.split_once(char::is_whitespace)?;
            if ppid.parse::<u32>().ok()? == parent {
                Some(args.trim_start().to_string())
            } else {
                None
            }
        })
        .collect()
}
