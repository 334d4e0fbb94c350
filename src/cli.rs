//! Shared implementation behind the `send` and `send-remote` binaries:
//! argument plumbing, the status report, and the remote registry listing.

use tabled::{
    Table, Tabled,
    settings::{Padding, Style, object::Columns},
};

use crate::config::Config;
use crate::discovery::{self, AgentRow};
use crate::error::{Error, Result};
use crate::hosts::HostRegistry;
use crate::probe;
use crate::registry::{Registry, RegisteredAgent};
use crate::remote;
use crate::sender;

/// Join the trailing body arguments with single spaces.
pub fn join_body(words: &[String]) -> String {
    words.join(" ")
}

/// The send operation behind both binaries: resolve, route, deliver, log,
/// then confirm on stdout.
pub fn run_send(from: Option<&str>, receiver: &str, body: &str) -> Result<()> {
    if body.is_empty() {
        return Err(Error::Other(anyhow::anyhow!("message body is empty")));
    }
    let config = Config::load()?;
    sender::send(from, receiver, body, &config)?;
    println!("Message sent to {receiver}");
    Ok(())
}

#[derive(Tabled)]
struct RegisteredRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "DIRECTORY")]
    directory: String,
    #[tabled(rename = "HOST")]
    host: String,
    #[tabled(rename = "STATE")]
    state: String,
}

#[derive(Tabled)]
struct PaneRow {
    #[tabled(rename = "HOST")]
    host: String,
    #[tabled(rename = "PANE")]
    pane: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "DIRECTORY")]
    directory: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ACTIVITY")]
    activity: String,
}

/// Print the registered agents with their live/absent state, then every
/// live agent pane grouped by host. Always exits cleanly: a missing tmux
/// server or an empty world are reports, not failures.
pub fn print_status() -> Result<()> {
    if !probe::server_running() {
        println!("tmux server is not running");
        return Ok(());
    }

    let config = Config::load()?;
    let mut registry = match Registry::open() {
        Ok(registry) => registry,
        Err(e @ Error::RegistryCorrupt { .. }) => {
            eprintln!("warning: {e}; continuing with an empty registry");
            Registry::empty(crate::paths::registry_path()?)
        }
        Err(e) => return Err(e),
    };
    let hosts = HostRegistry::open()?;

    // Snapshot before discovery: reconciliation prunes stale entries, and
    // the report should still show them one last time as absent.
    let snapshot: Vec<RegisteredAgent> = registry.list().to_vec();
    let rows = discovery::discover(&mut registry, &hosts, &config)?;

    if !snapshot.is_empty() {
        println!("Registered agents:");
        let table_rows: Vec<RegisteredRow> = snapshot
            .iter()
            .map(|agent| RegisteredRow {
                name: agent.name.clone(),
                kind: agent.kind.to_string(),
                directory: agent.directory.display().to_string(),
                host: agent.host.clone(),
                state: if is_live(agent, &rows) { "live" } else { "absent" }.to_string(),
            })
            .collect();
        print_table(Table::new(table_rows));
        println!();
    }

    if rows.is_empty() {
        println!("No AI agents detected");
        return Ok(());
    }

    let mut sorted = rows;
    sorted.sort_by(|a, b| (&a.host, &a.pane_address).cmp(&(&b.host, &b.pane_address)));

    println!("Live agent panes:");
    let table_rows: Vec<PaneRow> = sorted
        .iter()
        .map(|row| PaneRow {
            host: row.host.clone(),
            pane: row.pane_address.clone(),
            kind: row.kind.to_string(),
            directory: row.directory.display().to_string(),
            name: row.display_name.clone(),
            activity: row.activity.as_str().to_string(),
        })
        .collect();
    print_table(Table::new(table_rows));

    Ok(())
}

fn is_live(agent: &RegisteredAgent, rows: &[AgentRow]) -> bool {
    rows.iter().any(|row| {
        row.host == agent.host && row.kind == agent.kind && row.directory == agent.directory
    })
}

#[derive(Tabled)]
struct RemoteAgentRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "DIRECTORY")]
    directory: String,
}

/// Print the registry of one remote host (`send-remote --discover`).
pub fn print_remote_registry(host_name: &str) -> Result<()> {
    let hosts = HostRegistry::open()?;
    let host = hosts.get(host_name).ok_or_else(|| Error::RemoteUnreachable {
        host: host_name.to_string(),
        detail: "host is not registered".to_string(),
    })?;

    let agents = remote::fetch_remote_registry(host)?;
    if agents.is_empty() {
        println!("No agents registered on {host_name}");
        return Ok(());
    }

    let rows: Vec<RemoteAgentRow> = agents
        .iter()
        .map(|agent| RemoteAgentRow {
            name: agent.name.clone(),
            kind: agent.kind.to_string(),
            directory: agent.directory.display().to_string(),
        })
        .collect();
    print_table(Table::new(rows));
    Ok(())
}

fn print_table(mut table: Table) {
    table
        .with(Style::blank())
        .modify(Columns::new(..), Padding::new(0, 2, 0, 0));
    println!("{table}");
}
