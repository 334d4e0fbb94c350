//! The discovery aggregator: one table of every agent pane across the
//! local host and all registered remote hosts, joined against the local
//! registry.
//!
//! Remote hosts are probed in parallel; a slow or dead host costs its own
//! deadline, not the whole view. An unreachable host is logged and the
//! aggregation continues without it.

use std::path::PathBuf;
use std::thread;

use tracing::warn;

use crate::classify::AgentKind;
use crate::config::Config;
use crate::error::Result;
use crate::hosts::HostRegistry;
use crate::probe::{self, Activity, PaneFacts};
use crate::registry::{Registry, RegisteredAgent};
use crate::remote;

/// Name shown for a live pane that no registration covers.
pub const NOT_REGISTERED: &str = "NR";

/// One row of the unified agent view.
#[derive(Debug, Clone)]
pub struct AgentRow {
    pub pane_address: String,
    pub directory: PathBuf,
    pub kind: AgentKind,
    pub display_name: String,
    pub activity: Activity,
    pub host: String,
    pub registered: bool,
}

/// Probe everything and reconcile the registry against the local result.
///
/// When `adopt_remote_agents` is enabled, remote registrations not yet
/// known locally are added to the local registry as they are seen.
pub fn discover(
    registry: &mut Registry,
    hosts: &HostRegistry,
    config: &Config,
) -> Result<Vec<AgentRow>> {
    let local = probe::probe()?;

    let mut all = local.clone();
    all.extend(probe_all_remotes(hosts));

    registry.reconcile(&local)?;

    if config.adopt_remote_agents {
        adopt_remotes(registry, &all);
    }

    Ok(all.iter().map(|facts| decorate(facts, registry)).collect())
}

/// Fan out one probe thread per remote host and collect whatever arrives.
/// Each probe carries its own deadline, so the slowest host bounds the
/// whole fan-in.
fn probe_all_remotes(hosts: &HostRegistry) -> Vec<PaneFacts> {
    thread::scope(|scope| {
        let handles: Vec<_> = hosts
            .list()
            .iter()
            .map(|host| (host.name.clone(), scope.spawn(move || remote::probe_remote(host))))
            .collect();

        let mut facts = Vec::new();
        for (name, handle) in handles {
            match handle.join() {
                Ok(Ok(panes)) => facts.extend(panes),
                Ok(Err(e)) => warn!(host = %name, error = %e, "discovery: remote probe failed"),
                Err(_) => warn!(host = %name, "discovery: remote probe panicked"),
            }
        }
        facts
    })
}

fn decorate(facts: &PaneFacts, registry: &Registry) -> AgentRow {
    let registration = registry.resolve_by_slot(facts.kind, &facts.directory, &facts.pane.host);
    AgentRow {
        pane_address: facts.pane.address.clone(),
        directory: facts.directory.clone(),
        kind: facts.kind,
        display_name: registration
            .map(|r| r.name.clone())
            .unwrap_or_else(|| NOT_REGISTERED.to_string()),
        activity: facts.activity,
        host: facts.pane.host.clone(),
        registered: registration.is_some(),
    }
}

/// Adopt remote registrations into the local registry. A name collision
/// means the name is already taken locally; the remote row keeps working
/// through its own host, so the conflict is only logged.
fn adopt_remotes(registry: &mut Registry, all: &[PaneFacts]) {
    for facts in all.iter().filter(|f| f.pane.host != crate::registry::LOCAL_HOST) {
        if registry.resolve_by_name(&facts.pane.address).is_some() {
            continue;
        }
        let adopted = RegisteredAgent {
            name: facts.pane.address.clone(),
            kind: facts.kind,
            directory: facts.directory.clone(),
            host: facts.pane.host.clone(),
        };
        if let Err(e) = registry.add(adopted) {
            warn!(name = %facts.pane.address, host = %facts.pane.host, error = %e,
                "discovery: could not adopt remote registration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::PaneRef;
    use crate::registry::LOCAL_HOST;
    use std::path::Path;
    use tempfile::TempDir;

    fn facts(host: &str, address: &str, kind: AgentKind, dir: &str) -> PaneFacts {
        PaneFacts {
            pane: PaneRef {
                host: host.to_string(),
                address: address.to_string(),
                label: address.to_string(),
            },
            directory: PathBuf::from(dir),
            command: kind.to_string(),
            kind,
            activity: Activity::Idle,
        }
    }

    fn registry(dir: &TempDir) -> Registry {
        Registry::open_at(dir.path().join("registry.json")).unwrap()
    }

    #[test]
    fn decorate_joins_registration_by_slot() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        reg.add(RegisteredAgent {
            name: "alpha".to_string(),
            kind: AgentKind::Claude,
            directory: PathBuf::from("/home/u/p"),
            host: LOCAL_HOST.to_string(),
        })
        .unwrap();

        let row = decorate(&facts(LOCAL_HOST, "s:1.0", AgentKind::Claude, "/home/u/p"), &reg);
        assert_eq!(row.display_name, "alpha");
        assert!(row.registered);

        let row = decorate(&facts(LOCAL_HOST, "s:1.1", AgentKind::Crush, "/home/u/p"), &reg);
        assert_eq!(row.display_name, NOT_REGISTERED);
        assert!(!row.registered);
    }

    #[test]
    fn adoption_adds_unseen_remote_registrations() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);

        let remote = vec![facts("lab", "gamma", AgentKind::Claude, "/srv/x")];
        adopt_remotes(&mut reg, &remote);

        let gamma = reg.resolve_by_name("gamma").unwrap();
        assert_eq!(gamma.host, "lab");
        assert_eq!(gamma.directory, Path::new("/srv/x"));
    }

    #[test]
    fn adoption_skips_names_already_bound() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        reg.add(RegisteredAgent {
            name: "gamma".to_string(),
            kind: AgentKind::Crush,
            directory: PathBuf::from("/home/u/g"),
            host: LOCAL_HOST.to_string(),
        })
        .unwrap();

        let remote = vec![facts("lab", "gamma", AgentKind::Claude, "/srv/x")];
        adopt_remotes(&mut reg, &remote);

        // The local binding wins; nothing was overwritten.
        assert_eq!(reg.resolve_by_name("gamma").unwrap().host, LOCAL_HOST);
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn adoption_ignores_local_rows() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);

        let local = vec![facts(LOCAL_HOST, "s:1.0", AgentKind::Claude, "/home/u/p")];
        adopt_remotes(&mut reg, &local);
        assert!(reg.list().is_empty());
    }
}
