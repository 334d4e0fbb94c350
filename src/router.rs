//! Resolution of a receiver name to a deliverable route.
//!
//! Local names are located among live panes by directory and kind; remote
//! names are delegated to their host's own send tool. Directory matching
//! is never skipped: matching by kind alone breaks as soon as two panes of
//! the same kind are live.

use tracing::warn;

use crate::error::{Error, Result};
use crate::hosts::HostRegistry;
use crate::probe::PaneFacts;
use crate::registry::{LOCAL_HOST, Registry, RegisteredAgent};
use crate::remote;

/// A resolved delivery target.
#[derive(Debug, Clone)]
pub struct Route {
    /// Host nickname; [`LOCAL_HOST`] for a local pane.
    pub host: String,
    /// tmux target for local routes; the registered name for remote routes.
    pub pane_address: String,
    pub agent: RegisteredAgent,
}

impl Route {
    pub fn is_local(&self) -> bool {
        self.host == LOCAL_HOST
    }
}

/// Resolve `name` to a registered agent, checking the local registry first
/// and then each remote host's registry in turn.
pub fn resolve(name: &str, registry: &Registry, hosts: &HostRegistry) -> Result<RegisteredAgent> {
    if let Some(agent) = registry.resolve_by_name(name) {
        return Ok(agent.clone());
    }

    for host in hosts.list() {
        match remote::fetch_remote_registry(host) {
            Ok(agents) => {
                if let Some(agent) = agents.into_iter().find(|a| a.name == name) {
                    return Ok(RegisteredAgent {
                        host: host.name.clone(),
                        ..agent
                    });
                }
            }
            Err(e) => {
                warn!(host = %host.name, error = %e, "router: skipping unreachable remote registry");
            }
        }
    }

    Err(Error::NameUnknown {
        name: name.to_string(),
        known: registry.names(),
    })
}

/// Resolve a name all the way to a route, given the live local panes.
pub fn route(
    name: &str,
    registry: &Registry,
    hosts: &HostRegistry,
    live: &[PaneFacts],
) -> Result<Route> {
    let agent = resolve(name, registry, hosts)?;
    if agent.is_local() {
        locate_local_pane(&agent, live)
    } else {
        Ok(remote_route(agent))
    }
}

/// Route for an agent registered on a remote host. The pane address is the
/// registered name; the remote host's own send tool locates the pane.
pub fn remote_route(agent: RegisteredAgent) -> Route {
    Route {
        host: agent.host.clone(),
        pane_address: agent.name.clone(),
        agent,
    }
}

/// Find the live local pane for a registered agent.
///
/// Tie-break chain, deterministic and stable: exact directory match beats
/// descendant-directory match; within a tier, first in probe order wins.
pub fn locate_local_pane(agent: &RegisteredAgent, live: &[PaneFacts]) -> Result<Route> {
    let candidates = live
        .iter()
        .filter(|p| p.pane.host == LOCAL_HOST && p.kind == agent.kind);

    let mut descendant = None;
    for pane in candidates {
        if pane.directory == agent.directory {
            return Ok(Route {
                host: LOCAL_HOST.to_string(),
                pane_address: pane.pane.address.clone(),
                agent: agent.clone(),
            });
        }
        if descendant.is_none()
            && pane.directory.starts_with(&agent.directory)
            && pane.directory != agent.directory
        {
            descendant = Some(pane.pane.address.clone());
        }
    }

    match descendant {
        Some(address) => Ok(Route {
            host: LOCAL_HOST.to_string(),
            pane_address: address,
            agent: agent.clone(),
        }),
        None => Err(Error::PaneNotFound {
            kind: agent.kind,
            directory: agent.directory.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::AgentKind;
    use crate::probe::{Activity, PaneRef};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn agent(name: &str, kind: AgentKind, dir: &str) -> RegisteredAgent {
        RegisteredAgent {
            name: name.to_string(),
            kind,
            directory: PathBuf::from(dir),
            host: LOCAL_HOST.to_string(),
        }
    }

    fn pane(address: &str, kind: AgentKind, dir: &str) -> PaneFacts {
        PaneFacts {
            pane: PaneRef {
                host: LOCAL_HOST.to_string(),
                address: address.to_string(),
                label: address.to_string(),
            },
            directory: PathBuf::from(dir),
            command: kind.to_string(),
            kind,
            activity: Activity::Idle,
        }
    }

    #[test]
    fn exact_directory_match() {
        let live = vec![
            pane("s:1.0", AgentKind::Claude, "/home/u/p"),
            pane("s:1.1", AgentKind::Claude, "/home/u/q"),
        ];
        let route = locate_local_pane(&agent("beta", AgentKind::Claude, "/home/u/q"), &live)
            .unwrap();
        assert_eq!(route.pane_address, "s:1.1");
        assert!(route.is_local());
    }

    #[test]
    fn exact_match_beats_descendant() {
        // A sibling subdirectory pane must not steal the route.
        let live = vec![
            pane("s:2.0", AgentKind::Claude, "/home/u/p/sub"),
            pane("s:1.0", AgentKind::Claude, "/home/u/p"),
        ];
        let route = locate_local_pane(&agent("alpha", AgentKind::Claude, "/home/u/p"), &live)
            .unwrap();
        assert_eq!(route.pane_address, "s:1.0");
    }

    #[test]
    fn descendant_match_when_no_exact() {
        let live = vec![pane("s:2.0", AgentKind::Claude, "/home/u/p/sub")];
        let route = locate_local_pane(&agent("alpha", AgentKind::Claude, "/home/u/p"), &live)
            .unwrap();
        assert_eq!(route.pane_address, "s:2.0");
    }

    #[test]
    fn first_in_probe_order_among_equal_exact_matches() {
        let live = vec![
            pane("s:1.0", AgentKind::Claude, "/home/u/p"),
            pane("s:3.0", AgentKind::Claude, "/home/u/p"),
        ];
        let route = locate_local_pane(&agent("alpha", AgentKind::Claude, "/home/u/p"), &live)
            .unwrap();
        assert_eq!(route.pane_address, "s:1.0");
    }

    #[test]
    fn kind_must_match() {
        let live = vec![pane("s:1.0", AgentKind::Crush, "/home/u/p")];
        let err =
            locate_local_pane(&agent("alpha", AgentKind::Claude, "/home/u/p"), &live).unwrap_err();
        assert!(matches!(
            err,
            Error::PaneNotFound {
                kind: AgentKind::Claude,
                ..
            }
        ));
    }

    #[test]
    fn sibling_directory_is_not_a_descendant() {
        // Path prefix matching must respect component boundaries:
        // /home/u/p2 is not inside /home/u/p.
        let live = vec![pane("s:1.0", AgentKind::Claude, "/home/u/p2")];
        let err =
            locate_local_pane(&agent("alpha", AgentKind::Claude, "/home/u/p"), &live).unwrap_err();
        assert!(matches!(err, Error::PaneNotFound { .. }));
    }

    #[test]
    fn route_covers_local_and_remote_registrations() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::open_at(dir.path().join("registry.json")).unwrap();
        registry
            .add(agent("alpha", AgentKind::Claude, "/home/u/p"))
            .unwrap();
        let mut gamma = agent("gamma", AgentKind::Claude, "/srv/x");
        gamma.host = "lab".to_string();
        registry.add(gamma).unwrap();
        let hosts = HostRegistry::open_at(dir.path().join("remotes.json")).unwrap();

        let live = vec![pane("s:1.0", AgentKind::Claude, "/home/u/p")];

        let hit = route("alpha", &registry, &hosts, &live).unwrap();
        assert_eq!(hit.pane_address, "s:1.0");
        assert!(hit.is_local());

        let hit = route("gamma", &registry, &hosts, &live).unwrap();
        assert_eq!(hit.host, "lab");
        assert_eq!(hit.pane_address, "gamma");

        let err = route("nobody", &registry, &hosts, &live).unwrap_err();
        assert!(matches!(err, Error::NameUnknown { .. }));
    }

    #[test]
    fn remote_route_targets_registered_name() {
        let mut gamma = agent("gamma", AgentKind::Claude, "/srv/x");
        gamma.host = "lab".to_string();
        let route = remote_route(gamma);
        assert_eq!(route.host, "lab");
        assert_eq!(route.pane_address, "gamma");
        assert!(!route.is_local());
    }
}
