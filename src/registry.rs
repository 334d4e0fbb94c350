//! The local agent registry: human-assigned names bound to
//! (kind, directory, host) slots, persisted as a single JSON document.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classify::AgentKind;
use crate::error::{Error, Result};
use crate::paths;
use crate::probe::PaneFacts;

/// Sentinel nickname for the local machine.
pub const LOCAL_HOST: &str = "host";

fn local_host() -> String {
    LOCAL_HOST.to_string()
}

/// A human-named agent binding.
///
/// `name` is the routing key and unique across the registry; the
/// (kind, directory, host) slot is unique as well. The on-disk field names
/// (`agent_type`, `machine`) predate this implementation and are kept for
/// compatibility with registries written by other hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub name: String,
    #[serde(rename = "agent_type")]
    pub kind: AgentKind,
    pub directory: PathBuf,
    #[serde(rename = "machine", default = "local_host")]
    pub host: String,
}

impl RegisteredAgent {
    pub fn is_local(&self) -> bool {
        self.host == LOCAL_HOST
    }

    fn occupies(&self, kind: AgentKind, directory: &Path, host: &str) -> bool {
        self.kind == kind && self.directory == directory && self.host == host
    }
}

/// Registry of named agents, loaded eagerly and written atomically.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    agents: Vec<RegisteredAgent>,
}

impl Registry {
    pub fn open() -> Result<Self> {
        Self::open_at(paths::registry_path()?)
    }

    /// An empty registry that will persist to `path` on first write. Lets
    /// the status view keep running when the on-disk document is corrupt.
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            agents: Vec::new(),
        }
    }

    /// Load a registry document. A missing file is an empty registry. A
    /// document written before hosts existed (rows without `machine`) is
    /// migrated in memory and rewritten once.
    pub fn open_at(path: PathBuf) -> Result<Self> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    agents: Vec::new(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |detail: String| Error::RegistryCorrupt {
            path: path.clone(),
            detail,
        };

        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        let needs_migration = document
            .as_array()
            .is_some_and(|rows| rows.iter().any(|row| row.get("machine").is_none()));
        let agents: Vec<RegisteredAgent> =
            serde_json::from_value(document).map_err(|e| corrupt(e.to_string()))?;

        let registry = Self { path, agents };
        if needs_migration {
            info!(path = %registry.path.display(), "registry: migrating entries without a machine field");
            registry.save()?;
        }
        Ok(registry)
    }

    /// Bind `name` to a slot. Re-adding the identical binding is a no-op;
    /// a name bound elsewhere fails with `DuplicateName`, a slot bound to
    /// another name with `SlotOccupied`.
    pub fn add(&mut self, agent: RegisteredAgent) -> Result<()> {
        if !agent.kind.is_routable() {
            return Err(Error::Other(anyhow::anyhow!(
                "cannot register '{}' with unknown agent kind",
                agent.name
            )));
        }

        if let Some(existing) = self.resolve_by_name(&agent.name) {
            if *existing == agent {
                return Ok(());
            }
            if !existing.occupies(agent.kind, &agent.directory, &agent.host) {
                return Err(Error::DuplicateName {
                    name: agent.name,
                    kind: existing.kind,
                });
            }
        }

        if let Some(existing) = self.resolve_by_slot(agent.kind, &agent.directory, &agent.host)
            && existing.name != agent.name
        {
            return Err(Error::SlotOccupied {
                kind: agent.kind,
                directory: agent.directory,
                host: agent.host,
                existing: existing.name.clone(),
            });
        }

        self.agents.retain(|a| a.name != agent.name);
        self.agents.push(agent);
        self.save()
    }

    /// Unbind whatever name occupies the slot. Idempotent.
    pub fn remove(&mut self, kind: AgentKind, directory: &Path, host: &str) -> Result<()> {
        let before = self.agents.len();
        self.agents.retain(|a| !a.occupies(kind, directory, host));
        if self.agents.len() != before {
            self.save()?;
        }
        Ok(())
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<&RegisteredAgent> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn resolve_by_slot(
        &self,
        kind: AgentKind,
        directory: &Path,
        host: &str,
    ) -> Option<&RegisteredAgent> {
        self.agents
            .iter()
            .find(|a| a.occupies(kind, directory, host))
    }

    /// Resolve a sender identity from a working directory: an exact
    /// directory match wins, then the first entry (in registry order) whose
    /// directory is an ancestor of `cwd`. Only local entries qualify.
    pub fn resolve_by_directory(&self, cwd: &Path) -> Option<&RegisteredAgent> {
        self.agents
            .iter()
            .find(|a| a.is_local() && a.directory == cwd)
            .or_else(|| {
                self.agents
                    .iter()
                    .find(|a| a.is_local() && cwd.starts_with(&a.directory))
            })
    }

    pub fn list(&self) -> &[RegisteredAgent] {
        &self.agents
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    /// Drop entries whose slot has no matching live pane.
    ///
    /// Only entries on hosts represented in `live` are considered, so
    /// registrations for hosts that were not probed survive. The local
    /// host is always covered: a local probe is authoritative even when it
    /// finds no panes, and a stale local binding must still be swept.
    pub fn reconcile(&mut self, live: &[PaneFacts]) -> Result<Vec<String>> {
        let covered_hosts: Vec<&str> = {
            let mut hosts: Vec<&str> = live.iter().map(|p| p.pane.host.as_str()).collect();
            hosts.push(LOCAL_HOST);
            hosts.sort_unstable();
            hosts.dedup();
            hosts
        };

        let mut dropped = Vec::new();
        self.agents.retain(|a| {
            if !covered_hosts.contains(&a.host.as_str()) {
                return true;
            }
            let alive = live.iter().any(|p| {
                p.pane.host == a.host && p.kind == a.kind && p.directory == a.directory
            });
            if !alive {
                warn!(name = %a.name, kind = %a.kind, directory = %a.directory.display(), "registry: dropping stale entry");
                dropped.push(a.name.clone());
            }
            alive
        });

        if !dropped.is_empty() {
            self.save()?;
        }
        Ok(dropped)
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.agents)
            .map_err(|e| Error::Other(e.into()))?;
        paths::write_atomic(&self.path, json.as_bytes())
    }
}
