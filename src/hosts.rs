//! The remote-host registry: nicknames bound to SSH connect invocations.
//! Entries are only ever created and removed explicitly; nothing sweeps
//! them.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths;
use crate::registry::LOCAL_HOST;

/// A reachable remote machine. `connect_command` holds the exact tokens
/// that open a shell there (e.g. `ssh u@h`); `ssh_key` may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    pub name: String,
    #[serde(default)]
    pub ssh_key: String,
    pub connect_command: String,
}

impl RemoteHost {
    pub fn connect_tokens(&self) -> Vec<&str> {
        self.connect_command.split_whitespace().collect()
    }
}

pub struct HostRegistry {
    path: PathBuf,
    hosts: Vec<RemoteHost>,
}

impl HostRegistry {
    pub fn open() -> Result<Self> {
        Self::open_at(paths::remotes_path()?)
    }

    pub fn open_at(path: PathBuf) -> Result<Self> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    hosts: Vec::new(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let hosts: Vec<RemoteHost> =
            serde_json::from_str(&content).map_err(|e| Error::RegistryCorrupt {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        Ok(Self { path, hosts })
    }

    /// Add or replace a host entry. Nicknames are case-sensitive; the
    /// local sentinel and empty connect commands are rejected.
    pub fn add(&mut self, host: RemoteHost) -> Result<()> {
        if host.name.is_empty() || host.name == LOCAL_HOST {
            return Err(Error::Other(anyhow::anyhow!(
                "'{}' is not a valid remote host nickname",
                host.name
            )));
        }
        if host.connect_tokens().is_empty() {
            return Err(Error::Other(anyhow::anyhow!(
                "remote host '{}' has an empty connect command",
                host.name
            )));
        }

        self.hosts.retain(|h| h.name != host.name);
        self.hosts.push(host);
        self.save()
    }

    /// Remove a host entry. Idempotent.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let before = self.hosts.len();
        self.hosts.retain(|h| h.name != name);
        if self.hosts.len() != before {
            self.save()?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RemoteHost> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn list(&self) -> &[RemoteHost] {
        &self.hosts
    }

    fn save(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.hosts).map_err(|e| Error::Other(e.into()))?;
        paths::write_atomic(&self.path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host(name: &str, key: &str, cmd: &str) -> RemoteHost {
        RemoteHost {
            name: name.to_string(),
            ssh_key: key.to_string(),
            connect_command: cmd.to_string(),
        }
    }

    #[test]
    fn add_get_remove_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("remotes.json");

        let mut hosts = HostRegistry::open_at(path.clone()).unwrap();
        hosts.add(host("lab", "/home/u/.ssh/id", "ssh u@lab")).unwrap();

        let reloaded = HostRegistry::open_at(path).unwrap();
        let lab = reloaded.get("lab").unwrap();
        assert_eq!(lab.connect_tokens(), vec!["ssh", "u@lab"]);
        assert_eq!(lab.ssh_key, "/home/u/.ssh/id");

        hosts.remove("lab").unwrap();
        hosts.remove("lab").unwrap();
        assert!(hosts.get("lab").is_none());
    }

    #[test]
    fn nicknames_are_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let mut hosts = HostRegistry::open_at(dir.path().join("remotes.json")).unwrap();
        hosts.add(host("Lab", "", "ssh u@lab")).unwrap();
        assert!(hosts.get("lab").is_none());
        assert!(hosts.get("Lab").is_some());
    }

    #[test]
    fn local_sentinel_rejected() {
        let dir = TempDir::new().unwrap();
        let mut hosts = HostRegistry::open_at(dir.path().join("remotes.json")).unwrap();
        assert!(hosts.add(host(LOCAL_HOST, "", "ssh u@h")).is_err());
        assert!(hosts.add(host("", "", "ssh u@h")).is_err());
    }

    #[test]
    fn empty_connect_command_rejected() {
        let dir = TempDir::new().unwrap();
        let mut hosts = HostRegistry::open_at(dir.path().join("remotes.json")).unwrap();
        assert!(hosts.add(host("lab", "", "   ")).is_err());
    }

    #[test]
    fn readd_replaces_entry() {
        let dir = TempDir::new().unwrap();
        let mut hosts = HostRegistry::open_at(dir.path().join("remotes.json")).unwrap();
        hosts.add(host("lab", "", "ssh u@old")).unwrap();
        hosts.add(host("lab", "", "ssh u@new")).unwrap();
        assert_eq!(hosts.list().len(), 1);
        assert_eq!(hosts.get("lab").unwrap().connect_command, "ssh u@new");
    }

    #[test]
    fn missing_key_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("remotes.json");
        fs::write(&path, r#"[{"name": "lab", "connect_command": "ssh u@lab"}]"#).unwrap();

        let hosts = HostRegistry::open_at(path).unwrap();
        assert_eq!(hosts.get("lab").unwrap().ssh_key, "");
    }
}
