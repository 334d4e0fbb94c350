use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tool configuration, read from ~/.config/msgmux/config.yaml.
///
/// A missing file means defaults. A file that exists but does not parse is
/// a hard error naming the path, so typos don't silently fall back.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Days of message history to keep. The retention sweep runs at every
    /// store open and prunes messages older than this horizon.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Adopt remote registrations into the local registry during discovery.
    /// Off by default: adoption silently mutates the local registry on probe.
    #[serde(default)]
    pub adopt_remote_agents: bool,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            adopt_remote_agents: false,
        }
    }
}

impl Config {
    /// Load the global configuration from the XDG config directory.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(home_dir) = home::home_dir() {
            for name in ["config.yaml", "config.yml"] {
                let path = home_dir.join(".config/msgmux").join(name);
                if path.exists() {
                    return Self::load_from_path(&path);
                }
            }
        }
        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.retention_days, 30);
        assert!(!config.adopt_remote_agents);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str("adopt_remote_agents: true").unwrap();
        assert!(config.adopt_remote_agents);
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn full_yaml_roundtrip() {
        let config: Config = serde_yaml::from_str("retention_days: 7\nadopt_remote_agents: false").unwrap();
        assert_eq!(config.retention_days, 7);
    }
}
