//! Mapping from pane commands to known agent kinds.
//!
//! This is the only place where a command string becomes an [`AgentKind`];
//! everywhere else the enum flows.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The closed set of recognized AI coding assistants.
///
/// `Unknown` panes are never routable and never stored in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Opencode,
    Coder,
    Crush,
    Unknown,
}

impl AgentKind {
    pub fn is_routable(self) -> bool {
        self != AgentKind::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Opencode => "opencode",
            AgentKind::Coder => "coder",
            AgentKind::Crush => "crush",
            AgentKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a command line (or bare command name) as an agent kind.
///
/// Matching is case-insensitive substring. Rule order matters: "opencode"
/// contains "code" and "coder" contains "code", so "coder" only matches
/// when "opencode" does not.
pub fn classify(command: &str) -> AgentKind {
    let lower = command.to_lowercase();
    if lower.contains("claude") {
        AgentKind::Claude
    } else if lower.contains("opencode") || lower.contains("open-code") {
        AgentKind::Opencode
    } else if lower.contains("coder") {
        AgentKind::Coder
    } else if lower.contains("crush") {
        AgentKind::Crush
    } else {
        AgentKind::Unknown
    }
}

/// Runtimes that host many CLI tools under one binary name.
///
/// When tmux reports one of these as a pane's current command, the real
/// program is found by classifying the pane's child processes instead.
pub fn is_hosting_runtime(command: &str) -> bool {
    let first = command.split_whitespace().next().unwrap_or(command);
    let stem = Path::new(first)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(first)
        .to_lowercase();
    matches!(stem.as_str(), "node" | "bun" | "deno" | "python" | "python3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_basic_commands() {
        assert_eq!(classify("claude"), AgentKind::Claude);
        assert_eq!(classify("opencode"), AgentKind::Opencode);
        assert_eq!(classify("coder"), AgentKind::Coder);
        assert_eq!(classify("crush"), AgentKind::Crush);
        assert_eq!(classify("zsh"), AgentKind::Unknown);
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(classify("Claude"), AgentKind::Claude);
        assert_eq!(classify("OPENCODE"), AgentKind::Opencode);
    }

    #[test]
    fn classify_full_command_lines() {
        assert_eq!(
            classify("node /usr/local/bin/claude --continue"),
            AgentKind::Claude
        );
        assert_eq!(classify("/home/u/.bun/bin/opencode"), AgentKind::Opencode);
    }

    #[test]
    fn opencode_wins_over_coder() {
        // "opencode" contains no "coder" substring, but a combined line must
        // resolve by rule order, not by accident.
        assert_eq!(classify("opencode"), AgentKind::Opencode);
        assert_eq!(classify("open-code"), AgentKind::Opencode);
    }

    #[test]
    fn classify_is_disjoint_over_probe_samples() {
        // Every sample resolves to exactly one kind: re-running classify is
        // stable and no rule pair can both claim a line.
        let samples = [
            "claude",
            "opencode",
            "open-code serve",
            "coder agent",
            "crush",
            "node",
            "vim",
            "claude-code",
        ];
        for s in samples {
            let first = classify(s);
            let second = classify(s);
            assert_eq!(first, second, "classify must be pure for {s:?}");
        }
    }

    #[test]
    fn hosting_runtimes() {
        assert!(is_hosting_runtime("node"));
        assert!(is_hosting_runtime("/usr/bin/node --max-old-space-size=4096"));
        assert!(is_hosting_runtime("bun"));
        assert!(is_hosting_runtime("python3"));
        assert!(!is_hosting_runtime("claude"));
        assert!(!is_hosting_runtime("zsh"));
    }
}
