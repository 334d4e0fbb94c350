//! Message delivery.
//!
//! Local routes are typed into the target pane with tmux send-keys; remote
//! routes re-invoke the remote host's own `send` tool over SSH. Delivery
//! is at-least-once: success means the keystrokes were accepted, not that
//! the receiving assistant processed them.

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::cmd::Cmd;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::{Endpoint, History};
use crate::hosts::HostRegistry;
use crate::probe;
use crate::registry::{Registry, RegisteredAgent};
use crate::remote;
use crate::router::{self, Route};

/// Pause between typing the body and each submit key. Some assistants
/// buffer input and swallow the first newline, hence the second Enter.
const SUBMIT_DELAY: Duration = Duration::from_millis(100);

/// Sender identity used when no registration matches the caller.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Wrap a message body so the receiving assistant can see who it is from
/// and how to reply with provenance.
pub fn envelope(sender: &str, receiver: &str, body: &str) -> String {
    format!(
        "{{Receiving msg from: {sender}}} \"{body}\" {{When ready to respond use: send --from {receiver} {sender} '<your reply>'}}"
    )
}

/// Resolve the sender identity: an explicit `--from` must name a
/// registered agent; otherwise the working directory is matched against
/// the registry (exact directory, then ancestor). No match means the
/// anonymous sender.
pub fn resolve_sender(
    from: Option<&str>,
    cwd: &Path,
    registry: &Registry,
) -> Result<Option<RegisteredAgent>> {
    match from {
        Some(name) => registry
            .resolve_by_name(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::NameUnknown {
                name: name.to_string(),
                known: registry.names(),
            }),
        None => Ok(registry.resolve_by_directory(cwd).cloned()),
    }
}

/// Type `text` into a local pane and submit it twice.
pub fn deliver_local(pane_address: &str, text: &str) -> Result<()> {
    type_keys(pane_address, &["-l", text])?;
    thread::sleep(SUBMIT_DELAY);
    type_keys(pane_address, &["Enter"])?;
    thread::sleep(SUBMIT_DELAY);
    type_keys(pane_address, &["Enter"])?;
    Ok(())
}

fn type_keys(pane_address: &str, tail: &[&str]) -> Result<()> {
    Cmd::new("tmux")
        .args(["send-keys", "-t", pane_address])
        .args(tail.iter().copied())
        .run()
        .map_err(|e| match e {
            Error::Timeout { .. } => e,
            _ => Error::PaneVanished(pane_address.to_string()),
        })?;
    Ok(())
}

/// Delegate delivery to the remote host's own send tool, mirroring the
/// local invocation. The body is quoted so embedded whitespace and quotes
/// survive the remote shell.
pub fn deliver_remote(
    route: &Route,
    hosts: &HostRegistry,
    sender: Option<&str>,
    body: &str,
) -> Result<()> {
    let host = hosts.get(&route.host).ok_or_else(|| Error::RemoteUnreachable {
        host: route.host.clone(),
        detail: "host is not registered".to_string(),
    })?;

    let mut args = vec!["send".to_string()];
    if let Some(sender) = sender {
        args.push("--from".to_string());
        args.push(remote::shell_quote(sender));
    }
    args.push(remote::shell_quote(&route.agent.name));
    args.push(remote::shell_quote(body));

    remote::run_remote(host, &args, remote::REMOTE_SEND_DEADLINE)?;
    Ok(())
}

/// Resolve, route, deliver, and record one message. This is the whole
/// `send` operation behind both CLI front-ends.
///
/// History problems never fail a delivered send: the store degrades to a
/// stderr warning and the message still goes out.
pub fn send(from: Option<&str>, receiver: &str, body: &str, config: &Config) -> Result<()> {
    let registry = Registry::open()?;
    let hosts = HostRegistry::open()?;

    let cwd = std::env::current_dir()?;
    let sender = resolve_sender(from, &cwd, &registry)?;

    let live = probe::probe()?;
    let route = router::route(receiver, &registry, &hosts, &live)?;

    if route.is_local() {
        // An anonymous sender gets no envelope: there is no identity to
        // carry and no reply path to advertise.
        let text = match &sender {
            Some(s) => envelope(&s.name, &route.agent.name, body),
            None => body.to_string(),
        };
        deliver_local(&route.pane_address, &text)?;
    } else {
        deliver_remote(&route, &hosts, sender.as_ref().map(|s| s.name.as_str()), body)?;
    }

    info!(
        receiver = %route.agent.name,
        host = %route.host,
        sender = sender.as_ref().map(|s| s.name.as_str()).unwrap_or(UNKNOWN_SENDER),
        "message delivered"
    );

    if let Some(sender) = sender {
        record(&sender, &route.agent, body, config);
    }

    Ok(())
}

/// Best-effort history insert; both endpoints are registered identities.
fn record(sender: &RegisteredAgent, receiver: &RegisteredAgent, body: &str, config: &Config) {
    let mut history = match History::open(config) {
        Ok(history) => history,
        Err(e) => {
            warn!(error = %e, "history unavailable, skipping conversation log");
            eprintln!("warning: {e}");
            return;
        }
    };
    let result = history.log(
        &Endpoint::new(&sender.name, &sender.directory),
        &Endpoint::new(&receiver.name, &receiver.directory),
        body,
    );
    if let Err(e) = result {
        warn!(error = %e, "failed to record message");
        eprintln!("warning: failed to record message: {e}");
    }
}
