use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use msgmux::cli;

#[derive(Parser)]
#[command(name = "send-remote", version)]
#[command(about = "Send a message to a named AI agent, with remote-host discovery")]
struct Cli {
    /// Sender identity (a registered name). Inferred from the working
    /// directory when omitted.
    #[arg(long)]
    from: Option<String>,

    /// Print registered agents and live panes instead of sending
    #[arg(long, conflicts_with_all = ["from", "receiver", "body", "discover"])]
    status: bool,

    /// List the agents registered on a remote host
    #[arg(long, value_name = "HOST", conflicts_with_all = ["from", "receiver", "body"])]
    discover: Option<String>,

    /// Receiver's registered name
    #[arg(required_unless_present_any = ["status", "discover"])]
    receiver: Option<String>,

    /// Message body (remaining arguments, joined with single spaces)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    body: Vec<String>,
}

fn main() -> ExitCode {
    let _ = msgmux::logger::init();
    let args = Cli::parse();

    let result = if args.status {
        cli::print_status()
    } else if let Some(host) = args.discover.as_deref() {
        cli::print_remote_registry(host)
    } else {
        let receiver = args.receiver.as_deref().unwrap_or_default();
        cli::run_send(args.from.as_deref(), receiver, &cli::join_body(&args.body))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "send-remote failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
