use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use msgmux::cli;

#[derive(Parser)]
#[command(name = "send", version)]
#[command(about = "Send a message to a named AI agent running in a tmux pane")]
struct Cli {
    /// Sender identity (a registered name). Inferred from the working
    /// directory when omitted.
    #[arg(long)]
    from: Option<String>,

    /// Print registered agents and live panes instead of sending
    #[arg(long, conflicts_with_all = ["from", "receiver", "body"])]
    status: bool,

    /// Receiver's registered name
    #[arg(required_unless_present = "status")]
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
    } else {
        // clap guarantees the receiver is present when not in status mode
        let receiver = args.receiver.as_deref().unwrap_or_default();
        cli::run_send(args.from.as_deref(), receiver, &cli::join_body(&args.body))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "send failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
