//! relay-echo: blocking echo server, one client at a time.
//!
//! Speaks the relay's newline framing: every frame a client sends comes back
//! to that same client, and is printed to stdout.

use clap::Parser;
use line_relay::collab::echo;
use line_relay::config::MIN_BACKLOG;
use line_relay::listener;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "relay-echo")]
#[command(version = "0.1.0")]
#[command(about = "Echoes newline-terminated frames back to one client at a time", long_about = None)]
struct Args {
    /// Address to bind to (`*` for any interface)
    bind_address: String,

    /// Port number or service name to listen on
    port: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    line_relay::init_logging(&args.log_level);

    let listener = match listener::prepare(&args.bind_address, &args.port, MIN_BACKLOG) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("relay-echo: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Listening");
    }

    let stdout = std::io::stdout();
    match echo::serve(&listener, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("relay-echo: accept failed: {e}");
            ExitCode::FAILURE
        }
    }
}
