//! relay-client: blocking line client.
//!
//! Sends one line from stdin at a time and waits for exactly one reply frame.

use clap::Parser;
use line_relay::collab::client::{self, LineClient};
use std::io;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "relay-client")]
#[command(version = "0.1.0")]
#[command(about = "Sends stdin lines to a relay or echo server and prints each reply", long_about = None)]
struct Args {
    /// Server address
    server_address: String,

    /// Server port
    port: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    line_relay::init_logging(&args.log_level);

    let stream = match client::connect(&args.server_address, &args.port) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("relay-client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut client = LineClient::new(stream);
    match client.session(io::stdin().lock(), io::stdout().lock(), io::stderr()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("relay-client: {e}");
            ExitCode::FAILURE
        }
    }
}
