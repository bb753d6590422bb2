//! line-relay: fans newline-terminated frames out to every other client.
//!
//! Usage: `line-relay <BIND_ADDRESS> <PORT> [--config FILE] [--backlog N]
//! [--read-chunk BYTES] [--max-events N] [--log-level LEVEL]`

use line_relay::config::Config;
use line_relay::runtime;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("line-relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    line_relay::init_logging(&config.log_level);

    info!(
        host = %config.host,
        port = %config.port,
        backlog = config.backlog,
        "Starting line-relay"
    );

    match runtime::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal");
            eprintln!("line-relay: {e}");
            ExitCode::FAILURE
        }
    }
}
