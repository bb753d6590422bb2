//! line-relay: a single-process TCP broadcast relay.
//!
//! Clients connect and send newline-terminated frames; every completed frame
//! is written to every other connected client. One thread, one mio poll, no
//! locks.
//!
//! Alongside the relay the crate ships two blocking collaborators that speak
//! the same framing: a one-client-at-a-time echo server and a line client.

pub mod collab;
pub mod config;
pub mod error;
pub mod listener;
pub mod runtime;

/// Initialize tracing with `RUST_LOG` taking precedence over `level`.
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
