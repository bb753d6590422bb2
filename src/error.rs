//! Error taxonomy for the relay.
//!
//! Bootstrap and reactor-level failures terminate the process. Per-connection
//! failures are described by [`DisconnectCause`] and only ever tear down the
//! connection they belong to.

use std::io;

/// Failures while bringing the server up. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to resolve {host}:{port}: {reason}")]
    Resolve {
        host: String,
        port: String,
        reason: String,
    },

    #[error("{host}:{port} resolved to no addresses")]
    NoAddress { host: String, port: String },

    #[error("could not create a socket for any resolved address: {0}")]
    Socket(#[source] io::Error),

    #[error("could not bind any resolved address: {0}")]
    Bind(#[source] io::Error),

    #[error("cannot listen on this socket: {0}")]
    Listen(#[source] io::Error),

    #[error("cannot set up readiness polling: {0}")]
    Poll(#[source] io::Error),

    #[error("cannot allocate the {0}-byte read buffer")]
    ScratchAlloc(usize),

    #[error("could not connect to any resolved address: {0}")]
    Connect(#[source] io::Error),
}

/// Failures that stop the event loop.
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("waiting for readiness failed: {0}")]
    Wait(#[source] io::Error),
}

/// Why a client connection is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The peer closed its side; a read returned zero bytes.
    Eof,
    /// A read on the socket failed.
    ReadError(io::ErrorKind),
    /// The frame buffer could not grow to hold the bytes just read.
    OutOfMemory,
    /// The new socket could not be registered for readiness.
    Registration,
}

impl DisconnectCause {
    /// Only a graceful close hands pending partial content to the other clients.
    pub fn flushes_partial(self) -> bool {
        matches!(self, DisconnectCause::Eof)
    }
}

impl std::fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectCause::Eof => write!(f, "closed by peer"),
            DisconnectCause::ReadError(kind) => write!(f, "read error: {kind}"),
            DisconnectCause::OutOfMemory => write!(f, "frame buffer allocation failed"),
            DisconnectCause::Registration => write!(f, "readiness registration failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_eof_flushes() {
        assert!(DisconnectCause::Eof.flushes_partial());
        assert!(!DisconnectCause::ReadError(io::ErrorKind::ConnectionReset).flushes_partial());
        assert!(!DisconnectCause::OutOfMemory.flushes_partial());
        assert!(!DisconnectCause::Registration.flushes_partial());
    }

    #[test]
    fn test_bootstrap_messages() {
        let err = BootstrapError::Resolve {
            host: "nowhere".into(),
            port: "x".into(),
            reason: "invalid port".into(),
        };
        assert_eq!(err.to_string(), "failed to resolve nowhere:x: invalid port");

        let err: ReactorError = BootstrapError::ScratchAlloc(1024).into();
        assert_eq!(err.to_string(), "cannot allocate the 1024-byte read buffer");
    }
}
