//! Relay state: the connection table plus the rules that drive it.
//!
//! Bytes read from a client go into that client's frame buffer. When the
//! buffer ends in the terminator the whole buffer is fanned out to every other
//! client and the buffer is reset. When a client goes away, whatever it had
//! accumulated is fanned out only if the close was graceful.
//!
//! The relay never touches the poller. The event loop owns registration and
//! deregisters the stream of every connection [`Relay::disconnect`] returns.

use crate::error::DisconnectCause;
use crate::runtime::broadcast::{broadcast, Delivery};
use crate::runtime::connection::{ConnState, Connection, ConnectionTable};
use mio::Token;
use std::io::Write;
use std::net::SocketAddr;
use tracing::{debug, trace, warn, Level};

pub struct Relay<S> {
    connections: ConnectionTable<S>,
}

impl<S: Write> Default for Relay<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Write> Relay<S> {
    pub fn new() -> Self {
        Self {
            connections: ConnectionTable::new(),
        }
    }

    /// Track a newly accepted client.
    pub fn add(&mut self, stream: S, peer: Option<SocketAddr>) -> Token {
        self.connections.insert(Connection::new(stream, peer))
    }

    pub fn connections(&self) -> &ConnectionTable<S> {
        &self.connections
    }

    pub fn connection_mut(&mut self, token: Token) -> Option<&mut Connection<S>> {
        self.connections.get_mut(token)
    }

    /// Feed bytes read from `token` through its frame accumulator.
    ///
    /// Returns the delivery summary when the bytes completed a frame, `Ok(None)`
    /// when more bytes are needed or the token is unknown. A buffer that cannot
    /// grow yields `Err(DisconnectCause::OutOfMemory)`; the caller is expected
    /// to tear the connection down.
    pub fn on_data(&mut self, token: Token, bytes: &[u8]) -> Result<Option<Delivery>, DisconnectCause> {
        let Some(conn) = self.connections.get_mut(token) else {
            return Ok(None);
        };

        let complete = match conn.accumulate(bytes) {
            Ok(complete) => complete,
            Err(e) => {
                warn!(token = token.0, len = bytes.len(), error = %e, "Frame buffer cannot grow");
                return Err(DisconnectCause::OutOfMemory);
            }
        };

        if !complete {
            trace!(token = token.0, pending = conn.buffer.len(), "Frame incomplete");
            return Ok(None);
        }

        Ok(Some(self.flush(token)))
    }

    /// Remove `token`, first handing its partial frame to everyone else if the
    /// cause allows it.
    ///
    /// Returns the removed connection so its stream can be deregistered, or
    /// `None` if the token was already gone.
    pub fn disconnect(&mut self, token: Token, cause: DisconnectCause) -> Option<Connection<S>> {
        let pending = self.connections.get(token)?.buffer.len();

        if pending > 0 {
            if cause.flushes_partial() {
                let delivery = self.flush(token);
                debug!(
                    token = token.0,
                    len = pending,
                    recipients = delivery.recipients,
                    "Broadcast partial frame of disconnecting client"
                );
            } else {
                debug!(token = token.0, len = pending, cause = %cause, "Dropping partial frame");
            }
        }

        let mut conn = self.connections.remove(token)?;
        conn.close();
        Some(conn)
    }

    /// Broadcast the sender's buffer to every other connection and reset it.
    fn flush(&mut self, token: Token) -> Delivery {
        let Some(conn) = self.connections.get_mut(token) else {
            return Delivery::default();
        };
        conn.state = ConnState::Broadcasting;
        self.trace_snapshot();

        let Some(conn) = self.connections.get_mut(token) else {
            return Delivery::default();
        };
        // Move the buffer out so the table can be walked mutably.
        let mut frame = std::mem::take(&mut conn.buffer);

        let delivery = broadcast(&mut self.connections, frame.as_slice(), token, true);
        debug!(
            sender = token.0,
            len = frame.len(),
            recipients = delivery.recipients,
            abandoned = delivery.abandoned(),
            "Frame broadcast"
        );

        frame.clear();
        if let Some(conn) = self.connections.get_mut(token) {
            conn.buffer = frame;
            conn.state = ConnState::Accumulating;
        }
        delivery
    }

    /// Dump every connection and its pending bytes at trace level.
    fn trace_snapshot(&self) {
        if !tracing::enabled!(Level::TRACE) {
            return;
        }
        for (token, conn) in self.connections.iter() {
            trace!(
                token = token.0,
                state = ?conn.state,
                pending = conn.buffer.len(),
                data = %conn.buffer.as_slice().escape_ascii(),
                "Connected client"
            );
        }
        trace!(clients = self.connections.len(), "Connected clients");
    }
}
