//! Connection state and the table that owns every live connection.
//!
//! Each connection tracks its lifecycle state and the partial frame it has
//! accumulated so far. The table hands out mio tokens as keys and remembers
//! insertion order so fan-out always visits clients oldest first.

use crate::runtime::buffer::FrameBuffer;
use mio::Token;
use slab::Slab;
use std::collections::{BTreeMap, TryReserveError};
use std::net::SocketAddr;

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted and registered, nothing read yet.
    Accepted,
    /// Collecting bytes of the in-progress frame.
    Accumulating,
    /// Its buffer is being fanned out to the other connections.
    Broadcasting,
    /// Torn down. Only seen on a connection already removed from the table.
    Closed,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    /// The client socket.
    pub stream: S,
    /// Remote address, when known.
    pub peer: Option<SocketAddr>,
    /// Bytes of the frame being accumulated.
    pub buffer: FrameBuffer,
    /// Current connection state.
    pub state: ConnState,
}

impl<S> Connection<S> {
    /// Create a new connection with an empty buffer.
    pub fn new(stream: S, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            peer,
            buffer: FrameBuffer::new(),
            state: ConnState::Accepted,
        }
    }

    /// Append freshly read bytes and report whether they completed a frame.
    ///
    /// On allocation failure the buffer is untouched and the error is returned.
    pub fn accumulate(&mut self, bytes: &[u8]) -> Result<bool, TryReserveError> {
        self.state = ConnState::Accumulating;
        self.buffer.append(bytes)?;
        Ok(self.buffer.is_complete())
    }

    /// Mark the connection as closed.
    pub fn close(&mut self) {
        self.state = ConnState::Closed;
    }
}

struct Entry<S> {
    seq: u64,
    conn: Connection<S>,
}

/// Table of active connections keyed by token.
///
/// Lookup, insert and remove go through a slab. A sequence number taken at
/// insert time keeps iteration in insertion order even after slots are reused.
pub struct ConnectionTable<S> {
    slots: Slab<Entry<S>>,
    order: BTreeMap<u64, usize>,
    next_seq: u64,
}

impl<S> Default for ConnectionTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConnectionTable<S> {
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Insert a connection and return the token that now identifies it.
    pub fn insert(&mut self, conn: Connection<S>) -> Token {
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = self.slots.insert(Entry { seq, conn });
        self.order.insert(seq, key);
        Token(key)
    }

    /// Get an immutable reference to a connection.
    pub fn get(&self, token: Token) -> Option<&Connection<S>> {
        self.slots.get(token.0).map(|e| &e.conn)
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection<S>> {
        self.slots.get_mut(token.0).map(|e| &mut e.conn)
    }

    /// Remove a connection from the table.
    ///
    /// Removing a token that is not present is a no-op returning `None`.
    pub fn remove(&mut self, token: Token) -> Option<Connection<S>> {
        let entry = self.slots.try_remove(token.0)?;
        self.order.remove(&entry.seq);
        Some(entry.conn)
    }

    /// Check if a connection exists.
    pub fn contains(&self, token: Token) -> bool {
        self.slots.contains(token.0)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Tokens in insertion order.
    pub fn tokens(&self) -> Vec<Token> {
        self.order.values().map(|&key| Token(key)).collect()
    }

    /// Iterate over all connections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Token, &Connection<S>)> {
        self.order
            .values()
            .map(move |&key| (Token(key), &self.slots[key].conn))
    }
}
