//! Fan-out of completed frames.
//!
//! Every recipient gets one best-effort attempt: the tail of the frame is
//! written until it is all out or the socket refuses more. A recipient that
//! refuses is simply skipped for this frame. Nothing is queued and nothing is
//! reported back to the sender.

use crate::runtime::connection::ConnectionTable;
use mio::Token;
use std::io::{self, Write};
use tracing::{debug, trace};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Connections the frame was offered to.
    pub recipients: usize,
    /// Recipients that got the whole frame.
    pub complete: usize,
}

impl Delivery {
    /// Recipients that got only part of the frame, or none of it.
    pub fn abandoned(&self) -> usize {
        self.recipients - self.complete
    }
}

/// Write `frame` to every connection in insertion order, skipping `sender`
/// when `exclude_sender` is set.
pub fn broadcast<S: Write>(
    table: &mut ConnectionTable<S>,
    frame: &[u8],
    sender: Token,
    exclude_sender: bool,
) -> Delivery {
    let mut delivery = Delivery::default();

    for token in table.tokens() {
        if exclude_sender && token == sender {
            continue;
        }
        let Some(conn) = table.get_mut(token) else {
            continue;
        };

        delivery.recipients += 1;
        let written = write_frame(&mut conn.stream, frame);
        if written == frame.len() {
            delivery.complete += 1;
        } else {
            debug!(
                token = token.0,
                written,
                len = frame.len(),
                "Recipient refused the rest of the frame"
            );
        }
    }

    trace!(
        sender = sender.0,
        len = frame.len(),
        recipients = delivery.recipients,
        complete = delivery.complete,
        "Broadcast done"
    );
    delivery
}

/// Keep writing the remaining tail until done, a zero-length write, or an error.
///
/// Returns the number of bytes that went out.
fn write_frame<S: Write>(stream: &mut S, frame: &[u8]) -> usize {
    let mut written = 0;
    while written < frame.len() {
        match stream.write(&frame[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    written
}
