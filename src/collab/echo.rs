//! Single-connection echo server.
//!
//! Protocol: newline-terminated frames, identical to the relay.
//! - Read: bytes until the buffered data ends with `\n`
//! - Write: the same frame, terminator included
//!
//! Each received frame is also copied to a log sink prefixed with
//! `Received Body: `, between a `Client connected` and a `Client disconnected`
//! line for the session. An unterminated tail left at EOF is discarded.

use crate::runtime::FRAME_TERMINATOR;
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use tracing::{debug, info};

const READ_CHUNK: usize = 1024;

/// Serve clients one after another, forever.
///
/// Only a failing `accept` ends the loop; per-client I/O errors end that
/// client's session and the server moves on.
pub fn serve<W: Write>(listener: &TcpListener, log: &mut W) -> io::Result<()> {
    loop {
        let (mut stream, peer) = listener.accept()?;
        info!(peer = %peer, "Client connected");

        match serve_client(&mut stream, log) {
            Ok(frames) => info!(peer = %peer, frames, "Client disconnected"),
            Err(e) => info!(peer = %peer, error = %e, "Client dropped"),
        }
    }
}

/// Run one client session, bracketing its frames in the log sink with
/// connect and disconnect lines.
///
/// The disconnect line is written even when the session ends in an error.
pub fn serve_client<S, W>(stream: &mut S, log: &mut W) -> io::Result<usize>
where
    S: Read + Write,
    W: Write,
{
    log.write_all(b"Client connected\n")?;
    log.flush()?;

    let served = serve_connection(stream, log);

    log.write_all(b"Client disconnected\n")?;
    log.flush()?;
    served
}

/// Echo frames on one connection until EOF. Returns the number of frames echoed.
pub fn serve_connection<S, W>(stream: &mut S, log: &mut W) -> io::Result<usize>
where
    S: Read + Write,
    W: Write,
{
    let mut chunk = [0u8; READ_CHUNK];
    let mut pending = BytesMut::with_capacity(4096);
    let mut frames = 0;

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        pending.extend_from_slice(&chunk[..n]);

        if pending.last() != Some(&FRAME_TERMINATOR) {
            continue;
        }

        let frame = pending.split().freeze();
        log.write_all(b"Received Body: ")?;
        log.write_all(&frame)?;
        log.flush()?;

        stream.write_all(&frame)?;
        frames += 1;
    }

    if !pending.is_empty() {
        debug!(len = pending.len(), "Discarding unterminated tail");
    }
    Ok(frames)
}
