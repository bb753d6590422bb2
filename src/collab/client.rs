//! Blocking line client.
//!
//! Reads one line from its input, sends it in full, then blocks until one
//! reply frame arrives before prompting again. A reply is complete when a read
//! ends with `\n`, or when the server closes the connection.

use crate::error::BootstrapError;
use crate::listener;
use crate::runtime::FRAME_TERMINATOR;
use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;
use tracing::debug;

const READ_CHUNK: usize = 1024;

/// Connect to the first resolved address that accepts.
pub fn connect(host: &str, port: &str) -> Result<TcpStream, BootstrapError> {
    let mut last_err = None;
    for addr in listener::resolve(host, port)? {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(addr = %addr, error = %e, "Connect failed");
                last_err = Some(e);
            }
        }
    }
    Err(BootstrapError::Connect(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no address to connect to")
    })))
}

/// Request/response client over any byte stream.
pub struct LineClient<S> {
    stream: S,
    chunk: Vec<u8>,
}

impl<S: Read + Write> LineClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Send one line, terminator included, retrying until fully written.
    pub fn send_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.stream.write_all(line)?;
        self.stream.flush()
    }

    /// Copy incoming bytes to `out` until a read ends with the terminator or
    /// the peer closes. Returns the number of bytes received.
    pub fn receive_reply<W: Write>(&mut self, out: &mut W) -> io::Result<usize> {
        let mut total = 0;
        loop {
            let n = match self.stream.read(&mut self.chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            out.write_all(&self.chunk[..n])?;
            total += n;
            if self.chunk[n - 1] == FRAME_TERMINATOR {
                break;
            }
        }
        out.flush()?;
        Ok(total)
    }

    /// Prompt, send a line, print the reply; repeat until input or server ends.
    ///
    /// Returns the number of lines sent.
    pub fn session<R, W, P>(&mut self, mut input: R, mut output: W, mut prompt: P) -> io::Result<usize>
    where
        R: BufRead,
        W: Write,
        P: Write,
    {
        let mut line = Vec::new();
        let mut sent = 0;

        loop {
            writeln!(prompt, "Enter your message:")?;
            line.clear();
            if input.read_until(FRAME_TERMINATOR, &mut line)? == 0 {
                break;
            }

            self.send_line(&line)?;
            sent += 1;

            output.write_all(b"Server answered with: ")?;
            if self.receive_reply(&mut output)? == 0 {
                debug!("Server closed the connection");
                break;
            }
        }
        Ok(sent)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
