//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! mio registrations are edge-triggered, so a readable event is serviced by
//! reading `read_chunk`-sized chunks until the socket would block. Each chunk
//! runs through the frame accumulator on its own, exactly as if it had been
//! the only read for that event.

use crate::config::Config;
use crate::error::{BootstrapError, DisconnectCause, ReactorError};
use crate::listener;
use crate::runtime::Relay;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read};
use std::net::SocketAddr;
use tracing::{debug, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Single-threaded relay server.
pub struct Reactor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    scratch: Vec<u8>,
    relay: Relay<TcpStream>,
}

impl Reactor {
    /// Resolve, bind and listen, then register the listener for readiness.
    pub fn bind(config: &Config) -> Result<Self, BootstrapError> {
        let std_listener = listener::prepare(&config.host, &config.port, config.backlog)?;
        std_listener
            .set_nonblocking(true)
            .map_err(BootstrapError::Listen)?;
        let local_addr = std_listener.local_addr().map_err(BootstrapError::Listen)?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new().map_err(BootstrapError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(BootstrapError::Poll)?;

        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(config.read_chunk)
            .map_err(|_| BootstrapError::ScratchAlloc(config.read_chunk))?;
        scratch.resize(config.read_chunk, 0);

        info!(
            addr = %local_addr,
            backlog = config.backlog,
            read_chunk = config.read_chunk,
            "Listening"
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(config.max_events),
            listener,
            local_addr,
            scratch,
            relay: Relay::new(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve forever. Returns only on a fatal accept or poll failure.
    pub fn run(self) -> Result<(), ReactorError> {
        let Reactor {
            mut poll,
            mut events,
            listener,
            mut scratch,
            mut relay,
            ..
        } = self;

        loop {
            match poll.poll(&mut events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReactorError::Wait(e)),
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => {
                        accept_connections(&listener, &mut poll, &mut relay)?;
                    }
                    token => {
                        handle_readable(token, &mut poll, &mut relay, &mut scratch);
                    }
                }
            }
        }
    }
}

/// Drain the accept queue, registering each new client for readability.
fn accept_connections(
    listener: &TcpListener,
    poll: &mut Poll,
    relay: &mut Relay<TcpStream>,
) -> Result<(), ReactorError> {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let token = relay.add(stream, Some(peer));

                // Re-borrow after insert
                let registered = match relay.connection_mut(token) {
                    Some(conn) => {
                        poll.registry()
                            .register(&mut conn.stream, token, Interest::READABLE)
                    }
                    None => continue,
                };

                match registered {
                    Ok(()) => {
                        info!(
                            token = token.0,
                            peer = %peer,
                            clients = relay.connections().len(),
                            "Client connected"
                        );
                    }
                    Err(e) => {
                        warn!(token = token.0, peer = %peer, error = %e, "Cannot register client");
                        relay.disconnect(token, DisconnectCause::Registration);
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionAborted => {
                debug!("Peer aborted before accept");
                continue;
            }
            Err(e) => return Err(ReactorError::Accept(e)),
        }
    }
    Ok(())
}

/// Read everything the client has sent so far, chunk by chunk.
fn handle_readable(
    token: Token,
    poll: &mut Poll,
    relay: &mut Relay<TcpStream>,
    scratch: &mut [u8],
) {
    loop {
        let Some(conn) = relay.connection_mut(token) else {
            return;
        };

        match conn.stream.read(scratch) {
            Ok(0) => {
                close_connection(poll, relay, token, DisconnectCause::Eof);
                return;
            }
            Ok(n) => {
                trace!(token = token.0, len = n, data = %scratch[..n].escape_ascii(), "Received");
                if let Err(cause) = relay.on_data(token, &scratch[..n]) {
                    close_connection(poll, relay, token, cause);
                    return;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(token = token.0, error = %e, "Read failed");
                close_connection(poll, relay, token, DisconnectCause::ReadError(e.kind()));
                return;
            }
        }
    }
}

fn close_connection(
    poll: &mut Poll,
    relay: &mut Relay<TcpStream>,
    token: Token,
    cause: DisconnectCause,
) {
    let Some(mut conn) = relay.disconnect(token, cause) else {
        debug!(token = token.0, "Connection already closed");
        return;
    };

    if let Err(e) = poll.registry().deregister(&mut conn.stream) {
        warn!(token = token.0, error = %e, "Cannot deregister client, continuing");
    }

    info!(
        token = token.0,
        peer = ?conn.peer,
        cause = %cause,
        clients = relay.connections().len(),
        "Client disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{Shutdown, TcpStream as StdStream};
    use std::thread;
    use std::time::Duration;

    const SETTLE: Duration = Duration::from_millis(150);
    const QUIET: Duration = Duration::from_millis(300);

    fn start_relay() -> SocketAddr {
        let reactor = Reactor::bind(&Config::new("127.0.0.1", "0")).unwrap();
        let addr = reactor.local_addr();
        thread::spawn(move || {
            let _ = reactor.run();
        });
        addr
    }

    /// Connect `n` clients and give the reactor time to accept them all.
    fn connect(addr: SocketAddr, n: usize) -> Vec<StdStream> {
        let clients = (0..n)
            .map(|_| {
                let s = StdStream::connect(addr).unwrap();
                s.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
                s
            })
            .collect();
        thread::sleep(SETTLE);
        clients
    }

    fn read_n(stream: &mut StdStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    fn assert_quiet(stream: &mut StdStream) {
        stream.set_read_timeout(Some(QUIET)).unwrap();
        let mut buf = [0u8; 64];
        match stream.read(&mut buf) {
            Err(e) => assert!(
                matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
                "unexpected error: {e}"
            ),
            Ok(n) => panic!("expected silence, got {:?}", &buf[..n]),
        }
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn test_basic_fan_out() {
        let addr = start_relay();
        let mut c = connect(addr, 3);

        c[0].write_all(b"hi\n").unwrap();
        assert_eq!(read_n(&mut c[1], 3), b"hi\n");
        assert_eq!(read_n(&mut c[2], 3), b"hi\n");

        assert_quiet(&mut c[0]);
        assert_quiet(&mut c[1]);
        assert_quiet(&mut c[2]);
    }

    #[test]
    fn test_split_frame_arrives_whole() {
        let addr = start_relay();
        let mut c = connect(addr, 2);

        c[0].write_all(b"ab").unwrap();
        thread::sleep(SETTLE);
        assert_quiet(&mut c[1]);

        c[0].write_all(b"c\n").unwrap();
        assert_eq!(read_n(&mut c[1], 4), b"abc\n");
        assert_quiet(&mut c[1]);
    }

    #[test]
    fn test_large_frame() {
        let addr = start_relay();
        let mut c = connect(addr, 2);

        let mut frame: Vec<u8> = (0..10_000u32).map(|i| b'a' + (i % 26) as u8).collect();
        frame.push(b'\n');
        c[0].write_all(&frame).unwrap();

        assert_eq!(read_n(&mut c[1], frame.len()), frame);
        assert_quiet(&mut c[1]);
    }

    #[test]
    fn test_graceful_close_broadcasts_partial() {
        let addr = start_relay();
        let mut c = connect(addr, 3);

        c[0].write_all(b"partial").unwrap();
        c[0].shutdown(Shutdown::Both).unwrap();

        assert_eq!(read_n(&mut c[1], 7), b"partial");
        assert_eq!(read_n(&mut c[2], 7), b"partial");

        // The departed client is out of the fan-out set.
        c[1].write_all(b"after\n").unwrap();
        assert_eq!(read_n(&mut c[2], 6), b"after\n");
    }

    #[test]
    fn test_reset_drops_partial() {
        let addr = start_relay();
        let mut c = connect(addr, 3);

        c[0].write_all(b"partial").unwrap();
        thread::sleep(SETTLE);
        // Zero linger turns close into a reset, which the server sees as a read error.
        socket2::SockRef::from(&c[0])
            .set_linger(Some(Duration::ZERO))
            .unwrap();
        drop(c.remove(0));
        thread::sleep(SETTLE);

        c[1].write_all(b"next\n").unwrap();
        assert_eq!(read_n(&mut c[0], 5), b"next\n");
        assert_quiet(&mut c[0]);
    }

    #[test]
    fn test_self_exclusion() {
        let addr = start_relay();
        let mut c = connect(addr, 3);

        for (i, msg) in [b"a\n", b"b\n", b"c\n"].iter().enumerate() {
            c[i].write_all(*msg).unwrap();
            thread::sleep(Duration::from_millis(50));
        }

        assert_eq!(read_n(&mut c[0], 4), b"b\nc\n");
        assert_eq!(read_n(&mut c[1], 4), b"a\nc\n");
        assert_eq!(read_n(&mut c[2], 4), b"a\nb\n");
        for client in c.iter_mut() {
            assert_quiet(client);
        }
    }

    #[test]
    fn test_churn_keeps_serving() {
        let addr = start_relay();
        let mut stay = connect(addr, 1).remove(0);

        for _ in 0..5 {
            let mut gone = connect(addr, 1).remove(0);
            gone.write_all(b"bye\n").unwrap();
            assert_eq!(read_n(&mut stay, 4), b"bye\n");
        }

        let mut late = connect(addr, 1).remove(0);
        stay.write_all(b"hello\n").unwrap();
        assert_eq!(read_n(&mut late, 6), b"hello\n");
    }

    #[test]
    fn test_bind_failure_is_bootstrap_error() {
        let err = Reactor::bind(&Config::new("127.0.0.1", "not-a-port")).err().unwrap();
        assert!(matches!(err, BootstrapError::Resolve { .. }));
    }
}
