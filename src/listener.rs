//! Listening socket bootstrap.
//!
//! Resolves the bind address and walks the candidates until one binds,
//! the way `getaddrinfo` + `bind` loops usually do.

use crate::error::BootstrapError;
use std::ffi::CString;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use tracing::debug;

/// Host strings that mean "every interface".
fn is_wildcard(host: &str) -> bool {
    host.is_empty() || host == "*"
}

/// Look a TCP service name (e.g. `http`) up in the system services database.
fn service_port(service: &str) -> Option<u16> {
    let service = CString::new(service).ok()?;
    // SAFETY: an all-zero addrinfo is a valid "no hints" value.
    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_socktype = libc::SOCK_STREAM;
    hints.ai_flags = libc::AI_PASSIVE;

    let mut res: *mut libc::addrinfo = std::ptr::null_mut();
    // SAFETY: `service` is NUL-terminated and outlives the call; `res` is
    // released with freeaddrinfo below.
    let rc = unsafe { libc::getaddrinfo(std::ptr::null(), service.as_ptr(), &hints, &mut res) };
    if rc != 0 || res.is_null() {
        return None;
    }

    // SAFETY: on success `res` points to at least one entry whose `ai_addr`
    // matches its `ai_family`.
    let port = unsafe {
        let info = &*res;
        match info.ai_family {
            libc::AF_INET => {
                let sa = &*(info.ai_addr as *const libc::sockaddr_in);
                Some(u16::from_be(sa.sin_port))
            }
            libc::AF_INET6 => {
                let sa = &*(info.ai_addr as *const libc::sockaddr_in6);
                Some(u16::from_be(sa.sin6_port))
            }
            _ => None,
        }
    };
    // SAFETY: `res` came from a successful getaddrinfo and is freed once.
    unsafe { libc::freeaddrinfo(res) };
    port
}

/// Resolve `host:port` into bind candidates.
///
/// `port` is either a number or a service name such as `http`.
pub fn resolve(host: &str, port: &str) -> Result<Vec<SocketAddr>, BootstrapError> {
    let resolve_err = |reason: String| BootstrapError::Resolve {
        host: host.to_string(),
        port: port.to_string(),
        reason,
    };

    // getaddrinfo truncates out-of-range numeric services, so digits never
    // reach it.
    let port_num: u16 = match port.parse() {
        Ok(num) => num,
        Err(e) if port.bytes().all(|b| b.is_ascii_digit()) => return Err(resolve_err(e.to_string())),
        Err(e) => service_port(port)
            .ok_or_else(|| resolve_err(format!("not a port number or known service ({e})")))?,
    };

    let addrs: Vec<SocketAddr> = if is_wildcard(host) {
        vec![
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port_num)),
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port_num)),
        ]
    } else {
        (host, port_num)
            .to_socket_addrs()
            .map_err(|e| resolve_err(e.to_string()))?
            .collect()
    };

    if addrs.is_empty() {
        return Err(BootstrapError::NoAddress {
            host: host.to_string(),
            port: port.to_string(),
        });
    }
    Ok(addrs)
}

/// Create a blocking listener bound to the first candidate that accepts a bind.
///
/// Each candidate gets its own socket with `SO_REUSEADDR` set. If no socket can
/// be created at all the error is [`BootstrapError::Socket`]; if sockets exist
/// but none binds, it is [`BootstrapError::Bind`] carrying the last failure.
pub fn prepare(host: &str, port: &str, backlog: i32) -> Result<std::net::TcpListener, BootstrapError> {
    let candidates = resolve(host, port)?;

    let mut socket_err = None;
    let mut bind_err = None;
    let mut bound = None;

    for addr in candidates {
        let socket = match socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        ) {
            Ok(socket) => socket,
            Err(e) => {
                debug!(addr = %addr, error = %e, "Socket creation failed");
                socket_err = Some(e);
                continue;
            }
        };

        socket.set_reuse_address(true).map_err(BootstrapError::Socket)?;

        match socket.bind(&addr.into()) {
            Ok(()) => {
                bound = Some(socket);
                break;
            }
            Err(e) => {
                debug!(addr = %addr, error = %e, "Bind failed");
                bind_err = Some(e);
            }
        }
    }

    let socket = match (bound, bind_err, socket_err) {
        (Some(socket), _, _) => socket,
        (None, Some(e), _) => return Err(BootstrapError::Bind(e)),
        (None, None, Some(e)) => return Err(BootstrapError::Socket(e)),
        (None, None, None) => {
            return Err(BootstrapError::NoAddress {
                host: host.to_string(),
                port: port.to_string(),
            })
        }
    };

    socket.listen(backlog).map_err(BootstrapError::Listen)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_wildcard() {
        let addrs = resolve("*", "4000").unwrap();
        assert_eq!(addrs.len(), 2);
        assert!(addrs.iter().all(|a| a.ip().is_unspecified() && a.port() == 4000));

        assert_eq!(resolve("", "4000").unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_literal() {
        let addrs = resolve("127.0.0.1", "8080").unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_resolve_bad_port() {
        assert!(matches!(
            resolve("127.0.0.1", "http-ish"),
            Err(BootstrapError::Resolve { .. })
        ));
        assert!(matches!(
            resolve("127.0.0.1", "70000"),
            Err(BootstrapError::Resolve { .. })
        ));
    }

    #[test]
    fn test_resolve_service_name() {
        // Only meaningful where the services database knows `http`.
        let known = std::fs::read_to_string("/etc/services")
            .map(|db| db.lines().any(|l| l.starts_with("http\t") || l.starts_with("http ")))
            .unwrap_or(false);
        if !known {
            return;
        }
        let addrs = resolve("127.0.0.1", "http").unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:80".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_resolve_unknown_service() {
        let err = resolve("127.0.0.1", "no-such-service-here").unwrap_err();
        assert!(err.to_string().contains("not a port number or known service"));
    }

    #[test]
    fn test_prepare_ephemeral_port() {
        let listener = prepare("127.0.0.1", "0", 10).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);

        // A client can connect straight away thanks to the backlog.
        let _client = std::net::TcpStream::connect(addr).unwrap();
    }

    #[test]
    fn test_prepare_port_in_use() {
        let first = prepare("127.0.0.1", "0", 10).unwrap();
        let port = first.local_addr().unwrap().port().to_string();

        // SO_REUSEADDR does not allow two live listeners on one port.
        let err = prepare("127.0.0.1", &port, 10).unwrap_err();
        assert!(matches!(err, BootstrapError::Bind(_)));
    }
}
