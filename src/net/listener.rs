//! Listener socket setup.
//!
//! # Responsibilities
//! - Resolve the connector's host/port
//! - Bind with SO_REUSEADDR and the configured listen backlog
//! - Hand out one listener clone per acceptor
//!
//! # Design Decisions
//! - Binding happens synchronously inside `start`, so bind failures are
//!   reported to the caller instead of surfacing later in a background task
//! - Must run inside the worker pool's runtime context

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use thiserror::Error;
use tokio::net::TcpSocket;

use crate::net::connector::{ConnectorSpec, Transport};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host could not be resolved to a socket address.
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A bound listening socket and the acceptor handles sharing it.
#[derive(Debug)]
pub struct BoundListener {
    local_addr: SocketAddr,
    listeners: Vec<TcpListener>,
}

impl BoundListener {
    /// Bind the connector's endpoint.
    pub fn bind(spec: &ConnectorSpec) -> Result<Self, ListenerError> {
        let addr = resolve(&spec.host, spec.port)?;
        let bind_err = |source| ListenerError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;

        let listener = socket
            .listen(spec.backlog())
            .and_then(|l| l.into_std())
            .map_err(bind_err)?;
        listener
            .set_nonblocking(spec.transport == Transport::NonBlocking)
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let mut listeners = Vec::with_capacity(spec.acceptors);
        for _ in 1..spec.acceptors {
            listeners.push(listener.try_clone().map_err(bind_err)?);
        }
        listeners.push(listener);

        tracing::info!(
            protocol = %spec.protocol,
            address = %local_addr,
            acceptors = spec.acceptors,
            backlog = spec.backlog(),
            transport = ?spec.transport,
            "Listener bound"
        );

        Ok(Self {
            local_addr,
            listeners,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// One listener handle per acceptor.
    pub fn into_acceptors(self) -> Vec<TcpListener> {
        self.listeners
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let resolve_err = |source| ListenerError::Resolve {
        host: host.to_string(),
        port,
        source,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(resolve_err)?
        .next()
        .ok_or_else(|| {
            resolve_err(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no address",
            ))
        })
}

/// Address a client on this host can use to reach `local_addr`.
pub fn connectable_addr(local_addr: SocketAddr) -> SocketAddr {
    let mut addr = local_addr;
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into()),
            SocketAddr::V6(_) => addr.set_ip(std::net::Ipv6Addr::LOCALHOST.into()),
        }
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpSettings, MapConfig};

    fn spec(port: u16, acceptors: usize) -> ConnectorSpec {
        let config = MapConfig::new()
            .with("t.http.host", "127.0.0.1")
            .with("t.http.port", port)
            .with("t.http.numberOfAcceptors", acceptors);
        ConnectorSpec::plaintext(&HttpSettings::load("t", &config).unwrap())
    }

    #[test]
    fn test_bind_ephemeral_port_with_acceptors() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();

        let bound = BoundListener::bind(&spec(0, 3)).unwrap();
        assert_ne!(bound.local_addr().port(), 0);
        assert_eq!(bound.into_acceptors().len(), 3);
    }

    #[test]
    fn test_bind_conflict() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();

        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let err = BoundListener::bind(&spec(port, 1)).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[test]
    fn test_connectable_addr() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(connectable_addr(addr), "127.0.0.1:8080".parse().unwrap());
        let addr: SocketAddr = "10.1.2.3:8080".parse().unwrap();
        assert_eq!(connectable_addr(addr), addr);
    }
}
