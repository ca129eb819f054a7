//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! start(service, ..., TlsMaterial)
//!     → tls.rs (TLS policy: disabled / enabled, client auth)
//!     → connector.rs (ConnectorSpec per protocol)
//!     → engine start:
//!         listener.rs (bind socket, backlog, acceptor clones)
//!         tls.rs (rustls ServerConfig from key/trust stores)
//! ```
//!
//! # Design Decisions
//! - Connector specs are plain data; binding is the engine's job
//! - TLS material is only read when the engine starts

pub mod connector;
pub mod listener;
pub mod tls;

pub use connector::{build_connectors, ConnectorSpec, Protocol, Transport};
pub use listener::{connectable_addr, BoundListener, ListenerError};
pub use tls::{load_server_config, ClientAuth, TlsError, TlsMaterial, TlsPolicy, TlsSettings};
