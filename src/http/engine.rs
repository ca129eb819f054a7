//! The engine seam.
//!
//! An engine owns sockets, TLS handshakes and HTTP parsing for one server
//! instance. The registry only configures, starts and stops it.

use std::net::SocketAddr;

use thiserror::Error;

use crate::net::{ConnectorSpec, ListenerError, TlsError};
use crate::pool::WorkerPool;
use crate::routing::HandlerTree;

/// Error type for engine start/stop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required part was not set before `start`.
    #[error("engine not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("engine already started")]
    AlreadyStarted,

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serving task or acceptor thread ended abnormally.
    #[error("server task failed: {0}")]
    Task(String),
}

impl EngineError {
    pub fn is_bind_failure(&self) -> bool {
        matches!(self, EngineError::Listener(_))
    }

    pub fn is_tls_failure(&self) -> bool {
        matches!(self, EngineError::Tls(_))
    }
}

/// A configurable, startable, stoppable HTTP server engine.
pub trait Engine: Send + Sync {
    fn set_connectors(&mut self, connectors: Vec<ConnectorSpec>);
    fn set_handler(&mut self, handler: HandlerTree);
    fn set_worker_pool(&mut self, pool: WorkerPool);

    /// Bind every connector and begin serving.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stop accepting, drain, and release the worker pool.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Addresses actually bound, in connector order. Empty unless started.
    fn local_addrs(&self) -> Vec<SocketAddr> {
        Vec::new()
    }
}

/// Creates a fresh engine for every start.
pub trait EngineFactory: Send + Sync {
    fn create(&self, service_name: &str) -> Box<dyn Engine>;
}

impl<F> EngineFactory for F
where
    F: Fn(&str) -> Box<dyn Engine> + Send + Sync,
{
    fn create(&self, service_name: &str) -> Box<dyn Engine> {
        self(service_name)
    }
}
