//! Errors reported by the server registry.

use thiserror::Error;

use crate::config::ConfigError;
use crate::http::EngineError;
use crate::pool::PoolError;
use crate::routing::RoutingError;

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A server with this name is running or being started.
    #[error("server {0:?} is already running")]
    AlreadyRunning(String),

    #[error("failed to start server {service:?}: {cause}")]
    Start {
        service: String,
        #[source]
        cause: StartCause,
    },

    /// Only ever logged; `stop` does not return it.
    #[error("failed to stop server {service:?}: {source}")]
    Stop {
        service: String,
        #[source]
        source: EngineError,
    },
}

/// What went wrong while starting a server.
#[derive(Debug, Error)]
pub enum StartCause {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid routing: {0}")]
    Routing(#[from] RoutingError),

    #[error("worker pool: {0}")]
    Pool(#[from] PoolError),

    #[error("engine: {0}")]
    Engine(#[from] EngineError),
}

impl ServerError {
    pub fn is_already_running(&self) -> bool {
        matches!(self, ServerError::AlreadyRunning(_))
    }

    /// Start failed because an address could not be resolved or bound.
    pub fn is_bind_failure(&self) -> bool {
        matches!(
            self,
            ServerError::Start { cause: StartCause::Engine(err), .. } if err.is_bind_failure()
        )
    }

    /// Start failed because TLS material could not be loaded.
    pub fn is_tls_failure(&self) -> bool {
        matches!(
            self,
            ServerError::Start { cause: StartCause::Engine(err), .. } if err.is_tls_failure()
        )
    }

    /// Name of the service the error concerns.
    pub fn service(&self) -> &str {
        match self {
            ServerError::AlreadyRunning(service)
            | ServerError::Start { service, .. }
            | ServerError::Stop { service, .. } => service,
        }
    }
}
