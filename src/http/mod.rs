//! HTTP engine subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum-server / blocking acceptor, HTTP/1.1 + HTTP/2)
//!     → request.rs (request ID, header size limit)
//!     → HandlerTree::dispatch(DispatchType::Request)
//!     → routing context filter chain → handler
//!     → response (x-request-id propagated)
//! ```

pub mod blocking;
pub mod engine;
pub mod request;
pub mod server;

pub use engine::{Engine, EngineError, EngineFactory};
pub use request::{HeaderLimit, RequestIdExt, X_REQUEST_ID};
pub use server::{AxumEngine, AxumEngineFactory, DEFAULT_STOP_TIMEOUT};
