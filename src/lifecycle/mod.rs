//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Registry (registry.rs):
//!     start(name) → reserve → build connectors, pool, tree → engine start
//!     stop(name)  → unregister → engine stop (drain, release pool)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller runs registry.shutdown()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pool and routing, listeners last
//! - Ordered shutdown: stop accepting, drain, release threads
//! - Shutdown has a timeout per server

pub mod registry;
pub mod signals;

pub use registry::{ServerInfo, ServerInstance, ServerRegistry, StartOptions};
pub use signals::{shutdown_signal, wait_for_shutdown_signal};
