//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry, engines, baseline filters produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges via the metrics facade)
//!
//! Consumers:
//!     → whatever subscriber / recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Structured fields, never formatted strings, for service names and addresses
//! - Request ID (x-request-id) set by the engine and propagated to responses
//! - Metrics are cheap (no-op without a recorder)

pub mod logging;
pub mod metrics;
