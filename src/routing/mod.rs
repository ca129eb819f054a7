//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! start(service, RouteTable, FilterTable)
//!     → matcher.rs (parse url-patterns)
//!     → context.rs (one RoutingContext per route entry,
//!                   baseline filters + caller filters)
//!     → router.rs (HandlerTree: contexts in creation order)
//!
//! Per dispatch (request / forward / include / async / error):
//!     HandlerTree → first matching context
//!     → FilterChain (baseline, then caller filters matching the path)
//!     → Handler
//! ```
//!
//! # Design Decisions
//! - Contexts are compiled at startup, immutable at runtime
//! - No regex in the hot path
//! - First match wins (creation order)

pub mod context;
pub mod matcher;
pub mod router;

pub use context::{
    filter_fn, handler_fn, DispatchType, Filter, FilterChain, FilterTable, Handler, RouteTable,
    RoutingContext,
};
pub use matcher::{PathSpec, RoutingError};
pub use router::{assemble_handler_tree, DispatchOrigin, Dispatcher, ErrorStatus, HandlerTree};
