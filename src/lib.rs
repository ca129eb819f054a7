//! Lifecycle registry for named HTTP(S) servers.
//!
//! An application starts any number of independently configured servers,
//! each under a unique service name, and stops them by name:
//!
//! ```text
//! ServerRegistry::start(name, StartOptions { routes, filters, tls })
//!     → net (connectors from <name>.http.* / <name>.https.*, TLS policy)
//!     → pool (dedicated worker threads, baseline filters)
//!     → routing (one context per route, filters on every context)
//!     → http (engine binds and serves)
//!
//! ServerRegistry::stop(name)
//!     → engine drains and releases its pool
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod routing;

pub use config::{ConfigError, ConfigSource, MapConfig, TomlConfig};
pub use error::{ServerError, StartCause};
pub use http::{AxumEngine, Engine, EngineError, EngineFactory};
pub use lifecycle::{ServerInfo, ServerRegistry, StartOptions};
pub use net::{ConnectorSpec, TlsMaterial};
pub use pool::WorkerPool;
pub use routing::{
    filter_fn, handler_fn, DispatchType, Dispatcher, Filter, FilterChain, FilterTable, Handler,
    RouteTable,
};
