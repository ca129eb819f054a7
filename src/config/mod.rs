//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, flatten nested tables to dotted keys)
//!     → TomlConfig (implements ConfigSource)
//!     → shared via Arc<dyn ConfigSource> with the ServerRegistry
//!
//! On every start:
//!     schema.rs reads <service>.http.* / <service>.https.*
//!     → HttpSettings / HttpsSettings / PoolSettings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All keys have defaults to allow an empty config
//! - Malformed values fail the start instead of falling back silently

pub mod loader;
pub mod schema;
pub mod source;

pub use loader::{load_config, TomlConfig};
pub use schema::{HttpSettings, HttpsSettings, PoolSettings};
pub use source::{ConfigError, ConfigSource, MapConfig};
