//! Named server registry.
//!
//! # Responsibilities
//! - Start a server under a unique name, at most one instance per name
//! - Stop a server by name and release everything it owns
//! - Report which servers are running and where they listen
//!
//! # Design Decisions
//! - Explicit object, not a process-wide singleton; inject one per application
//! - A name is reserved atomically before the slow build, so concurrent
//!   starts of the same name cannot both succeed
//! - Different names never wait on each other
//! - A name stays taken until its engine has stopped
//! - Stop failures are logged, never returned; the name is freed regardless
//!
//! # Data Flow
//! ```text
//! start(name, options)
//!     → reserve slot (Starting)
//!     → build_connectors → WorkerPool::for_service → assemble_handler_tree
//!     → EngineFactory::create → set_* → Engine::start
//!     → slot becomes Running(ServerInstance)   | reservation released on error
//!
//! stop(name)
//!     → Running slot becomes Stopping → Engine::stop (drain, pool shutdown)
//!     → Stopping slot removed
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::ConfigSource;
use crate::error::{ServerError, StartCause};
use crate::http::{AxumEngineFactory, Engine, EngineFactory};
use crate::net::{build_connectors, ConnectorSpec, TlsMaterial};
use crate::observability::metrics;
use crate::pool::WorkerPool;
use crate::routing::{assemble_handler_tree, FilterTable, RouteTable};

/// What to serve and how to secure it.
#[derive(Clone, Default)]
pub struct StartOptions {
    pub routes: RouteTable,
    pub filters: FilterTable,
    pub tls: TlsMaterial,
}

impl StartOptions {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: FilterTable) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = tls;
        self
    }
}

impl std::fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartOptions")
            .field("routes", &self.routes)
            .field("filters", &self.filters)
            .field("tls", &self.tls)
            .finish()
    }
}

/// A started server.
pub struct ServerInstance {
    service_name: String,
    connectors: Vec<ConnectorSpec>,
    local_addrs: Vec<SocketAddr>,
    engine: Box<dyn Engine>,
    started_at: Instant,
}

impl ServerInstance {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn connectors(&self) -> &[ConnectorSpec] {
        &self.connectors
    }

    fn info(&self) -> ServerInfo {
        ServerInfo {
            service_name: self.service_name.clone(),
            connectors: self.connectors.clone(),
            local_addrs: self.local_addrs.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Snapshot of a running server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub service_name: String,
    pub connectors: Vec<ConnectorSpec>,
    /// Bound addresses, in connector order.
    pub local_addrs: Vec<SocketAddr>,
    pub uptime_secs: u64,
}

enum Slot {
    /// Name reserved by an in-progress start.
    Starting,
    Running(ServerInstance),
    /// Engine taken out for stopping; the name is not free yet.
    Stopping,
}

/// Registry of running HTTP(S) servers, keyed by service name.
///
/// `start` and `stop` block the calling thread while sockets are bound or
/// drained. Do not call them, or drop the registry, from inside an async
/// runtime.
pub struct ServerRegistry {
    servers: DashMap<String, Slot>,
    config: Arc<dyn ConfigSource>,
    engines: Arc<dyn EngineFactory>,
}

impl ServerRegistry {
    /// Registry serving with the axum engine.
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self::with_engine_factory(config, Arc::new(AxumEngineFactory))
    }

    pub fn with_engine_factory(config: Arc<dyn ConfigSource>, engines: Arc<dyn EngineFactory>) -> Self {
        Self {
            servers: DashMap::new(),
            config,
            engines,
        }
    }

    /// Start a server named `service_name`.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] if the name is taken, and
    /// with [`ServerError::Start`] if anything goes wrong while building or
    /// starting; in both cases the registry is left as it was.
    pub fn start(&self, service_name: &str, options: StartOptions) -> Result<(), ServerError> {
        match self.servers.entry(service_name.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!(service = %service_name, "Server already running");
                return Err(ServerError::AlreadyRunning(service_name.to_string()));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Starting);
            }
        }
        let _reservation = Reservation {
            servers: &self.servers,
            name: service_name,
            held: |slot| matches!(slot, Slot::Starting),
        };

        match self.launch(service_name, options) {
            Ok(instance) => {
                let ports: Vec<u16> = instance.local_addrs.iter().map(SocketAddr::port).collect();
                self.servers
                    .insert(service_name.to_string(), Slot::Running(instance));

                tracing::info!(service = %service_name, ports = ?ports, "Server started");
                metrics::record_server_started(service_name);
                metrics::set_running(self.running_count());
                Ok(())
            }
            Err(cause) => {
                let err = ServerError::Start {
                    service: service_name.to_string(),
                    cause,
                };
                tracing::error!(service = %service_name, error = %err, "Server failed to start");
                metrics::record_start_failed(service_name);
                Err(err)
            }
        }
    }

    fn launch(&self, service_name: &str, options: StartOptions) -> Result<ServerInstance, StartCause> {
        let config = self.config.as_ref();
        let connectors = build_connectors(service_name, config, &options.tls)?;
        let pool = WorkerPool::for_service(service_name, config)?;
        let tree = assemble_handler_tree(&options.routes, &options.filters, &pool)?;

        let mut engine = self.engines.create(service_name);
        engine.set_connectors(connectors.clone());
        engine.set_handler(tree);
        engine.set_worker_pool(pool);
        engine.start()?;

        Ok(ServerInstance {
            service_name: service_name.to_string(),
            connectors,
            local_addrs: engine.local_addrs(),
            engine,
            started_at: Instant::now(),
        })
    }

    /// Stop the server named `service_name`, if running.
    ///
    /// The name stays taken while the engine drains, so a concurrent `start`
    /// of it fails with [`ServerError::AlreadyRunning`]. It is free again once
    /// this returns, even if the engine failed to stop cleanly.
    pub fn stop(&self, service_name: &str) {
        let taken = self.servers.get_mut(service_name).and_then(|mut slot| {
            match std::mem::replace(slot.value_mut(), Slot::Stopping) {
                Slot::Running(instance) => Some(instance),
                other => {
                    *slot.value_mut() = other;
                    None
                }
            }
        });
        let Some(mut instance) = taken else {
            tracing::debug!(service = %service_name, "Stop requested for server that is not running");
            return;
        };
        let _reservation = Reservation {
            servers: &self.servers,
            name: service_name,
            held: |slot| matches!(slot, Slot::Stopping),
        };
        metrics::set_running(self.running_count());

        match instance.engine.stop() {
            Ok(()) => tracing::info!(service = %service_name, "Server stopped"),
            Err(source) => {
                let err = ServerError::Stop {
                    service: service_name.to_string(),
                    source,
                };
                tracing::error!(service = %service_name, error = %err, "Server did not stop cleanly");
            }
        }
        metrics::record_server_stopped(service_name);
    }

    pub fn is_running(&self, service_name: &str) -> bool {
        matches!(
            self.servers.get(service_name).as_deref(),
            Some(Slot::Running(_))
        )
    }

    /// Names of running servers, sorted.
    pub fn running_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .servers
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Running(_)))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn info(&self, service_name: &str) -> Option<ServerInfo> {
        match self.servers.get(service_name).as_deref() {
            Some(Slot::Running(instance)) => Some(instance.info()),
            _ => None,
        }
    }

    /// Stop every running server.
    pub fn shutdown(&self) {
        let names = self.running_services();
        if !names.is_empty() {
            tracing::info!(count = names.len(), "Stopping all servers");
        }
        for name in names {
            self.stop(&name);
        }
    }

    fn running_count(&self) -> usize {
        self.servers
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Running(_)))
            .count()
    }
}

impl Drop for ServerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("running", &self.running_services())
            .finish()
    }
}

/// Releases a transitional slot when a start or stop ends, however it ends.
struct Reservation<'a> {
    servers: &'a DashMap<String, Slot>,
    name: &'a str,
    /// Matches the slot this guard owns; any other slot is left alone.
    held: fn(&Slot) -> bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.servers.remove_if(self.name, |_, slot| (self.held)(slot));
    }
}
