//! The axum engine.
//!
//! # Responsibilities
//! - Build the axum app that fronts the handler tree
//! - Wire up middleware (tracing, request ID, header limit)
//! - Bind every connector and serve it on the worker pool
//! - Stop gracefully and release the pool
//!
//! # Design Decisions
//! - Sockets are bound before `start` returns; serving runs in pool tasks
//! - Non-blocking connectors are served by axum-server (rustls for TLS)
//! - Blocking connectors get dedicated acceptor threads (see `blocking.rs`)
//! - A failed start tears down whatever it already started
//! - `connectionIdleTime` bounds how long a connection may take to deliver a
//!   request head, including idle keep-alive gaps between requests. A
//!   request stalled mid-body or a client that stops reading a response is
//!   left to the handler and to the stop timeout.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, middleware, Router};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::task::JoinHandle;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::blocking::BlockingAcceptors;
use crate::http::engine::{Engine, EngineError, EngineFactory};
use crate::http::request::{limit_request_headers, HeaderLimit};
use crate::net::{load_server_config, BoundListener, ConnectorSpec, Transport};
use crate::pool::WorkerPool;
use crate::routing::{DispatchType, HandlerTree};

/// Grace period for in-flight requests when stopping.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine built on axum, axum-server and hyper.
pub struct AxumEngine {
    service_name: String,
    connectors: Vec<ConnectorSpec>,
    handler: Option<HandlerTree>,
    pool: Option<WorkerPool>,
    stop_timeout: Duration,
    running: Option<Running>,
}

/// Everything a started engine must tear down.
struct Running {
    handle: axum_server::Handle,
    tasks: Vec<JoinHandle<io::Result<()>>>,
    acceptors: Vec<BlockingAcceptors>,
    local_addrs: Vec<SocketAddr>,
}

impl AxumEngine {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            connectors: Vec::new(),
            handler: None,
            pool: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            running: None,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }
}

impl Engine for AxumEngine {
    fn set_connectors(&mut self, connectors: Vec<ConnectorSpec>) {
        self.connectors = connectors;
    }

    fn set_handler(&mut self, handler: HandlerTree) {
        self.handler = Some(handler);
    }

    fn set_worker_pool(&mut self, pool: WorkerPool) {
        self.pool = Some(pool);
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.running.is_some() {
            return Err(EngineError::AlreadyStarted);
        }
        let pool = self.pool.as_ref().ok_or(EngineError::NotConfigured("worker pool"))?;
        let tree = self.handler.as_ref().ok_or(EngineError::NotConfigured("handler"))?;
        if self.connectors.is_empty() {
            return Err(EngineError::NotConfigured("connectors"));
        }

        let runtime = pool.handle();
        let _enter = runtime.enter();

        let mut running = Running {
            handle: axum_server::Handle::new(),
            tasks: Vec::new(),
            acceptors: Vec::new(),
            local_addrs: Vec::new(),
        };
        for spec in &self.connectors {
            if let Err(err) = start_connector(&self.service_name, spec, tree, pool, &mut running) {
                tracing::error!(
                    service = %self.service_name,
                    protocol = %spec.protocol,
                    port = spec.port,
                    error = %err,
                    "Connector failed to start"
                );
                if let Err(cleanup) = running.shutdown(pool, self.stop_timeout) {
                    tracing::warn!(service = %self.service_name, error = %cleanup, "Cleanup after failed start");
                }
                return Err(err);
            }
        }

        self.running = Some(running);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let pool = self.pool.take().ok_or(EngineError::NotConfigured("worker pool"))?;

        let result = running.shutdown(&pool, self.stop_timeout);
        pool.shutdown(self.stop_timeout);
        tracing::debug!(service = %self.service_name, "Engine stopped");
        result
    }

    fn local_addrs(&self) -> Vec<SocketAddr> {
        self.running
            .as_ref()
            .map(|r| r.local_addrs.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for AxumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxumEngine")
            .field("service_name", &self.service_name)
            .field("connectors", &self.connectors)
            .field("started", &self.running.is_some())
            .finish()
    }
}

/// Creates an `AxumEngine` per start.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxumEngineFactory;

impl EngineFactory for AxumEngineFactory {
    fn create(&self, service_name: &str) -> Box<dyn Engine> {
        Box::new(AxumEngine::new(service_name))
    }
}

/// Build the axum app for one connector.
fn build_app(tree: HandlerTree, spec: &ConnectorSpec) -> Router {
    Router::new()
        .fallback(move |req: Request<Body>| tree.dispatch(req, DispatchType::Request))
        .layer(middleware::from_fn_with_state(
            HeaderLimit(spec.request_header_size),
            limit_request_headers,
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn tune(builder: &mut auto::Builder<TokioExecutor>, idle_timeout: Duration) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(idle_timeout);
}

fn start_connector(
    service_name: &str,
    spec: &ConnectorSpec,
    tree: &HandlerTree,
    pool: &WorkerPool,
    running: &mut Running,
) -> Result<(), EngineError> {
    let app = build_app(tree.clone(), spec);

    // Load key material before binding.
    let tls = match &spec.tls {
        Some(settings) => Some(RustlsConfig::from_config(Arc::new(load_server_config(settings)?))),
        None => None,
    };

    let bound = BoundListener::bind(spec)?;
    let local_addr = bound.local_addr();
    running.local_addrs.push(local_addr);

    if spec.transport == Transport::Blocking && tls.is_none() {
        let acceptors = BlockingAcceptors::spawn(
            service_name,
            bound.into_acceptors(),
            app,
            spec.idle_timeout,
            pool.handle(),
        )?;
        running.acceptors.push(acceptors);
    } else {
        if spec.transport == Transport::Blocking {
            tracing::warn!(port = spec.port, "TLS connectors always use the non-blocking transport");
        }
        for listener in bound.into_acceptors() {
            let make_service = app.clone().into_make_service_with_connect_info::<SocketAddr>();
            let task = match &tls {
                Some(config) => {
                    let mut server = axum_server::tls_rustls::from_tcp_rustls(listener, config.clone())
                        .handle(running.handle.clone());
                    tune(server.http_builder(), spec.idle_timeout);
                    pool.spawn(server.serve(make_service))
                }
                None => {
                    let mut server = axum_server::from_tcp(listener).handle(running.handle.clone());
                    tune(server.http_builder(), spec.idle_timeout);
                    pool.spawn(server.serve(make_service))
                }
            };
            running.tasks.push(task);
        }
    }

    tracing::info!(
        service = %service_name,
        protocol = %spec.protocol,
        address = %local_addr,
        client_auth = spec.requires_client_auth(),
        "Connector serving"
    );
    Ok(())
}

impl Running {
    /// Stop accepting, wait up to `timeout` for open connections, then
    /// collect task outcomes. Reports the first failure.
    fn shutdown(self, pool: &WorkerPool, timeout: Duration) -> Result<(), EngineError> {
        let mut failure = None;

        self.handle.graceful_shutdown(Some(timeout));
        for acceptor in self.acceptors {
            if let Err(err) = acceptor.stop() {
                failure.get_or_insert(err);
            }
        }

        let tasks = self.tasks;
        let joined = pool.block_on(async move {
            tokio::time::timeout(timeout * 2, futures_util::future::join_all(tasks)).await
        });
        match joined {
            Ok(outcomes) => {
                for outcome in outcomes {
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            failure.get_or_insert(EngineError::Io(err));
                        }
                        Err(err) => {
                            failure.get_or_insert(EngineError::Task(err.to_string()));
                        }
                    }
                }
            }
            Err(_) => {
                failure.get_or_insert(EngineError::Task("connections did not drain in time".into()));
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
