//! Handler tree and re-dispatch.
//!
//! # Responsibilities
//! - Aggregate routing contexts into one composite handler tree
//! - Route each dispatch to the first matching context
//! - Let handlers forward / include / resume async / error-dispatch
//!   requests back through the tree
//!
//! # Design Decisions
//! - Immutable after assembly (shared via Arc, no locks)
//! - First match wins, in context creation order
//! - Explicit 404 when no context matches
//! - Every re-dispatch runs the full filter chain of its target

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tokio::runtime::Handle;

use crate::pool::WorkerPool;
use crate::routing::context::{
    DispatchType, Filter, FilterMapping, FilterTable, RouteTable, RoutingContext,
};
use crate::routing::matcher::{PathSpec, RoutingError};

/// URI of the request that started a forward/include/async/error dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOrigin(pub Uri);

/// Status that triggered an error dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorStatus(pub StatusCode);

/// Composite of all routing contexts of one server.
#[derive(Clone)]
pub struct HandlerTree {
    inner: Arc<TreeInner>,
}

struct TreeInner {
    contexts: Vec<RoutingContext>,
    runtime: Handle,
}

/// Build the handler tree of a server from its tables and worker pool.
///
/// Every context receives the pool's baseline filters before the caller's
/// filters.
pub fn assemble_handler_tree(
    routes: &RouteTable,
    filters: &FilterTable,
    pool: &WorkerPool,
) -> Result<HandlerTree, RoutingError> {
    HandlerTree::assemble(routes, filters, pool.baseline_filters(), pool.handle())
}

impl HandlerTree {
    /// Build a tree from explicit baseline filters and a runtime for async
    /// dispatches.
    pub fn assemble(
        routes: &RouteTable,
        filters: &FilterTable,
        baseline: Vec<Arc<dyn Filter>>,
        runtime: Handle,
    ) -> Result<Self, RoutingError> {
        let mappings = filters
            .iter()
            .map(|(pattern, filter)| FilterMapping::parse(pattern, filter.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let contexts = routes
            .iter()
            .map(|(pattern, handler)| {
                Ok(RoutingContext::new(
                    PathSpec::parse(pattern)?,
                    handler.clone(),
                    baseline.clone(),
                    mappings.clone(),
                ))
            })
            .collect::<Result<Vec<_>, RoutingError>>()?;

        if contexts.is_empty() {
            tracing::warn!("Handler tree has no routes; every request will get 404");
        }

        Ok(Self {
            inner: Arc::new(TreeInner { contexts, runtime }),
        })
    }

    pub fn contexts(&self) -> &[RoutingContext] {
        &self.inner.contexts
    }

    /// Route `req` to the first context matching its path.
    pub fn dispatch(&self, mut req: Request<Body>, kind: DispatchType) -> BoxFuture<'static, Response> {
        req.extensions_mut().insert(kind);
        req.extensions_mut().insert(Dispatcher { tree: self.clone() });

        let path = req.uri().path();
        match self.inner.contexts.iter().find(|c| c.matches(path)) {
            Some(context) => context.handle(req),
            None => {
                tracing::debug!(path = %path, dispatch = %kind, "No context matched");
                Box::pin(async { StatusCode::NOT_FOUND.into_response() })
            }
        }
    }
}

impl std::fmt::Debug for HandlerTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTree")
            .field("contexts", &self.inner.contexts)
            .finish()
    }
}

/// Re-dispatches requests through the tree that is serving them.
///
/// Available on every dispatched request: `Dispatcher::from_request(&req)`.
#[derive(Clone)]
pub struct Dispatcher {
    tree: HandlerTree,
}

impl Dispatcher {
    pub fn from_request(req: &Request<Body>) -> Option<Dispatcher> {
        req.extensions().get::<Dispatcher>().cloned()
    }

    /// Hand `req` over to the resource at `path`.
    pub async fn forward(&self, path: &str, req: Request<Body>) -> Response {
        self.redispatch(path, req, DispatchType::Forward).await
    }

    /// Render the resource at `path`; the caller decides how to combine it.
    pub async fn include(&self, path: &str, req: Request<Body>) -> Response {
        self.redispatch(path, req, DispatchType::Include).await
    }

    /// Continue processing of `req` at `path` on the worker pool.
    pub async fn dispatch_async(&self, path: &str, req: Request<Body>) -> Response {
        let req = match retarget(path, req) {
            Ok(req) => req,
            Err(response) => return response,
        };
        let dispatch = self.tree.dispatch(req, DispatchType::Async);
        match self.tree.inner.runtime.spawn(dispatch).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(path, error = %err, "Async dispatch did not complete");
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        }
    }

    /// Let the error handler at `path` render `status`.
    pub async fn error(&self, status: StatusCode, path: &str, mut req: Request<Body>) -> Response {
        req.extensions_mut().insert(ErrorStatus(status));
        let mut response = self.redispatch(path, req, DispatchType::Error).await;
        *response.status_mut() = status;
        response
    }

    async fn redispatch(&self, path: &str, req: Request<Body>, kind: DispatchType) -> Response {
        match retarget(path, req) {
            Ok(req) => self.tree.dispatch(req, kind).await,
            Err(response) => response,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Point `req` at `path` (which may carry a query), remembering the
/// original URI.
fn retarget(path: &str, mut req: Request<Body>) -> Result<Request<Body>, Response> {
    let uri: Uri = match path.parse() {
        Ok(uri) if path.starts_with('/') => uri,
        _ => {
            tracing::error!(path, "Invalid dispatch target");
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    if req.extensions().get::<DispatchOrigin>().is_none() {
        let origin = DispatchOrigin(req.uri().clone());
        req.extensions_mut().insert(origin);
    }
    *req.uri_mut() = uri;
    Ok(req)
}
