//! Handlers, filters and routing contexts.
//!
//! # Responsibilities
//! - Define the caller-facing `Handler` and `Filter` seams
//! - Hold route and filter tables in insertion order
//! - Run a filter chain in front of a context's handler
//!
//! # Design Decisions
//! - One isolated context per route entry, never merged
//! - A context carries every filter; which ones run is decided per dispatch
//!   by matching the filter pattern against the dispatch target path
//! - Handlers and filters are opaque; they only see axum requests/responses

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::routing::matcher::{PathSpec, RoutingError};

/// Why a request is being routed to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchType {
    /// Initial request from a connector.
    Request,
    Forward,
    Include,
    /// Resumed on the worker pool.
    Async,
    /// Routed to an error handler.
    Error,
}

impl DispatchType {
    pub const ALL: [DispatchType; 5] = [
        DispatchType::Request,
        DispatchType::Forward,
        DispatchType::Include,
        DispatchType::Async,
        DispatchType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchType::Request => "request",
            DispatchType::Forward => "forward",
            DispatchType::Include => "include",
            DispatchType::Async => "async",
            DispatchType::Error => "error",
        }
    }

    /// Dispatch type recorded on a request, `Request` if none.
    pub fn of(req: &Request<Body>) -> Self {
        req.extensions()
            .get::<DispatchType>()
            .copied()
            .unwrap_or(DispatchType::Request)
    }
}

impl fmt::Display for DispatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-processing component bound to a path.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response>;
}

/// Interceptor placed in front of handlers.
///
/// A filter either answers the request itself or passes it on with
/// `chain.proceed(req)`.
pub trait Filter: Send + Sync + 'static {
    fn filter(&self, req: Request<Body>, chain: FilterChain) -> BoxFuture<'static, Response>;
}

/// Adapter returned by [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

/// Build a handler from an async closure.
pub fn handler_fn<F, Fut, R>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    HandlerFn(f)
}

impl<F, Fut, R> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Adapter returned by [`filter_fn`].
#[derive(Clone)]
pub struct FilterFn<F>(F);

/// Build a filter from an async closure.
pub fn filter_fn<F, Fut, R>(f: F) -> FilterFn<F>
where
    F: Fn(Request<Body>, FilterChain) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    FilterFn(f)
}

impl<F, Fut, R> Filter for FilterFn<F>
where
    F: Fn(Request<Body>, FilterChain) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn filter(&self, req: Request<Body>, chain: FilterChain) -> BoxFuture<'static, Response> {
        let fut = (self.0)(req, chain);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// The remaining filters and the handler for one dispatch.
#[derive(Clone)]
pub struct FilterChain {
    filters: Arc<[Arc<dyn Filter>]>,
    position: usize,
    handler: Arc<dyn Handler>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>, handler: Arc<dyn Handler>) -> Self {
        Self {
            filters: filters.into(),
            position: 0,
            handler,
        }
    }

    /// Invoke the next filter, or the handler once all filters ran.
    pub fn proceed(self, req: Request<Body>) -> BoxFuture<'static, Response> {
        match self.filters.get(self.position).cloned() {
            Some(filter) => {
                let next = FilterChain {
                    filters: self.filters,
                    position: self.position + 1,
                    handler: self.handler,
                };
                filter.filter(req, next)
            }
            None => self.handler.handle(req),
        }
    }

    /// Filters not yet invoked.
    pub fn remaining(&self) -> usize {
        self.filters.len() - self.position
    }
}

/// Ordered path → handler entries.
#[derive(Clone, Default)]
pub struct RouteTable {
    entries: Vec<(String, Arc<dyn Handler>)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; the same pattern may appear more than once.
    pub fn route(mut self, pattern: impl Into<String>, handler: impl Handler) -> Self {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        self.entries.push((pattern.into(), handler));
        self
    }

    /// Append an already shared handler.
    pub fn route_arc(mut self, pattern: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.entries.push((pattern.into(), handler));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Handler>)> {
        self.entries.iter().map(|(p, h)| (p.as_str(), h))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(p, _)| p))
            .finish()
    }
}

/// Ordered path → filter entries, attached to every context.
#[derive(Clone, Default)]
pub struct FilterTable {
    entries: Vec<(String, Arc<dyn Filter>)>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, pattern: impl Into<String>, filter: impl Filter) -> Self {
        let filter: Arc<dyn Filter> = Arc::new(filter);
        self.entries.push((pattern.into(), filter));
        self
    }

    pub fn filter_arc(mut self, pattern: impl Into<String>, filter: Arc<dyn Filter>) -> Self {
        self.entries.push((pattern.into(), filter));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Filter>)> {
        self.entries.iter().map(|(p, f)| (p.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FilterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(p, _)| p))
            .finish()
    }
}

/// A filter bound to the pattern it was registered under.
#[derive(Clone)]
pub(crate) struct FilterMapping {
    pub(crate) spec: PathSpec,
    pub(crate) filter: Arc<dyn Filter>,
}

impl FilterMapping {
    pub(crate) fn parse(pattern: &str, filter: Arc<dyn Filter>) -> Result<Self, RoutingError> {
        Ok(Self {
            spec: PathSpec::parse(pattern)?,
            filter,
        })
    }
}

/// An isolated unit: one handler plus the filters attached to it.
pub struct RoutingContext {
    spec: PathSpec,
    handler: Arc<dyn Handler>,
    /// Baseline filters; run on every dispatch, in order.
    baseline: Vec<Arc<dyn Filter>>,
    /// Caller filters; run when their pattern matches the target path.
    filters: Vec<FilterMapping>,
}

impl RoutingContext {
    pub(crate) fn new(
        spec: PathSpec,
        handler: Arc<dyn Handler>,
        baseline: Vec<Arc<dyn Filter>>,
        filters: Vec<FilterMapping>,
    ) -> Self {
        Self {
            spec,
            handler,
            baseline,
            filters,
        }
    }

    pub fn spec(&self) -> &PathSpec {
        &self.spec
    }

    pub fn matches(&self, path: &str) -> bool {
        self.spec.matches(path)
    }

    /// Filter chain for a dispatch to `path`.
    pub fn chain_for(&self, path: &str) -> FilterChain {
        let filters = self
            .baseline
            .iter()
            .cloned()
            .chain(
                self.filters
                    .iter()
                    .filter(|m| m.spec.matches(path))
                    .map(|m| m.filter.clone()),
            )
            .collect();
        FilterChain::new(filters, self.handler.clone())
    }

    pub fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response> {
        let chain = self.chain_for(req.uri().path());
        chain.proceed(req)
    }
}

impl fmt::Debug for RoutingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingContext")
            .field("spec", &self.spec)
            .field("baseline_filters", &self.baseline.len())
            .field(
                "filters",
                &self.filters.iter().map(|m| m.spec.to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
