//! Filters every routing context starts with.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::observability::metrics;
use crate::routing::{DispatchType, Filter, FilterChain};

/// Logs each dispatch and counts top-level requests.
#[derive(Debug, Clone)]
pub struct RequestLogFilter {
    service: Arc<str>,
}

impl RequestLogFilter {
    pub fn new(service: &str) -> Self {
        Self {
            service: Arc::from(service),
        }
    }
}

impl Filter for RequestLogFilter {
    fn filter(&self, req: Request<Body>, chain: FilterChain) -> BoxFuture<'static, Response> {
        let service = self.service.clone();
        let kind = DispatchType::of(&req);
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        Box::pin(async move {
            let start = Instant::now();
            let response = chain.proceed(req).await;
            let status = response.status().as_u16();

            tracing::debug!(
                service = %service,
                dispatch = %kind,
                method = %method,
                path = %path,
                status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request dispatched"
            );
            if kind == DispatchType::Request {
                metrics::record_request(&service, status);
            }
            response
        })
    }
}

/// Bounds the number of requests in flight to the pool's `maxThreads`.
///
/// Only top-level dispatches take a permit; forwards and includes run under
/// the permit of the request that issued them.
#[derive(Debug, Clone)]
pub struct ThreadPoolFilter {
    permits: Arc<Semaphore>,
}

impl ThreadPoolFilter {
    pub fn new(permits: Arc<Semaphore>) -> Self {
        Self { permits }
    }
}

impl Filter for ThreadPoolFilter {
    fn filter(&self, req: Request<Body>, chain: FilterChain) -> BoxFuture<'static, Response> {
        if DispatchType::of(&req) != DispatchType::Request {
            return chain.proceed(req);
        }

        let permits = self.permits.clone();
        Box::pin(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => chain.proceed(req).await,
                Err(_) => {
                    tracing::debug!(path = %req.uri().path(), "Worker pool closed, rejecting request");
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                }
            }
        })
    }
}
