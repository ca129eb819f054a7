//! Request admission and identification.
//!
//! # Responsibilities
//! - Enforce the connector's request header size limit
//! - Expose the request ID assigned by the engine
//!
//! # Design Decisions
//! - Header size is checked before any routing context sees the request
//! - Size counts the request line plus every `name: value` pair
//! - Request ID (UUID v4) added as early as possible for tracing

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Maximum accepted size of request line plus headers, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLimit(pub usize);

/// Approximate on-the-wire size of the request head.
pub fn request_head_size<B>(req: &Request<B>) -> usize {
    let line = req.method().as_str().len()
        + req.uri().path_and_query().map_or(1, |pq| pq.as_str().len())
        + "HTTP/1.1".len()
        + 4;
    req.headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .fold(line, |total, size| total + size)
}

/// Rejects requests whose head exceeds the limit with 431.
pub async fn limit_request_headers(
    State(limit): State<HeaderLimit>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let size = request_head_size(&req);
    if size > limit.0 {
        tracing::debug!(size, limit = limit.0, path = %req.uri().path(), "Request header too large");
        return StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE.into_response();
    }
    next.run(req).await
}

/// Access to the request ID set by the engine.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;

    /// The request ID, if it is a UUID (always true for engine-assigned IDs).
    fn request_uuid(&self) -> Option<Uuid> {
        self.request_id().and_then(|id| Uuid::parse_str(id).ok())
    }
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }
}
