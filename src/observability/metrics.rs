//! Metrics collection.
//!
//! # Responsibilities
//! - Define server lifecycle and request metrics
//! - Keep metric names in one place
//!
//! # Metrics
//! - `http_server_starts_total` (counter): successful starts by service
//! - `http_server_start_failures_total` (counter): failed starts by service
//! - `http_server_stops_total` (counter): stops by service
//! - `http_servers_running` (gauge): servers currently registered as running
//! - `http_requests_total` (counter): top-level requests by service, status
//!
//! # Design Decisions
//! - Recording only; installing an exporter is left to the embedding
//!   application (no recorder means every call is a no-op)

pub fn record_server_started(service: &str) {
    ::metrics::counter!("http_server_starts_total", "service" => service.to_string()).increment(1);
}

pub fn record_start_failed(service: &str) {
    ::metrics::counter!("http_server_start_failures_total", "service" => service.to_string())
        .increment(1);
}

pub fn record_server_stopped(service: &str) {
    ::metrics::counter!("http_server_stops_total", "service" => service.to_string()).increment(1);
}

pub fn set_running(count: usize) {
    ::metrics::gauge!("http_servers_running").set(count as f64);
}

pub fn record_request(service: &str, status: u16) {
    ::metrics::counter!(
        "http_requests_total",
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
