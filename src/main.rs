//! Demo server host.
//!
//! Starts one server per `--service`, each configured from its own
//! `<service>.http.*` / `<service>.https.*` keys, and stops them all on
//! Ctrl+C / SIGTERM.
//!
//! ```text
//! http-server-factory --config servers.toml --service api --service admin
//! ```
//!
//! Every service answers:
//! - `GET /health`  → `{"status":"ok","service":...}`
//! - `ANY /echo/*`  → method, path, request ID and body as JSON

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    Json,
};
use clap::Parser;
use serde_json::json;

use http_server_factory::{
    config::{load_config, ConfigSource, MapConfig},
    filter_fn, handler_fn,
    http::RequestIdExt,
    lifecycle::wait_for_shutdown_signal,
    observability::logging,
    FilterChain, FilterTable, RouteTable, ServerRegistry, StartOptions, TlsMaterial,
};

const ECHO_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Parser)]
#[command(name = "http-server-factory")]
#[command(about = "Run named HTTP(S) servers from one configuration file", long_about = None)]
struct Cli {
    /// TOML configuration; all defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service to start (repeatable)
    #[arg(short, long = "service", default_value = "default")]
    services: Vec<String>,

    /// PEM key store (certificate chain + private key) enabling HTTPS
    #[arg(long)]
    key_store: Option<String>,

    #[arg(long, env = "KEY_STORE_PASSWORD", default_value = "")]
    key_store_password: String,

    /// PEM CA bundle; requires client certificates when set
    #[arg(long)]
    trust_store: Option<String>,

    #[arg(long, env = "TRUST_STORE_PASSWORD", default_value = "")]
    trust_store_password: String,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    tracing::info!("http-server-factory v{} starting", env!("CARGO_PKG_VERSION"));

    let config: Arc<dyn ConfigSource> = match &cli.config {
        Some(path) => {
            let config = load_config(path)?;
            tracing::info!(path = %path.display(), keys = config.len(), "Configuration loaded");
            Arc::new(config)
        }
        None => Arc::new(MapConfig::new()),
    };

    let tls = TlsMaterial::new(cli.key_store.clone().unwrap_or_default(), &cli.key_store_password)
        .with_trust_store(cli.trust_store.clone().unwrap_or_default(), &cli.trust_store_password);

    let registry = ServerRegistry::new(config);
    for service in &cli.services {
        let options = StartOptions::new(routes(service))
            .with_filters(filters(service))
            .with_tls(tls.clone());
        registry.start(service, options)?;

        if let Some(info) = registry.info(service) {
            tracing::info!(service = %service, info = %serde_json::to_string(&info)?, "Serving");
        }
    }

    wait_for_shutdown_signal()?;
    registry.shutdown();

    tracing::info!("Shutdown complete");
    Ok(())
}

fn routes(service: &str) -> RouteTable {
    let name = service.to_string();
    RouteTable::new()
        .route("/health", handler_fn(move |_req| {
            let name = name.clone();
            async move { Json(json!({ "status": "ok", "service": name })) }
        }))
        .route("/echo/*", handler_fn(|req: Request<Body>| async move {
            let method = req.method().to_string();
            let path = req.uri().path().to_string();
            let request_id = req.request_id().map(str::to_owned);
            let body = axum::body::to_bytes(req.into_body(), ECHO_BODY_LIMIT)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            Json(json!({
                "method": method,
                "path": path,
                "request_id": request_id,
                "body": body,
            }))
        }))
}

/// Tags every response with the service that produced it.
fn filters(service: &str) -> FilterTable {
    let tag = HeaderValue::from_str(service).unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    FilterTable::new().filter("/*", filter_fn(move |req: Request<Body>, chain: FilterChain| {
        let tag = tag.clone();
        async move {
            let mut response = chain.proceed(req).await;
            response.headers_mut().insert("x-served-by", tag);
            response
        }
    }))
}
