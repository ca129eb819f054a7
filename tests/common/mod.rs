//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_server_factory::{
    handler_fn, MapConfig, RouteTable, ServerRegistry, TlsMaterial,
};
use tempfile::NamedTempFile;

/// Config binding `services` to loopback on ephemeral ports.
pub fn local_config(services: &[&str]) -> MapConfig {
    let mut config = MapConfig::new();
    for service in services {
        config.set(format!("{service}.http.host"), "127.0.0.1");
        config.set(format!("{service}.http.port"), 0);
        config.set(format!("{service}.https.host"), "127.0.0.1");
        config.set(format!("{service}.https.port"), 0);
        config.set(format!("{service}.http.minThreads"), 2);
        config.set(format!("{service}.http.numberOfAcceptors"), 1);
    }
    config
}

pub fn registry(config: MapConfig) -> ServerRegistry {
    ServerRegistry::new(Arc::new(config))
}

/// Routes answering `/hello` with `text` and everything else with 404.
pub fn hello_routes(text: &'static str) -> RouteTable {
    RouteTable::new().route("/hello", handler_fn(move |_req| async move { text }))
}

pub fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Client that accepts self-signed server certificates.
pub fn insecure_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}

pub fn url(scheme: &str, addr: SocketAddr, path: &str) -> String {
    format!("{scheme}://{addr}{path}")
}

/// First bound address of a running service.
pub fn addr_of(registry: &ServerRegistry, service: &str) -> SocketAddr {
    registry.info(service).expect("service should be running").local_addrs[0]
}

/// GET `path` over plain HTTP and return status and body.
pub fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    let response = client().get(url("http", addr, path)).send().unwrap();
    let status = response.status().as_u16();
    (status, response.text().unwrap())
}

/// Self-signed key store and a trust store holding the same certificate.
pub struct TestCerts {
    pub key_store: NamedTempFile,
    pub trust_store: NamedTempFile,
}

impl TestCerts {
    pub fn generate() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ])
        .unwrap();

        let mut key_store = NamedTempFile::new().unwrap();
        write!(
            key_store,
            "{}{}",
            certified.cert.pem(),
            certified.key_pair.serialize_pem()
        )
        .unwrap();

        let mut trust_store = NamedTempFile::new().unwrap();
        write!(trust_store, "{}", certified.cert.pem()).unwrap();

        Self {
            key_store,
            trust_store,
        }
    }

    pub fn key_store_path(&self) -> String {
        self.key_store.path().display().to_string()
    }

    pub fn trust_store_path(&self) -> String {
        self.trust_store.path().display().to_string()
    }

    pub fn material(&self) -> TlsMaterial {
        TlsMaterial::new(self.key_store_path(), "changeit")
    }

    pub fn material_with_client_auth(&self) -> TlsMaterial {
        self.material()
            .with_trust_store(self.trust_store_path(), "changeit")
    }
}
