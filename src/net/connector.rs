//! Connector assembly.
//!
//! # Responsibilities
//! - Read the plaintext connector tuning for a service
//! - Apply the TLS policy to the caller's key material
//! - Produce the connector set handed to the engine
//!
//! # Design Decisions
//! - Exactly one plaintext and/or one TLS connector, never zero
//! - Pure: only configuration reads, nothing is bound here
//! - The TLS connector only exposes host/port; the rest uses engine defaults

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::schema::{
    ENGINE_ACCEPT_QUEUE, ENGINE_IDLE_TIME_MS, ENGINE_REQUEST_HEADER_SIZE,
};
use crate::config::{ConfigError, ConfigSource, HttpSettings, HttpsSettings};
use crate::net::tls::{TlsMaterial, TlsPolicy, TlsSettings};

/// Wire protocol of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// How a connector accepts connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Dedicated acceptor threads blocked in `accept(2)`; HTTP/1.1 only.
    Blocking,
    /// Accept loops on the worker pool's event loop; HTTP/1.1 and HTTP/2.
    NonBlocking,
}

/// A configured listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorSpec {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub idle_timeout: Duration,
    pub acceptors: usize,
    /// 0 means the engine default backlog.
    pub accept_queue_size: u32,
    pub request_header_size: usize,
    pub transport: Transport,
    pub tls: Option<TlsSettings>,
}

impl ConnectorSpec {
    /// Plaintext connector from the service's `http.*` settings.
    pub fn plaintext(settings: &HttpSettings) -> Self {
        Self {
            protocol: Protocol::Http,
            host: settings.host.clone(),
            port: settings.port,
            idle_timeout: settings.idle_timeout,
            acceptors: settings.acceptors,
            accept_queue_size: settings.accept_queue_size,
            request_header_size: settings.request_header_size,
            transport: if settings.blocking {
                Transport::Blocking
            } else {
                Transport::NonBlocking
            },
            tls: None,
        }
    }

    /// TLS connector; only host and port come from configuration.
    pub fn secure(settings: &HttpsSettings, tls: TlsSettings) -> Self {
        Self {
            protocol: Protocol::Https,
            host: settings.host.clone(),
            port: settings.port,
            idle_timeout: Duration::from_millis(ENGINE_IDLE_TIME_MS),
            acceptors: 1,
            accept_queue_size: 0,
            request_header_size: ENGINE_REQUEST_HEADER_SIZE,
            transport: Transport::NonBlocking,
            tls: Some(tls),
        }
    }

    /// Listen backlog to request from the OS.
    pub fn backlog(&self) -> u32 {
        if self.accept_queue_size == 0 {
            ENGINE_ACCEPT_QUEUE
        } else {
            self.accept_queue_size
        }
    }

    pub fn requires_client_auth(&self) -> bool {
        self.tls.as_ref().is_some_and(TlsSettings::requires_client_auth)
    }
}

/// Build the connector set for one start of `service_name`.
pub fn build_connectors(
    service_name: &str,
    config: &dyn ConfigSource,
    tls: &TlsMaterial,
) -> Result<Vec<ConnectorSpec>, ConfigError> {
    let plaintext = ConnectorSpec::plaintext(&HttpSettings::load(service_name, config)?);

    let connectors = match TlsPolicy::evaluate(tls) {
        TlsPolicy::Disabled => vec![plaintext],
        TlsPolicy::Enabled(tls_settings) => {
            let https = HttpsSettings::load(service_name, config)?;
            let secure = ConnectorSpec::secure(&https, tls_settings);
            if https.https_only {
                vec![secure]
            } else {
                vec![plaintext, secure]
            }
        }
    };

    tracing::debug!(
        service = service_name,
        connectors = ?connectors.iter().map(|c| format!("{}://{}:{}", c.protocol, c.host, c.port)).collect::<Vec<_>>(),
        "Connectors assembled"
    );
    Ok(connectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    fn count(connectors: &[ConnectorSpec], protocol: Protocol) -> usize {
        connectors.iter().filter(|c| c.protocol == protocol).count()
    }

    #[test]
    fn test_no_key_store_gives_plaintext_only() {
        let connectors = build_connectors("svc", &MapConfig::new(), &TlsMaterial::default()).unwrap();
        assert_eq!(count(&connectors, Protocol::Http), 1);
        assert_eq!(count(&connectors, Protocol::Https), 0);
    }

    #[test]
    fn test_https_only() {
        let config = MapConfig::new().with("svc.https.useHttpsOnly", true);
        let connectors =
            build_connectors("svc", &config, &TlsMaterial::new("ks.pem", "secret")).unwrap();
        assert_eq!(count(&connectors, Protocol::Http), 0);
        assert_eq!(count(&connectors, Protocol::Https), 1);
    }

    #[test]
    fn test_https_only_without_tls_keeps_plaintext() {
        let config = MapConfig::new().with("svc.https.useHttpsOnly", true);
        let connectors = build_connectors("svc", &config, &TlsMaterial::default()).unwrap();
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors[0].protocol, Protocol::Http);
    }

    #[test]
    fn test_dual_connectors_with_client_auth() {
        let material = TlsMaterial::new("ks.pem", "secret").with_trust_store("ts.pem", "secret");
        let connectors = build_connectors("svc", &MapConfig::new(), &material).unwrap();

        assert_eq!(connectors.len(), 2);
        assert_eq!(connectors[0].protocol, Protocol::Http);
        assert!(!connectors[0].requires_client_auth());
        assert_eq!(connectors[1].protocol, Protocol::Https);
        assert!(connectors[1].requires_client_auth());
    }

    #[test]
    fn test_plaintext_tuning_is_applied() {
        let config = MapConfig::new()
            .with("svc.http.host", "127.0.0.1")
            .with("svc.http.port", 9001)
            .with("svc.http.connectionIdleTime", 5000)
            .with("svc.http.isBlockingChannelConnector", true)
            .with("svc.http.numberOfAcceptors", 3)
            .with("svc.http.acceptQueueSize", 64)
            .with("svc.http.requestHeaderSize", 16384);

        let connectors = build_connectors("svc", &config, &TlsMaterial::default()).unwrap();
        let http = &connectors[0];
        assert_eq!(http.host, "127.0.0.1");
        assert_eq!(http.port, 9001);
        assert_eq!(http.idle_timeout, Duration::from_millis(5000));
        assert_eq!(http.transport, Transport::Blocking);
        assert_eq!(http.acceptors, 3);
        assert_eq!(http.backlog(), 64);
        assert_eq!(http.request_header_size, 16384);
    }

    #[test]
    fn test_https_host_and_port() {
        let config = MapConfig::new()
            .with("svc.https.host", "127.0.0.1")
            .with("svc.https.port", 9443);
        let connectors =
            build_connectors("svc", &config, &TlsMaterial::new("ks.pem", "secret")).unwrap();
        let https = &connectors[1];
        assert_eq!(https.host, "127.0.0.1");
        assert_eq!(https.port, 9443);
        assert_eq!(https.transport, Transport::NonBlocking);
        assert_eq!(https.backlog(), ENGINE_ACCEPT_QUEUE);
    }

    #[test]
    fn test_invalid_value_fails() {
        let config = MapConfig::new().with("svc.http.numberOfAcceptors", "many");
        assert!(build_connectors("svc", &config, &TlsMaterial::default()).is_err());
    }

    #[test]
    fn test_serialized_spec_hides_passwords() {
        let material = TlsMaterial::new("ks.pem", "hunter2").with_trust_store("ts.pem", "hunter3");
        let connectors = build_connectors("svc", &MapConfig::new(), &material).unwrap();
        let json = serde_json::to_string(&connectors).unwrap();
        assert!(json.contains("ks.pem"));
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("hunter3"));
    }
}
