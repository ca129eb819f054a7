//! Per-service settings and the keys they are read from.
//!
//! Every key is namespaced by the service name, e.g. `orders.http.port`.
//! All settings are optional; the defaults below apply when a key is absent.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::source::{ConfigError, ConfigSource};

pub const HTTP_HOST: &str = "http.host";
pub const HTTP_PORT: &str = "http.port";
pub const HTTP_IDLE_TIME: &str = "http.connectionIdleTime";
pub const HTTP_BLOCKING: &str = "http.isBlockingChannelConnector";
pub const HTTP_ACCEPTORS: &str = "http.numberOfAcceptors";
pub const HTTP_ACCEPT_QUEUE: &str = "http.acceptQueueSize";
pub const HTTP_HEADER_SIZE: &str = "http.requestHeaderSize";
pub const HTTP_MIN_THREADS: &str = "http.minThreads";
pub const HTTP_MAX_THREADS: &str = "http.maxThreads";
pub const HTTP_THREAD_IDLE_TIME: &str = "http.threadIdleTime";
pub const HTTPS_HOST: &str = "https.host";
pub const HTTPS_PORT: &str = "https.port";
pub const HTTPS_ONLY: &str = "https.useHttpsOnly";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_HTTPS_PORT: u16 = 8090;
pub const DEFAULT_IDLE_TIME_MS: u64 = 180_000;
pub const DEFAULT_MAX_THREADS: usize = 254;
pub const DEFAULT_THREAD_IDLE_TIME_MS: u64 = 60_000;
/// Upper bound for `http.minThreads`; each one is an OS thread spawned at start.
pub const MAX_WORKER_THREADS: usize = 4096;
/// Upper bound for `http.maxThreads`, the largest permit count a semaphore holds.
pub const MAX_CONCURRENT_REQUESTS: usize = Semaphore::MAX_PERMITS;

/// Engine default for the request header size limit, in bytes.
pub const ENGINE_REQUEST_HEADER_SIZE: usize = 6 * 1024;
/// Engine default idle timeout for connectors without explicit tuning.
pub const ENGINE_IDLE_TIME_MS: u64 = 200_000;
/// Listen backlog used when the configured accept queue size is 0.
pub const ENGINE_ACCEPT_QUEUE: u32 = 1024;

/// `<service>.<suffix>`
pub fn service_key(service: &str, suffix: &str) -> String {
    format!("{service}.{suffix}")
}

/// Number of processing units, never less than one.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Plaintext connector settings (`<service>.http.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    pub idle_timeout: Duration,
    pub blocking: bool,
    pub acceptors: usize,
    /// 0 means the engine default backlog.
    pub accept_queue_size: u32,
    pub request_header_size: usize,
}

impl HttpSettings {
    pub fn load(service: &str, config: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let key = |suffix: &str| service_key(service, suffix);

        let acceptors = config.get_i64_or(&key(HTTP_ACCEPTORS), available_cpus() as i64)?;
        let acceptors = if acceptors < 1 {
            tracing::warn!(service, acceptors, "Acceptor count below 1, using 1");
            1
        } else {
            acceptors as usize
        };

        Ok(Self {
            host: config.get_str_or(&key(HTTP_HOST), DEFAULT_HOST),
            port: read_port(config, &key(HTTP_PORT), DEFAULT_HTTP_PORT)?,
            idle_timeout: Duration::from_millis(read_non_negative(
                config,
                &key(HTTP_IDLE_TIME),
                DEFAULT_IDLE_TIME_MS,
            )?),
            blocking: config.get_bool_or(&key(HTTP_BLOCKING), false)?,
            acceptors,
            accept_queue_size: read_non_negative(config, &key(HTTP_ACCEPT_QUEUE), 0)?
                .try_into()
                .map_err(|_| invalid(config, &key(HTTP_ACCEPT_QUEUE), "a 32-bit queue size"))?,
            request_header_size: read_non_negative(
                config,
                &key(HTTP_HEADER_SIZE),
                ENGINE_REQUEST_HEADER_SIZE as u64,
            )? as usize,
        })
    }
}

/// TLS connector settings (`<service>.https.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpsSettings {
    pub host: String,
    pub port: u16,
    pub https_only: bool,
}

impl HttpsSettings {
    pub fn load(service: &str, config: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let key = |suffix: &str| service_key(service, suffix);
        Ok(Self {
            host: config.get_str_or(&key(HTTPS_HOST), DEFAULT_HOST),
            port: read_port(config, &key(HTTPS_PORT), DEFAULT_HTTPS_PORT)?,
            https_only: config.get_bool_or(&key(HTTPS_ONLY), false)?,
        })
    }
}

/// Worker pool sizing (`<service>.http.*Threads`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSettings {
    pub min_threads: usize,
    pub max_threads: usize,
    pub thread_idle_time: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_threads: available_cpus(),
            max_threads: DEFAULT_MAX_THREADS,
            thread_idle_time: Duration::from_millis(DEFAULT_THREAD_IDLE_TIME_MS),
        }
    }
}

impl PoolSettings {
    pub fn load(service: &str, config: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let key = |suffix: &str| service_key(service, suffix);
        let defaults = Self::default();

        let min_threads = read_bounded(
            config,
            &key(HTTP_MIN_THREADS),
            defaults.min_threads.min(MAX_WORKER_THREADS),
            MAX_WORKER_THREADS,
            "a thread count between 0 and 4096",
        )?
        .max(1);
        let max_threads = read_bounded(
            config,
            &key(HTTP_MAX_THREADS),
            defaults.max_threads,
            MAX_CONCURRENT_REQUESTS,
            "a thread count no larger than the semaphore permit limit",
        )?
        .max(1);

        Ok(Self {
            min_threads,
            max_threads: max_threads.max(min_threads),
            thread_idle_time: Duration::from_millis(read_non_negative(
                config,
                &key(HTTP_THREAD_IDLE_TIME),
                DEFAULT_THREAD_IDLE_TIME_MS,
            )?),
        })
    }
}

fn read_non_negative(config: &dyn ConfigSource, key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = config.get_i64_or(key, default as i64)?;
    u64::try_from(value).map_err(|_| invalid(config, key, "a non-negative integer"))
}

fn read_bounded(
    config: &dyn ConfigSource,
    key: &str,
    default: usize,
    max: usize,
    expected: &'static str,
) -> Result<usize, ConfigError> {
    let value = read_non_negative(config, key, default as u64)?;
    usize::try_from(value)
        .ok()
        .filter(|value| *value <= max)
        .ok_or_else(|| invalid(config, key, expected))
}

fn read_port(config: &dyn ConfigSource, key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = config.get_i64_or(key, i64::from(default))?;
    u16::try_from(value).map_err(|_| invalid(config, key, "a port between 0 and 65535"))
}

fn invalid(config: &dyn ConfigSource, key: &str, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: config.get_string(key).unwrap_or_default(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    #[test]
    fn test_http_defaults() {
        let settings = HttpSettings::load("svc", &MapConfig::new()).unwrap();
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.idle_timeout, Duration::from_millis(180_000));
        assert!(!settings.blocking);
        assert_eq!(settings.acceptors, available_cpus());
        assert_eq!(settings.accept_queue_size, 0);
        assert_eq!(settings.request_header_size, ENGINE_REQUEST_HEADER_SIZE);
    }

    #[test]
    fn test_keys_are_namespaced_by_service() {
        let config = MapConfig::new()
            .with("orders.http.port", 9100)
            .with("billing.http.port", 9200);

        assert_eq!(HttpSettings::load("orders", &config).unwrap().port, 9100);
        assert_eq!(HttpSettings::load("billing", &config).unwrap().port, 9200);
        assert_eq!(HttpSettings::load("other", &config).unwrap().port, 8080);
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let config = MapConfig::new().with("svc.http.port", 70_000);
        let err = HttpSettings::load("svc", &config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref value, .. } if value == "70000"));
    }

    #[test]
    fn test_acceptors_clamped() {
        let config = MapConfig::new().with("svc.http.numberOfAcceptors", 0);
        assert_eq!(HttpSettings::load("svc", &config).unwrap().acceptors, 1);
    }

    #[test]
    fn test_https_defaults() {
        let settings = HttpsSettings::load("svc", &MapConfig::new()).unwrap();
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 8090);
        assert!(!settings.https_only);
    }

    #[test]
    fn test_pool_max_never_below_min() {
        let config = MapConfig::new()
            .with("svc.http.minThreads", 8)
            .with("svc.http.maxThreads", 2);
        let settings = PoolSettings::load("svc", &config).unwrap();
        assert_eq!(settings.min_threads, 8);
        assert_eq!(settings.max_threads, 8);
    }

    #[test]
    fn test_pool_thread_counts_are_bounded() {
        let config = MapConfig::new().with("svc.http.maxThreads", i64::MAX);
        let err = PoolSettings::load("svc", &config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "svc.http.maxThreads"));

        let config = MapConfig::new().with("svc.http.minThreads", 1_000_000);
        let err = PoolSettings::load("svc", &config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "svc.http.minThreads"));

        let config = MapConfig::new()
            .with("svc.http.minThreads", MAX_WORKER_THREADS as i64)
            .with("svc.http.maxThreads", MAX_CONCURRENT_REQUESTS as i64);
        let settings = PoolSettings::load("svc", &config).unwrap();
        assert_eq!(settings.max_threads, MAX_CONCURRENT_REQUESTS);
    }
}
