//! Per-server worker pools.
//!
//! # Responsibilities
//! - Own the threads that execute one server's requests
//! - Bound the number of requests processed concurrently
//! - Supply the baseline filters every routing context starts with
//!
//! # Design Decisions
//! - One multi-thread tokio runtime per server, named after the service
//! - Never shared between services; dropped with the server
//! - Shutdown waits a bounded time for in-flight work

pub mod baseline;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ConfigSource, PoolSettings};
use crate::routing::Filter;

pub use baseline::{RequestLogFilter, ThreadPoolFilter};

/// Error type for pool creation.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot create worker threads: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Threads dedicated to one server instance.
pub struct WorkerPool {
    name: String,
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    settings: PoolSettings,
}

impl WorkerPool {
    /// Create the pool for `service_name` from its `http.*Threads` settings.
    pub fn for_service(service_name: &str, config: &dyn ConfigSource) -> Result<Self, PoolError> {
        let settings = PoolSettings::load(service_name, config)?;
        Ok(Self::new(service_name, settings)?)
    }

    pub fn new(service_name: &str, settings: PoolSettings) -> std::io::Result<Self> {
        if settings.min_threads == 0 || settings.max_threads > Semaphore::MAX_PERMITS {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "worker pool needs 1..={} threads, got min {} max {}",
                    Semaphore::MAX_PERMITS,
                    settings.min_threads,
                    settings.max_threads
                ),
            ));
        }
        let thread_prefix = format!("{service_name}-worker");
        let counter = AtomicUsize::new(0);

        let runtime = Builder::new_multi_thread()
            .worker_threads(settings.min_threads)
            .max_blocking_threads(settings.max_threads)
            .thread_keep_alive(settings.thread_idle_time)
            .thread_name_fn(move || {
                let id = counter.fetch_add(1, Ordering::Relaxed);
                format!("{thread_prefix}-{id}")
            })
            .enable_all()
            .build()?;

        tracing::debug!(
            service = service_name,
            worker_threads = settings.min_threads,
            max_concurrent = settings.max_threads,
            "Worker pool created"
        );

        Ok(Self {
            name: service_name.to_string(),
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(settings.max_threads)),
            settings,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    fn runtime(&self) -> &Runtime {
        // Only `shutdown` takes the runtime, and it consumes the pool.
        self.runtime.as_ref().expect("worker pool runtime already shut down")
    }

    /// Handle for spawning onto the pool from elsewhere.
    pub fn handle(&self) -> Handle {
        self.runtime().handle().clone()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime().spawn(future)
    }

    /// Run `future` to completion on the pool, blocking the calling thread.
    ///
    /// Must not be called from a thread that is itself driving a runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime().block_on(future)
    }

    /// Requests that may start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Filters installed ahead of caller filters in every routing context.
    pub fn baseline_filters(&self) -> Vec<Arc<dyn Filter>> {
        vec![
            Arc::new(RequestLogFilter::new(&self.name)),
            Arc::new(ThreadPoolFilter::new(self.permits.clone())),
        ]
    }

    /// Stop admitting requests and tear the threads down.
    pub fn shutdown(mut self, timeout: Duration) {
        self.permits.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);
        }
        tracing::debug!(service = %self.name, "Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.permits.close();
        if let Some(runtime) = self.runtime.take() {
            // Dropping a runtime blocks; never do that on a runtime thread.
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}
