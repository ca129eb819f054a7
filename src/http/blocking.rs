//! Blocking-channel transport.
//!
//! Each acceptor is a dedicated OS thread parked in `accept(2)` on a
//! blocking listener. Accepted connections are handed to the worker pool and
//! served as HTTP/1.1. The idle timeout bounds reading each request head,
//! as on the non-blocking transport.
//!
//! Stopping shuts the listening socket down for reading, which fails every
//! parked `accept` at once. Where the platform does not support that, one
//! wake-up connection per thread is made instead.

use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use socket2::SockRef;
use tokio::runtime::Handle;
use tower::ServiceExt;

use crate::http::engine::EngineError;
use crate::net::connectable_addr;

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// The acceptor threads of one blocking connector.
pub(crate) struct BlockingAcceptors {
    local_addr: SocketAddr,
    /// Extra handle on the shared socket, kept for shutting it down.
    socket: TcpListener,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl BlockingAcceptors {
    /// Spawn one thread per listener handle. All handles share one socket.
    pub(crate) fn spawn(
        service_name: &str,
        listeners: Vec<TcpListener>,
        app: Router,
        idle_timeout: Duration,
        runtime: Handle,
    ) -> Result<Self, EngineError> {
        let (local_addr, socket) = match listeners.first() {
            Some(listener) => (listener.local_addr()?, listener.try_clone()?),
            None => return Err(EngineError::NotConfigured("acceptors")),
        };
        let mut acceptors = Self {
            local_addr,
            socket,
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Vec::with_capacity(listeners.len()),
        };

        for (index, listener) in listeners.into_iter().enumerate() {
            let app = app.clone();
            let runtime = runtime.clone();
            let flag = acceptors.shutdown.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("{service_name}-acceptor-{index}"))
                .spawn(move || accept_loop(listener, app, idle_timeout, runtime, flag));
            match spawned {
                Ok(thread) => acceptors.threads.push(thread),
                Err(err) => {
                    let _ = acceptors.stop();
                    return Err(err.into());
                }
            }
        }
        Ok(acceptors)
    }

    /// Stop accepting and join every thread. Open connections stay with the
    /// worker pool.
    pub(crate) fn stop(self) -> Result<(), EngineError> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Err(err) = SockRef::from(&self.socket).shutdown(Shutdown::Read) {
            tracing::debug!(address = %self.local_addr, error = %err, "Listener shutdown unsupported, waking acceptors");
            // One wake-up connection per thread; each thread exits after one accept.
            let target = connectable_addr(self.local_addr);
            for _ in &self.threads {
                if let Err(err) = TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
                    tracing::warn!(address = %target, error = %err, "Cannot wake acceptor");
                }
            }
        }

        let mut result = Ok(());
        for thread in self.threads {
            if thread.join().is_err() {
                result = Err(EngineError::Task(format!("acceptor on {} panicked", self.local_addr)));
            }
        }
        result
    }
}

fn accept_loop(
    listener: TcpListener,
    app: Router,
    idle_timeout: Duration,
    runtime: Handle,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        let accepted = listener.accept();
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match accepted {
            Ok((stream, peer)) => {
                runtime.spawn(serve_connection(stream, peer, app.clone(), idle_timeout));
            }
            Err(err) => {
                tracing::warn!(error = %err, "Accept failed");
                std::thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    tracing::debug!(
        thread = std::thread::current().name().unwrap_or("acceptor"),
        "Acceptor stopped"
    );
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, app: Router, idle_timeout: Duration) {
    let stream = match stream
        .set_nonblocking(true)
        .and_then(|()| tokio::net::TcpStream::from_std(stream))
    {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(peer = %peer, error = %err, "Cannot register connection");
            return;
        }
    };

    let service = hyper::service::service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(req)
    });

    let mut builder = http1::Builder::new();
    builder.timer(TokioTimer::new()).header_read_timeout(idle_timeout);
    if let Err(err) = builder.serve_connection(TokioIo::new(stream), service).await {
        tracing::debug!(peer = %peer, error = %err, "Connection closed with error");
    }
}
