//! One TLS-terminated HTTP/1.1 conversation with keep-alive.
//!
//! The session drives: handshake under a deadline, a hyper http1
//! read/dispatch/write loop, a recurring deadline check, and a bounded
//! graceful close. Any error path falls through to the close sequence.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use super::router::Router;
use crate::handlers::{error_response, Request, Response};
use crate::logging::ACCESS_TARGET;

pub(crate) const TIMEOUT_READ_WRITE: Duration = Duration::from_secs(30);
pub(crate) const TIMEOUT_HANDSHAKE: Duration = Duration::from_secs(30);
pub(crate) const TIMEOUT_SHUTDOWN: Duration = Duration::from_secs(5);

/// Per-session deadline, re-armed at each phase transition. A dedicated
/// checker in the session loop closes the connection once it expires.
#[derive(Clone)]
struct SessionDeadline(Arc<Mutex<Instant>>);

impl SessionDeadline {
    fn new(timeout: Duration) -> Self {
        Self(Arc::new(Mutex::new(Instant::now() + timeout)))
    }

    fn arm(&self, timeout: Duration) {
        *self.lock() = Instant::now() + timeout;
    }

    fn instant(&self) -> Instant {
        *self.lock()
    }

    fn expired(&self) -> bool {
        *self.lock() <= Instant::now()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct Session {
    socket: TcpStream,
    remote_addr: SocketAddr,
    acceptor: TlsAcceptor,
    router: Arc<Router>,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    pub fn new(
        socket: TcpStream,
        remote_addr: SocketAddr,
        acceptor: TlsAcceptor,
        router: Arc<Router>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            socket,
            remote_addr,
            acceptor,
            router,
            shutdown,
        }
    }

    pub async fn run(self) {
        let Session {
            socket,
            remote_addr,
            acceptor,
            router,
            mut shutdown,
        } = self;

        let tls_stream = match tokio::time::timeout(TIMEOUT_HANDSHAKE, acceptor.accept(socket)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("TLS handshake failed for {}: {}", remote_addr, e);
                return;
            }
            Err(_) => {
                debug!("TLS handshake timed out for {}", remote_addr);
                return;
            }
        };

        debug!("TLS handshake completed for client: {}", remote_addr.ip());

        let deadline = SessionDeadline::new(TIMEOUT_READ_WRITE);
        let service_deadline = deadline.clone();
        let service = service_fn(move |request: hyper::Request<Incoming>| {
            let router = router.clone();
            let deadline = service_deadline.clone();
            async move {
                Ok::<_, Infallible>(dispatch(router, request, remote_addr, deadline).await)
            }
        });

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(TIMEOUT_READ_WRITE)
            .keep_alive(true);

        let conn = builder.serve_connection(TokioIo::new(tls_stream), service);
        tokio::pin!(conn);

        // Drive the connection while the deadline checker and the server
        // shutdown signal can both interrupt it.
        loop {
            let wake_at = deadline.instant();

            tokio::select! {
                result = conn.as_mut() => {
                    match result {
                        Ok(()) => debug!("Session closed for client: {}", remote_addr.ip()),
                        Err(e) if e.is_incomplete_message() => {
                            debug!("Client {} closed mid-message", remote_addr.ip());
                        }
                        Err(e) => error!("Connection error from {}: {}", remote_addr, e),
                    }
                    return;
                }
                _ = tokio::time::sleep_until(wake_at) => {
                    if deadline.expired() {
                        debug!("Session timeout for client: {}", remote_addr.ip());
                        break;
                    }
                    // The deadline moved while we slept; keep waiting.
                }
                _ = shutdown.changed() => break,
            }
        }

        // Best-effort close: finish in-flight writes, then give the TLS
        // close_notify a bounded window.
        conn.as_mut().graceful_shutdown();
        match tokio::time::timeout(TIMEOUT_SHUTDOWN, conn.as_mut()).await {
            Ok(Ok(())) | Ok(Err(_)) => {}
            Err(_) => debug!("Session shutdown deadline expired for {}", remote_addr),
        }

        debug!("Session closed for client: {}", remote_addr.ip());
    }
}

/// Read one request body, route it, and produce the response, re-arming
/// the session deadline around each phase.
async fn dispatch(
    router: Arc<Router>,
    request: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    deadline: SessionDeadline,
) -> Response {
    deadline.arm(TIMEOUT_READ_WRITE);

    let (parts, body) = request.into_parts();
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    info!(
        target: ACCESS_TARGET,
        "{} - - [{}] \"{} {} {:?}\"",
        remote_addr.ip(),
        Utc::now().timestamp(),
        parts.method,
        target,
        parts.version,
    );

    let body = match tokio::time::timeout(TIMEOUT_READ_WRITE, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) => {
            error!("Read error from {}: {}", remote_addr, e);
            return internal_error();
        }
        Err(_) => {
            debug!("Body read timed out for {}", remote_addr);
            return internal_error();
        }
    };

    let request = Request {
        method: parts.method,
        target,
        headers: parts.headers,
        body,
    };

    let response = match router.find_handler(&request.target) {
        Some(handler) => handler.handle(&request).await,
        None => router.handle_not_found(&request.target),
    };

    info!(
        target: ACCESS_TARGET,
        "{} {} {}",
        remote_addr.ip(),
        response.status().as_u16(),
        response_size(&response),
    );

    // Covers the write phase and the keep-alive window until the next
    // request head arrives.
    deadline.arm(TIMEOUT_READ_WRITE);

    response
}

fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Internal server error",
    )
}

fn response_size(response: &Response) -> u64 {
    use hyper::body::Body;

    response.body().size_hint().exact().unwrap_or(0)
}
