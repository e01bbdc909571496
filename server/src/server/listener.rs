//! TCP accept loop feeding TLS sessions.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use super::router::Router;
use super::session::Session;
use crate::error::AppError;

const LISTEN_BACKLOG: u32 = 1024;

pub struct Listener {
    addr: SocketAddr,
    acceptor: TlsAcceptor,
    router: Arc<Router>,
    shutdown: watch::Receiver<bool>,
    active_sessions: Arc<AtomicUsize>,
}

impl Listener {
    pub fn new(
        addr: SocketAddr,
        tls_config: Arc<rustls::ServerConfig>,
        router: Arc<Router>,
        shutdown: watch::Receiver<bool>,
        active_sessions: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            addr,
            acceptor: TlsAcceptor::from(tls_config),
            router,
            shutdown,
            active_sessions,
        }
    }

    /// Bind the listening socket with `SO_REUSEADDR` and the full backlog.
    pub fn bind(&self) -> Result<TcpListener, AppError> {
        let socket = if self.addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| AppError::StartServer(format!("failed to open acceptor: {e}")))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| AppError::StartServer(format!("failed to set reuse address: {e}")))?;

        socket
            .bind(self.addr)
            .map_err(|e| AppError::StartServer(format!("failed to bind to {}: {e}", self.addr)))?;

        let listener = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| AppError::StartServer(format!("failed to listen: {e}")))?;

        info!("Listener created on {}", self.addr);
        Ok(listener)
    }

    /// Accept until the shutdown signal flips. Each connection runs as its
    /// own session task and is counted while alive.
    pub async fn run(mut self, listener: TcpListener) {
        info!("Starting listener...");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("Listener stopped");
                    return;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, remote_addr)) => {
                            debug!("New connection accepted from: {}", remote_addr.ip());

                            let session = Session::new(
                                socket,
                                remote_addr,
                                self.acceptor.clone(),
                                self.router.clone(),
                                self.shutdown.clone(),
                            );

                            let counter = self.active_sessions.clone();
                            counter.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(async move {
                                session.run().await;
                                counter.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
            }
        }
    }
}
