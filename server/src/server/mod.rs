//! Server orchestrator: wires the pool, JWT manager, router and listener
//! together and owns the lifecycle.

mod listener;
mod router;
mod session;
mod tls;

pub use router::Router;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use db_pool::StorePool;
use jwt_security::JwtManager;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::handlers::{AuthHandlers, MessageHandlers, UserHandlers};
use listener::Listener;

const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub struct Server {
    addr: SocketAddr,
    tls_config: Arc<rustls::ServerConfig>,
    router: Arc<Router>,
    shutdown_tx: watch::Sender<bool>,
    active_sessions: Arc<AtomicUsize>,
    is_running: AtomicBool,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Assemble TLS material, the route table and the listener address.
    /// The pool and JWT manager are shared into every handler.
    pub fn new(
        config: &Config,
        pool: Arc<StorePool>,
        jwt: Arc<JwtManager>,
    ) -> AppResult<Self> {
        let tls_config = tls::build_tls_config(&config.ssl)?;

        let router = Arc::new(Router::new());
        register_routes(&router, &jwt, &pool)?;
        info!(
            "Router initialized with {} routes",
            router.registered_paths().len()
        );

        let addr: SocketAddr = format!("{}:{}", config.server.address, config.server.port)
            .parse()
            .map_err(|e| {
                AppError::StartServer(format!(
                    "invalid server address {}:{}: {e}",
                    config.server.address, config.server.port
                ))
            })?;

        let (shutdown_tx, _) = watch::channel(false);

        info!("Server instance created");

        Ok(Self {
            addr,
            tls_config,
            router,
            shutdown_tx,
            active_sessions: Arc::new(AtomicUsize::new(0)),
            is_running: AtomicBool::new(false),
            listener_task: Mutex::new(None),
        })
    }

    /// Bind and begin accepting. Idempotent: a running server stays
    /// running.
    pub fn start(&self) -> AppResult<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Server is already running");
            return Ok(());
        }

        info!("Starting server...");

        let listener = Listener::new(
            self.addr,
            self.tls_config.clone(),
            self.router.clone(),
            self.shutdown_tx.subscribe(),
            self.active_sessions.clone(),
        );

        let tcp = match listener.bind() {
            Ok(tcp) => tcp,
            Err(e) => {
                self.is_running.store(false, Ordering::SeqCst);
                error!("Failed to start server: {}", e);
                return Err(e);
            }
        };

        let task = tokio::spawn(listener.run(tcp));
        *self.lock_listener_task() = Some(task);

        info!("Server started successfully on {}", self.addr);
        Ok(())
    }

    /// Stop accepting, signal every session to close, and wait out the
    /// graceful window. Idempotent.
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            warn!("Server is already stopped");
            return;
        }

        info!("Stopping server...");
        info!("Stopping listener...");
        let _ = self.shutdown_tx.send(true);

        info!("Waiting for active connections to complete...");
        let graceful = self.wait_for_drain().await;

        if !graceful {
            warn!("Graceful shutdown timeout exceeded, forcing shutdown");
        }

        if let Some(task) = self.lock_listener_task().take() {
            task.abort();
        }

        info!(
            "Server shutdown completed {}",
            if graceful { "gracefully" } else { "forcefully" }
        );
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Poll the live-session count every second up to the graceful
    /// ceiling.
    async fn wait_for_drain(&self) -> bool {
        let start = Instant::now();

        while start.elapsed() < GRACEFUL_SHUTDOWN_TIMEOUT {
            let active = self.active_sessions.load(Ordering::SeqCst);
            if active == 0 {
                debug!("All sessions drained");
                return true;
            }

            tokio::time::sleep(SHUTDOWN_CHECK_INTERVAL).await;
            debug!(
                "Waiting for shutdown... {}s elapsed, {} sessions active",
                start.elapsed().as_secs(),
                active
            );
        }

        false
    }

    fn lock_listener_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.listener_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn register_routes(
    router: &Arc<Router>,
    jwt: &Arc<JwtManager>,
    pool: &Arc<StorePool>,
) -> AppResult<()> {
    let auth = Arc::new(AuthHandlers::new(jwt.clone(), pool.clone()));
    for path in [
        "/api/v1/auth/register",
        "/api/v1/auth/login",
        "/api/v1/auth/refresh",
        "/api/v1/auth/logout",
        "/api/v1/auth/password",
        "/api/v1/auth/account",
    ] {
        router.register_handler(path, auth.clone())?;
    }

    let users = Arc::new(UserHandlers::new(jwt.clone(), pool.clone()));
    for path in ["/api/v1/users", "/api/v1/users/search"] {
        router.register_handler(path, users.clone())?;
    }

    let messages = Arc::new(MessageHandlers::new(jwt.clone(), pool.clone()));
    for path in [
        "/api/v1/messages",
        "/api/v1/messages/send",
        "/api/v1/messages/read",
    ] {
        router.register_handler(path, messages.clone())?;
    }

    Ok(())
}
