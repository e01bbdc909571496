use std::sync::Arc;

use db_pool::StorePool;
use jwt_security::JwtManager;
use tokio::time::Duration;
use tracing::{error, info, warn};

use nova_chat_server::cli::Cli;
use nova_chat_server::config::Config;
use nova_chat_server::logging;
use nova_chat_server::server::Server;

const BLACKLIST_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn main() {
    let cli = Cli::parse_args();
    println!("Using configuration file: {}", cli.config_path().display());

    let config = match Config::load(cli.config_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Worker count drives the runtime directly; each worker cooperatively
    // drives connection tasks.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(config));
    std::process::exit(exit_code);
}

async fn run(config: Config) -> i32 {
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return 1;
    }

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        error!("Failed to install rustls crypto provider");
        eprintln!("Failed to install rustls crypto provider");
        return 1;
    }

    let pool = match StorePool::connect(&config.pool_config()).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            error!("Failed to initialize store pool: {}", e);
            eprintln!("Failed to initialize store pool: {e}");
            return 1;
        }
    };

    if pool.health().await {
        info!("Database connection successful");
    } else {
        warn!("Database health check failed");
    }

    let jwt = match JwtManager::new(
        &config.jwt.secret_key,
        config.jwt.access_token_expiry_minutes,
        config.jwt.refresh_token_expiry_days,
    ) {
        Ok(jwt) => Arc::new(jwt),
        Err(e) => {
            error!("Failed to initialize JWT manager: {}", e);
            eprintln!("Failed to initialize JWT manager: {e}");
            return 1;
        }
    };

    // Periodic sweep of the in-process revocation set.
    let sweeper = jwt.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(BLACKLIST_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.sweep();
        }
    });

    let server = match Server::new(&config, pool.clone(), jwt) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {}", e);
            eprintln!("Failed to create server: {e}");
            return 1;
        }
    };

    if let Err(e) = server.start() {
        error!("Failed to start server: {}", e);
        eprintln!("Failed to start server: {e}");
        return 1;
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    server.stop().await;
    pool.close().await;

    0
}
