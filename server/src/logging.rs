//! Tracing subscriber wiring: console plus two file sinks.
//!
//! Access lines are emitted under the [`ACCESS_TARGET`] target and routed
//! to their own file; everything else goes to the error log (and the
//! console when enabled). Each file writer sits behind its own mutex.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::LoggingConfig;
use crate::error::AppError;

/// Event target for HTTP access-log lines.
pub const ACCESS_TARGET: &str = "access";

/// Map a configured level name onto a tracing directive. `warning` and
/// `fatal` are the config vocabulary; tracing spells them `warn` and has
/// no level above `error`.
pub fn parse_level(level: &str) -> Result<&'static str, AppError> {
    match level {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warning" => Ok("warn"),
        "error" => Ok("error"),
        "fatal" => Ok("error"),
        other => Err(AppError::Config(format!(
            "logging.level must be one of trace, debug, info, warning, error, fatal (got {other})"
        ))),
    }
}

/// Install the global subscriber. May only succeed once per process.
pub fn init(config: &LoggingConfig) -> Result<(), AppError> {
    let level = parse_level(&config.level)?;

    let error_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.error_log)
        .map_err(|e| {
            AppError::Config(format!(
                "cannot open error log {}: {e}",
                config.error_log.display()
            ))
        })?;

    let access_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.access_log)
        .map_err(|e| {
            AppError::Config(format!(
                "cannot open access log {}: {e}",
                config.access_log.display()
            ))
        })?;

    let error_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(error_file))
        .with_filter(env_filter(level))
        .with_filter(filter_fn(|meta| meta.target() != ACCESS_TARGET));

    let log_access = config.log_access;
    let access_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_level(false)
        .with_writer(Mutex::new(access_file))
        .with_filter(filter_fn(move |meta| {
            log_access && meta.target() == ACCESS_TARGET
        }));

    let console_layer = config.console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_filter(env_filter(level))
            .with_filter(filter_fn(|meta| meta.target() != ACCESS_TARGET))
    });

    tracing_subscriber::registry()
        .with(error_layer)
        .with(access_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("failed to initialize logging: {e}")))
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
