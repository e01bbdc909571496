//! The server's JSON configuration document.
//!
//! A single file with `server`, `ssl`, `database`, `jwt` and `logging`
//! sections; every key is required. Loading fails with a message naming
//! the offending key.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use db_pool::PoolConfig;
use serde::Deserialize;

use crate::error::AppError;

const MIN_PORT: u16 = 1;
const MAX_PORT: u16 = 65535;
const MIN_THREADS: usize = 1;
const MAX_THREADS: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ssl: SslConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SslConfig {
    pub certificate_file: PathBuf,
    pub private_key_file: PathBuf,
    pub dh_params_file: PathBuf,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub db_name: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("db_name", &self.db_name)
            .field("max_connections", &self.max_connections)
            .field("connection_timeout", &self.connection_timeout)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret_key: String,
    pub access_token_expiry_minutes: u32,
    pub refresh_token_expiry_days: u32,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret_key", &"[REDACTED]")
            .field(
                "access_token_expiry_minutes",
                &self.access_token_expiry_minutes,
            )
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: PathBuf,
    pub error_log: PathBuf,
    pub console_output: bool,
    pub log_access: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let file = File::open(path)
            .map_err(|e| AppError::Config(format!("cannot open config file {}: {e}", path.display())))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.address.is_empty() {
            return Err(AppError::Config("server.address cannot be empty".into()));
        }

        if self.server.port < MIN_PORT || self.server.port >= MAX_PORT {
            return Err(AppError::Config(format!(
                "server.port must be between {MIN_PORT} and {}",
                MAX_PORT - 1
            )));
        }

        if self.server.threads < MIN_THREADS || self.server.threads > MAX_THREADS {
            return Err(AppError::Config(format!(
                "server.threads must be between {MIN_THREADS} and {MAX_THREADS}"
            )));
        }

        for (key, path) in [
            ("ssl.certificate_file", &self.ssl.certificate_file),
            ("ssl.private_key_file", &self.ssl.private_key_file),
            ("ssl.dh_params_file", &self.ssl.dh_params_file),
        ] {
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "{key} not found: {}",
                    path.display()
                )));
            }
        }

        if self.database.address.is_empty() {
            return Err(AppError::Config("database.address cannot be empty".into()));
        }

        if self.database.port < MIN_PORT || self.database.port >= MAX_PORT {
            return Err(AppError::Config(format!(
                "database.port must be between {MIN_PORT} and {}",
                MAX_PORT - 1
            )));
        }

        if self.database.username.is_empty() {
            return Err(AppError::Config("database.username cannot be empty".into()));
        }

        if self.database.password.is_empty() {
            return Err(AppError::Config("database.password cannot be empty".into()));
        }

        if self.database.db_name.is_empty() {
            return Err(AppError::Config("database.db_name cannot be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "database.max_connections must be at least 1".into(),
            ));
        }

        if self.database.connection_timeout == 0 {
            return Err(AppError::Config(
                "database.connection_timeout must be at least 1".into(),
            ));
        }

        if self.jwt.secret_key.is_empty() {
            return Err(AppError::Config("jwt.secret_key cannot be empty".into()));
        }

        if self.jwt.access_token_expiry_minutes == 0 {
            return Err(AppError::Config(
                "jwt.access_token_expiry_minutes must be at least 1".into(),
            ));
        }

        if self.jwt.refresh_token_expiry_days == 0 {
            return Err(AppError::Config(
                "jwt.refresh_token_expiry_days must be at least 1".into(),
            ));
        }

        crate::logging::parse_level(&self.logging.level)?;

        if self.logging.access_log.as_os_str().is_empty() {
            return Err(AppError::Config("logging.access_log cannot be empty".into()));
        }

        if self.logging.error_log.as_os_str().is_empty() {
            return Err(AppError::Config("logging.error_log cannot be empty".into()));
        }

        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            address: self.database.address.clone(),
            port: self.database.port,
            username: self.database.username.clone(),
            password: self.database.password.clone(),
            db_name: self.database.db_name.clone(),
            max_connections: self.database.max_connections,
            connect_timeout_secs: self.database.connection_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, mutate: impl FnOnce(&mut serde_json::Value)) -> PathBuf {
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        let dh = dir.path().join("dh.pem");
        for path in [&cert, &key, &dh] {
            File::create(path).unwrap();
        }

        let mut value = serde_json::json!({
            "server": { "address": "127.0.0.1", "port": 8443, "threads": 4 },
            "ssl": {
                "certificate_file": cert,
                "private_key_file": key,
                "dh_params_file": dh,
            },
            "database": {
                "address": "localhost",
                "port": 5432,
                "username": "chat",
                "password": "secret",
                "db_name": "nova_chat",
                "max_connections": 10,
                "connection_timeout": 5,
            },
            "jwt": {
                "secret_key": "0123456789abcdef0123456789abcdef",
                "access_token_expiry_minutes": 15,
                "refresh_token_expiry_days": 7,
            },
            "logging": {
                "level": "info",
                "access_log": "access.log",
                "error_log": "error.log",
                "console_output": true,
                "log_access": true,
            },
        });
        mutate(&mut value);

        let path = dir.path().join("config.json");
        let mut file = File::create(&path).unwrap();
        write!(file, "{value}").unwrap();
        path
    }

    #[test]
    fn test_load_valid_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, |_| {});

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.server.threads, 4);
        assert_eq!(config.pool_config().max_connections, 10);
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::load(Path::new("/definitely/not/here.json")).is_err());
    }

    #[test]
    fn test_missing_key_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, |v| {
            v["jwt"].as_object_mut().unwrap().remove("secret_key");
        });

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("secret_key"), "{err}");
    }

    #[test]
    fn test_port_boundaries() {
        let dir = TempDir::new().unwrap();

        for port in [1u16, 65534] {
            let path = write_config(&dir, |v| v["server"]["port"] = serde_json::json!(port));
            assert!(Config::load(&path).is_ok(), "port {port} should pass");
        }

        for port in [0u16, 65535] {
            let path = write_config(&dir, |v| v["server"]["port"] = serde_json::json!(port));
            assert!(Config::load(&path).is_err(), "port {port} should fail");
        }
    }

    #[test]
    fn test_thread_boundaries() {
        let dir = TempDir::new().unwrap();

        for threads in [1, 1024] {
            let path = write_config(&dir, |v| v["server"]["threads"] = serde_json::json!(threads));
            assert!(Config::load(&path).is_ok(), "threads {threads} should pass");
        }

        for threads in [0, 1025] {
            let path = write_config(&dir, |v| v["server"]["threads"] = serde_json::json!(threads));
            assert!(Config::load(&path).is_err(), "threads {threads} should fail");
        }
    }

    #[test]
    fn test_pool_size_must_be_positive() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, |v| {
            v["database"]["max_connections"] = serde_json::json!(0)
        });
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_tls_files() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, |v| {
            v["ssl"]["certificate_file"] = serde_json::json!("/no/such/cert.pem")
        });

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("certificate_file"), "{err}");
    }

    #[test]
    fn test_invalid_logging_level() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, |v| v["logging"]["level"] = serde_json::json!("loud"));
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, |_| {});
        let config = Config::load(&path).unwrap();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("0123456789abcdef"), "jwt secret leaked");
        assert!(!rendered.contains("\"secret\""), "db password leaked");
        assert!(rendered.contains("[REDACTED]"));
    }
}
