use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store pool error: {0}")]
    Pool(#[from] db_pool::PoolError),

    #[error("token error: {0}")]
    Jwt(#[from] jwt_security::JwtError),

    #[error("model error: {0}")]
    Model(#[from] crate::models::ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
