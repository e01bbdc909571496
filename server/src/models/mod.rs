//! Entity models for the chat server: [`User`] and [`Message`].

mod message;
mod user;

pub use message::Message;
pub use user::User;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to parse row: {0}")]
    Parse(String),

    #[error("entity failed validation: {0}")]
    Invalid(String),
}
