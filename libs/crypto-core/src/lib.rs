//! Digest and password hashing primitives for the chat server.

pub mod hash;

pub use hash::{hash_password, md5_hex, sha256_hex, verify_password, HasherError};
