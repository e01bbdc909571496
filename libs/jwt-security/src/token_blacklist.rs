//! In-process token blacklist for JWT revocation.
//!
//! Revoked tokens are held until their embedded expiry passes; a periodic
//! sweep drops expired entries. The set is process-local and non-durable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Default)]
pub struct TokenBlacklist {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token with its expiry. Empty tokens are ignored.
    pub fn insert(&self, token: &str, expires_at: DateTime<Utc>) {
        if token.is_empty() {
            return;
        }

        self.lock().insert(token.to_string(), expires_at);
        debug!(expires_at = expires_at.timestamp(), "Token blacklisted");
    }

    /// A token counts as blacklisted only while its recorded expiry is in
    /// the future.
    pub fn contains(&self, token: &str) -> bool {
        match self.lock().get(token) {
            Some(expires_at) => *expires_at > Utc::now(),
            None => false,
        }
    }

    /// Remove all entries whose expiry has passed. Returns how many were
    /// dropped.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        let removed = before - entries.len();

        if removed > 0 {
            debug!(removed, "Cleaned up expired blacklisted tokens");
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
