//! Method-agnostic path router: normalize, then resolve by exact match,
//! registered base path, and finally boundary-respecting prefix.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use hyper::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::handlers::{error_response, Handler, Response};

#[derive(Default)]
pub struct Router {
    handlers: Mutex<HashMap<String, Arc<dyn Handler>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a path. Re-registration overwrites with a
    /// warning; an empty path is rejected.
    pub fn register_handler(&self, path: &str, handler: Arc<dyn Handler>) -> AppResult<()> {
        if path.is_empty() {
            return Err(AppError::InvalidArgument(
                "handler path cannot be empty".into(),
            ));
        }

        let normalized = normalize_path(path);
        let mut handlers = self.lock();

        if handlers.contains_key(&normalized) {
            warn!("Overwriting existing handler for path: {}", normalized);
        }

        handlers.insert(normalized.clone(), handler);
        info!("Registered handler for path: {}", normalized);
        Ok(())
    }

    /// Resolve a request target to a handler. The query string is ignored
    /// for matching.
    pub fn find_handler(&self, target: &str) -> Option<Arc<dyn Handler>> {
        let request_path = match target.split_once('?') {
            Some((path, _)) => path,
            None => target,
        };

        let normalized = normalize_path(request_path);
        let base_path = extract_base_path(&normalized);

        let handlers = self.lock();

        if let Some(handler) = handlers.get(&normalized) {
            debug!("Found exact handler match for path: {}", normalized);
            return Some(handler.clone());
        }

        if let Some(handler) = handlers.get(&base_path) {
            if is_path_match(&normalized, &base_path) {
                debug!("Found base path handler for: {} -> {}", normalized, base_path);
                return Some(handler.clone());
            }
        }

        for (registered, handler) in handlers.iter() {
            if normalized.starts_with(registered.as_str()) && is_path_match(&normalized, registered)
            {
                debug!("Found prefix handler for: {} -> {}", normalized, registered);
                return Some(handler.clone());
            }
        }

        debug!("No handler found for path: {}", normalized);
        None
    }

    /// The shared 404 envelope for unroutable targets.
    pub fn handle_not_found(&self, target: &str) -> Response {
        warn!("Endpoint not found: {}", target);
        error_response(
            StatusCode::NOT_FOUND,
            "ENDPOINT_NOT_FOUND",
            &format!("Endpoint not found: {target}"),
        )
    }

    pub fn remove_handler(&self, path: &str) {
        let normalized = normalize_path(path);
        let mut handlers = self.lock();

        if handlers.remove(&normalized).is_some() {
            info!("Removed handler for path: {}", normalized);
        } else {
            warn!("Attempt to remove non-existent handler for path: {}", normalized);
        }
    }

    pub fn registered_paths(&self) -> Vec<String> {
        let handlers = self.lock();
        let mut paths: Vec<String> = handlers.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Handler>>> {
        match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Ensure a leading `/` and strip any trailing `/` except for the root.
fn normalize_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }

    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    normalized
}

/// The first two path segments, e.g. `/api/v1/users/search` → `/api/v1`.
fn extract_base_path(full_path: &str) -> String {
    if full_path.is_empty() || full_path == "/" {
        return "/".to_string();
    }

    let parts: Vec<&str> = full_path.split('/').filter(|part| !part.is_empty()).collect();

    match parts.as_slice() {
        [] => "/".to_string(),
        [first] => format!("/{first}"),
        [first, second, ..] => format!("/{first}/{second}"),
    }
}

/// Prefix match that only counts on a `/` boundary or exact end.
fn is_path_match(request_path: &str, registered_path: &str) -> bool {
    if request_path == registered_path {
        return true;
    }

    match request_path.strip_prefix(registered_path) {
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}
