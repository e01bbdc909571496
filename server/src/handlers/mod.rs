//! Handler protocol: the [`Handler`] trait every endpoint group
//! implements, the collected request form, and the canonical JSON
//! envelope helpers shared by all of them.

mod auth;
mod messages;
mod users;

pub use auth::AuthHandlers;
pub use messages::MessageHandlers;
pub use users::UserHandlers;

use std::collections::HashMap;

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE,
};
use hyper::{HeaderMap, Method, StatusCode};
use jwt_security::JwtManager;
use serde_json::{json, Value};
use tracing::error;

/// A fully collected HTTP request as handlers see it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Original request target, query string included.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    /// The target with any query string stripped.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// Raw query string, if present.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Parse `key=value` pairs from the query string. No percent
    /// decoding, matching the wire contract.
    pub fn query_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();

        if let Some(query) = self.query() {
            for pair in query.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    params.insert(key.to_string(), value.to_string());
                }
            }
        }

        params
    }
}

pub type Response = hyper::Response<Full<Bytes>>;

/// One endpoint group. `handle` is total: every failure mode maps to an
/// error envelope, never a panic or transport error.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &Request) -> Response;

    fn supported_methods(&self) -> Vec<Method>;
}

/// Build the canonical JSON response with the shared header set.
pub(crate) fn json_response(body: &Value, status: StatusCode) -> Response {
    hyper::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .header(CACHE_CONTROL, "no-cache")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, DELETE, OPTIONS")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|e| {
            error!("Failed to build response: {}", e);
            let mut fallback = hyper::Response::new(Full::new(Bytes::from(
                r#"{"status":"error","code":"INTERNAL_ERROR","message":"Internal server error"}"#,
            )));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

pub(crate) fn success_response(data: Value, status: StatusCode, message: Option<&str>) -> Response {
    let mut body = json!({ "status": "success" });

    if let Some(message) = message {
        body["message"] = json!(message);
    }

    if !data.is_null() {
        body["data"] = data;
    }

    json_response(&body, status)
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "status": "error",
        "code": code,
        "message": message,
    });

    json_response(&body, status)
}

pub(crate) fn is_json_content_type(request: &Request) -> bool {
    request
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

/// Parse the body as JSON; `None` means an empty or malformed body.
pub(crate) fn parse_json_body(request: &Request) -> Option<Value> {
    if request.body.is_empty() {
        return None;
    }

    match serde_json::from_slice(&request.body) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("JSON parsing error: {}", e);
            None
        }
    }
}

/// The token from an `Authorization: Bearer <token>` header, or an empty
/// string when the header is absent or malformed.
pub(crate) fn extract_bearer_token(request: &Request) -> String {
    let Some(value) = request
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return String::new();
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => String::new(),
    }
}

/// Verify an access token and yield the caller's user id.
pub(crate) fn validate_access_token(jwt: &JwtManager, token: &str) -> Option<String> {
    match jwt.verify_and_decode(token) {
        Ok(payload) if payload.is_valid && payload.is_access_token() => Some(payload.user_id),
        _ => None,
    }
}

pub(crate) fn parse_int_or(value: &str, default: i64) -> i64 {
    value.parse().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str) -> Request {
        Request {
            method: Method::GET,
            target: target.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_path_and_query_split() {
        let req = request("/api/v1/users?page=2&limit=10");
        assert_eq!(req.path(), "/api/v1/users");
        assert_eq!(req.query(), Some("page=2&limit=10"));

        let bare = request("/api/v1/users");
        assert_eq!(bare.path(), "/api/v1/users");
        assert_eq!(bare.query(), None);
    }

    #[test]
    fn test_query_params() {
        let req = request("/api/v1/messages?unread_only=true&limit=5&flag");
        let params = req.query_params();
        assert_eq!(params.get("unread_only").map(String::as_str), Some("true"));
        assert_eq!(params.get("limit").map(String::as_str), Some("5"));
        assert!(!params.contains_key("flag"));
    }

    #[test]
    fn test_success_envelope_shapes() {
        let with_data = success_response(json!({"k": 1}), StatusCode::OK, Some("done"));
        assert_eq!(with_data.status(), StatusCode::OK);

        let without_data = success_response(Value::Null, StatusCode::OK, Some("done"));
        assert_eq!(without_data.status(), StatusCode::OK);
    }

    #[test]
    fn test_response_headers() {
        let response = error_response(StatusCode::NOT_FOUND, "ENDPOINT_NOT_FOUND", "nope");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
    }

    #[test]
    fn test_is_json_content_type() {
        let mut req = request("/x");
        assert!(!is_json_content_type(&req));

        req.headers
            .insert(CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert!(is_json_content_type(&req));

        req.headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        assert!(!is_json_content_type(&req));
    }

    #[test]
    fn test_parse_json_body() {
        let mut req = request("/x");
        assert!(parse_json_body(&req).is_none());

        req.body = Bytes::from(r#"{"login":"alice"}"#);
        assert_eq!(parse_json_body(&req).unwrap()["login"], "alice");

        req.body = Bytes::from("{nope");
        assert!(parse_json_body(&req).is_none());
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut req = request("/x");
        assert_eq!(extract_bearer_token(&req), "");

        req.headers
            .insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer_token(&req), "abc.def.ghi");

        req.headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&req), "");

        req.headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(extract_bearer_token(&req), "");
    }

    #[test]
    fn test_parse_int_or() {
        assert_eq!(parse_int_or("42", 7), 42);
        assert_eq!(parse_int_or("x", 7), 7);
        assert_eq!(parse_int_or("", 7), 7);
    }
}
