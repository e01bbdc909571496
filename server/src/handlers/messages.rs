//! Point-to-point messaging endpoints: send, pull-based listing, mark
//! as read.

use std::sync::Arc;

use async_trait::async_trait;
use db_pool::StorePool;
use hyper::{Method, StatusCode};
use jwt_security::JwtManager;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    error_response, extract_bearer_token, is_json_content_type, parse_int_or, parse_json_body,
    success_response, validate_access_token, Handler, Request, Response,
};
use crate::db::{message_repo, message_repo::MessageFilter, user_repo};
use crate::models::Message;
use crate::validators::MAX_MESSAGE_LEN;

const LIMIT_DEFAULT: i64 = 50;
const LIMIT_MAX: i64 = 200;

pub struct MessageHandlers {
    jwt: Arc<JwtManager>,
    pool: Arc<StorePool>,
}

#[async_trait]
impl Handler for MessageHandlers {
    async fn handle(&self, request: &Request) -> Response {
        let path = request.path();

        if path == "/api/v1/messages/send" && request.method == Method::POST {
            return self.handle_send_message(request).await;
        }
        if path == "/api/v1/messages/read" && request.method == Method::POST {
            return self.handle_mark_as_read(request).await;
        }
        if path.starts_with("/api/v1/messages") && request.method == Method::GET {
            return self.handle_get_messages(request).await;
        }

        error_response(
            StatusCode::NOT_FOUND,
            "ENDPOINT_NOT_FOUND",
            "Endpoint not found",
        )
    }

    fn supported_methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::POST]
    }
}

impl MessageHandlers {
    pub fn new(jwt: Arc<JwtManager>, pool: Arc<StorePool>) -> Self {
        Self { jwt, pool }
    }

    fn db(&self) -> &PgPool {
        self.pool.inner()
    }

    async fn handle_send_message(&self, request: &Request) -> Response {
        let Some(from_user_id) = self.authenticated_user_id(request) else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        };

        if !is_json_content_type(request) {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_CONTENT_TYPE",
                "Content-Type must be application/json",
            );
        }

        let Some(body) = parse_json_body(request) else {
            return error_response(StatusCode::BAD_REQUEST, "INVALID_JSON", "Invalid JSON body");
        };

        let (Some(to_login), Some(message_text)) = (
            body.get("to_login").and_then(Value::as_str),
            body.get("message").and_then(Value::as_str),
        ) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_FIELDS",
                "to_login and message are required",
            );
        };

        if message_text.is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                "EMPTY_MESSAGE",
                "Message cannot be empty",
            );
        }

        if message_text.chars().count() > MAX_MESSAGE_LEN {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MESSAGE_TOO_LONG",
                "Message exceeds maximum length of 4096 characters",
            );
        }

        let to_user_id = match user_repo::id_by_login(self.db(), to_login).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    "USER_NOT_FOUND",
                    "Recipient user not found",
                );
            }
            Err(e) => {
                error!("Failed to send message: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MESSAGE_SEND_FAILED",
                    "Failed to send message",
                );
            }
        };

        if from_user_id == to_user_id {
            return error_response(
                StatusCode::BAD_REQUEST,
                "SELF_MESSAGE",
                "Cannot send message to yourself",
            );
        }

        let message = match Message::create(from_user_id, to_user_id, message_text) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to send message: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MESSAGE_SEND_FAILED",
                    "Failed to send message",
                );
            }
        };

        let Some(message_id) = message.message_id() else {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "MESSAGE_SEND_FAILED",
                "Failed to send message",
            );
        };

        let sent_at = match message_repo::insert(
            self.db(),
            message_id,
            from_user_id,
            to_user_id,
            message.message_text(),
        )
        .await
        {
            Ok(created_at) => created_at,
            Err(e) => {
                error!("Failed to send message: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MESSAGE_SEND_FAILED",
                    "Failed to send message",
                );
            }
        };

        let data = json!({
            "message_id": message_id.to_string(),
            "sent_at": sent_at.to_rfc3339(),
        });

        info!("Message sent from {} to {}", from_user_id, to_user_id);
        success_response(data, StatusCode::CREATED, Some("Message sent successfully"))
    }

    async fn handle_get_messages(&self, request: &Request) -> Response {
        let Some(user_id) = self.authenticated_user_id(request) else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        };

        let params = request.query_params();

        let unread_only = params.get("unread_only").map(String::as_str) == Some("true");
        let limit = params
            .get("limit")
            .map_or(LIMIT_DEFAULT, |v| parse_int_or(v, LIMIT_DEFAULT))
            .clamp(1, LIMIT_MAX);

        let after_message_id = match parse_cursor(params.get("after_message_id")) {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("Failed to get messages: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GET_MESSAGES_FAILED",
                    "Failed to get messages",
                );
            }
        };
        let before_message_id = match parse_cursor(params.get("before_message_id")) {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("Failed to get messages: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GET_MESSAGES_FAILED",
                    "Failed to get messages",
                );
            }
        };

        // An unknown conversation partner just drops the narrowing, it is
        // not an error.
        let conversation_with = match params.get("conversation_with").filter(|v| !v.is_empty()) {
            Some(login) => match user_repo::id_by_login(self.db(), login).await {
                Ok(id) => id,
                Err(e) => {
                    error!("Failed to get messages: {}", e);
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "GET_MESSAGES_FAILED",
                        "Failed to get messages",
                    );
                }
            },
            None => None,
        };

        let filter = MessageFilter {
            unread_only,
            after_message_id,
            before_message_id,
            limit,
            conversation_with,
        };

        let (messages, unread_count) = match tokio::try_join!(
            message_repo::list_for_user(self.db(), user_id, &filter),
            message_repo::unread_count(self.db(), user_id),
        ) {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to get messages: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GET_MESSAGES_FAILED",
                    "Failed to get messages",
                );
            }
        };

        let messages_json: Vec<Value> = messages.iter().map(|m| m.to_json()).collect();

        let mut meta = json!({
            "total_count": messages.len(),
            "unread_count": unread_count,
            "has_more": messages.len() as i64 == limit,
        });

        if let Some(last) = messages.last().and_then(Message::message_id) {
            meta["last_message_id"] = json!(last.to_string());
        }

        let data = json!({
            "messages": messages_json,
            "meta": meta,
        });

        success_response(data, StatusCode::OK, None)
    }

    async fn handle_mark_as_read(&self, request: &Request) -> Response {
        let Some(user_id) = self.authenticated_user_id(request) else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        };

        if !is_json_content_type(request) {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_CONTENT_TYPE",
                "Content-Type must be application/json",
            );
        }

        let Some(body) = parse_json_body(request) else {
            return error_response(StatusCode::BAD_REQUEST, "INVALID_JSON", "Invalid JSON body");
        };

        let Some(raw_ids) = body.get("message_ids").and_then(Value::as_array) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "EMPTY_MESSAGE_IDS",
                "Message IDs array is required",
            );
        };

        if raw_ids.is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                "EMPTY_MESSAGE_IDS",
                "Message IDs array cannot be empty",
            );
        }

        let message_ids = match parse_message_ids(raw_ids) {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to mark messages as read: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MARK_READ_FAILED",
                    "Failed to mark messages as read",
                );
            }
        };

        if let Err(e) = message_repo::mark_read(self.db(), &message_ids, user_id).await {
            error!("Failed to mark messages as read: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "MARK_READ_FAILED",
                "Failed to mark messages as read",
            );
        }

        // The contract reports the input cardinality, not the rows the
        // recipient filter actually flipped.
        let read_count = message_ids.len();

        debug!("Marked {} messages as read for user: {}", read_count, user_id);
        success_response(
            json!({ "read_count": read_count }),
            StatusCode::OK,
            Some("Messages marked as read"),
        )
    }

    fn authenticated_user_id(&self, request: &Request) -> Option<Uuid> {
        let access_token = extract_bearer_token(request);
        if access_token.is_empty() {
            return None;
        }

        let user_id = validate_access_token(&self.jwt, &access_token)?;
        Uuid::parse_str(&user_id).ok()
    }
}

fn parse_cursor(value: Option<&String>) -> Result<Option<Uuid>, uuid::Error> {
    match value.filter(|v| !v.is_empty()) {
        Some(raw) => Uuid::parse_str(raw).map(Some),
        None => Ok(None),
    }
}

fn parse_message_ids(raw: &[Value]) -> Result<Vec<Uuid>, String> {
    raw.iter()
        .map(|value| {
            let s = value
                .as_str()
                .ok_or_else(|| "message id must be a string".to_string())?;
            Uuid::parse_str(s).map_err(|e| format!("invalid message id: {e}"))
        })
        .collect()
}
