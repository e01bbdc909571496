//! Registration, session lifecycle and account management endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db_pool::StorePool;
use hyper::{Method, StatusCode};
use jwt_security::JwtManager;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    error_response, extract_bearer_token, is_json_content_type, parse_json_body,
    success_response, validate_access_token, Handler, Request, Response,
};
use crate::db::{token_repo, user_repo};
use crate::error::AppResult;
use crate::models::User;
use crate::validators;

pub struct AuthHandlers {
    jwt: Arc<JwtManager>,
    pool: Arc<StorePool>,
}

#[async_trait]
impl Handler for AuthHandlers {
    async fn handle(&self, request: &Request) -> Response {
        let path = request.path();

        if path == "/api/v1/auth/register" && request.method == Method::POST {
            return self.handle_register(request).await;
        }
        if path == "/api/v1/auth/login" && request.method == Method::POST {
            return self.handle_login(request).await;
        }
        if path == "/api/v1/auth/refresh" && request.method == Method::POST {
            return self.handle_refresh(request).await;
        }
        if path == "/api/v1/auth/logout" && request.method == Method::POST {
            return self.handle_logout(request).await;
        }
        if path == "/api/v1/auth/password" && request.method == Method::PUT {
            return self.handle_change_password(request).await;
        }
        if path == "/api/v1/auth/account" && request.method == Method::DELETE {
            return self.handle_delete_account(request).await;
        }

        error_response(
            StatusCode::NOT_FOUND,
            "ENDPOINT_NOT_FOUND",
            "Endpoint not found",
        )
    }

    fn supported_methods(&self) -> Vec<Method> {
        vec![Method::POST, Method::PUT, Method::DELETE]
    }
}

impl AuthHandlers {
    pub fn new(jwt: Arc<JwtManager>, pool: Arc<StorePool>) -> Self {
        Self { jwt, pool }
    }

    fn db(&self) -> &PgPool {
        self.pool.inner()
    }

    async fn handle_register(&self, request: &Request) -> Response {
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

        let (Some(login), Some(password)) = (
            body.get("login").and_then(Value::as_str),
            body.get("password").and_then(Value::as_str),
        ) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_FIELDS",
                "Login and password are required",
            );
        };

        if !validators::is_login_valid(login) {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_LOGIN",
                "Login must be 3-50 characters and contain only letters, numbers and underscores",
            );
        }

        match user_repo::exists_by_login(self.db(), login).await {
            Ok(true) => {
                return error_response(
                    StatusCode::CONFLICT,
                    "LOGIN_EXISTS",
                    "User with this login already exists",
                );
            }
            Ok(false) => {}
            Err(e) => {
                error!("Registration failed: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REGISTRATION_FAILED",
                    "Failed to create user",
                );
            }
        }

        if !validators::is_password_valid(password) {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_PASSWORD",
                "Password must be at least 6 characters and contain at least one letter and one digit",
            );
        }

        match self.register_user(login, password).await {
            Ok(data) => {
                info!("User registered successfully: {}", login);
                success_response(data, StatusCode::CREATED, Some("User registered successfully"))
            }
            Err(e) => {
                error!("Registration failed: {}", e);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REGISTRATION_FAILED",
                    "Failed to create user",
                )
            }
        }
    }

    async fn handle_login(&self, request: &Request) -> Response {
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

        let (Some(login), Some(password)) = (
            body.get("login").and_then(Value::as_str),
            body.get("password").and_then(Value::as_str),
        ) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_FIELDS",
                "Login and password are required",
            );
        };

        let credentials = match user_repo::credentials_by_login(self.db(), login).await {
            Ok(row) => row,
            Err(e) => {
                error!("Login failed: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LOGIN_FAILED",
                    "Login failed",
                );
            }
        };

        let Some((user_id, password_hash)) = credentials else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid login or password",
            );
        };

        if !crypto_core::verify_password(password, &password_hash, "") {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid login or password",
            );
        }

        let user_id_str = user_id.to_string();
        let (access_token, refresh_token) =
            match self.generate_token_pair(&user_id_str, Some(login)) {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Login failed: {}", e);
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "LOGIN_FAILED",
                        "Login failed",
                    );
                }
            };

        if let Err(e) = self.store_refresh_token(user_id, &refresh_token).await {
            error!("Error storing refresh token: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOKEN_STORAGE_FAILED",
                "Failed to store refresh token",
            );
        }

        let data = json!({
            "access_token": access_token,
            "refresh_token": refresh_token,
            "token_type": "Bearer",
            "expires_in": self.jwt.access_expiry_seconds(),
            "user_id": user_id_str,
            "login": login,
        });

        info!("User logged in successfully: {}", login);
        success_response(data, StatusCode::OK, Some("Login successful"))
    }

    async fn handle_refresh(&self, request: &Request) -> Response {
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

        let Some(refresh_token) = body.get("refresh_token").and_then(Value::as_str) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_TOKEN",
                "Refresh token is required",
            );
        };

        let payload = match self.jwt.verify_and_decode(refresh_token) {
            Ok(payload) if payload.is_valid && payload.is_refresh_token() => payload,
            _ => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "INVALID_REFRESH_TOKEN",
                    "Refresh token is invalid",
                );
            }
        };

        // The fingerprint row must still exist and be unexpired; a rotated
        // or logged-out token fails here even though it still verifies.
        let token_hash = crypto_core::sha256_hex(refresh_token);
        match token_repo::find_valid(self.db(), &token_hash).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "INVALID_REFRESH_TOKEN",
                    "Refresh token not found or expired",
                );
            }
            Err(e) => {
                error!("Token refresh failed: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REFRESH_FAILED",
                    "Token refresh failed",
                );
            }
        }

        let Ok(user_id) = Uuid::parse_str(&payload.user_id) else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_REFRESH_TOKEN",
                "Refresh token is invalid",
            );
        };

        let login = match user_repo::login_by_id(self.db(), user_id).await {
            Ok(Some(login)) => login,
            Ok(None) => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "USER_NOT_FOUND",
                    "User not found",
                );
            }
            Err(e) => {
                error!("Token refresh failed: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REFRESH_FAILED",
                    "Token refresh failed",
                );
            }
        };

        let (new_access_token, new_refresh_token) =
            match self.generate_token_pair(&payload.user_id, Some(&login)) {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Token refresh failed: {}", e);
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "REFRESH_FAILED",
                        "Token refresh failed",
                    );
                }
            };

        let new_expiry = match jwt_security::token_expiry(&new_refresh_token) {
            Ok(expiry) => expiry,
            Err(e) => {
                error!("Token refresh failed: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REFRESH_FAILED",
                    "Token refresh failed",
                );
            }
        };

        let new_token_hash = crypto_core::sha256_hex(&new_refresh_token);
        if let Err(e) = token_repo::rotate(
            self.db(),
            user_id,
            &new_token_hash,
            new_expiry,
            &token_hash,
        )
        .await
        {
            error!("Error storing refresh token: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOKEN_STORAGE_FAILED",
                "Failed to store refresh token",
            );
        }

        let data = json!({
            "access_token": new_access_token,
            "refresh_token": new_refresh_token,
            "token_type": "Bearer",
            "expires_in": self.jwt.access_expiry_seconds(),
            "user_id": payload.user_id,
        });

        debug!("Tokens refreshed for user: {}", payload.user_id);
        success_response(data, StatusCode::OK, Some("Tokens refreshed successfully"))
    }

    async fn handle_logout(&self, request: &Request) -> Response {
        let access_token = extract_bearer_token(request);
        if access_token.is_empty() {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Access token is required",
            );
        }

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

        let Some(refresh_token) = body.get("refresh_token") else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_TOKEN",
                "Refresh token is required",
            );
        };

        // A present field that is not a string is an internal logout
        // failure, not a missing token.
        let Some(refresh_token) = refresh_token.as_str() else {
            error!("Logout failed: refresh_token is not a string");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "LOGOUT_FAILED",
                "Logout failed",
            );
        };

        let Some(user_id) = validate_access_token(&self.jwt, &access_token) else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        };

        self.jwt.revoke(&access_token);

        // Best effort: a missing row must not block the logout.
        let token_hash = crypto_core::sha256_hex(refresh_token);
        if let Err(e) = token_repo::delete(self.db(), &token_hash).await {
            warn!("Failed to invalidate refresh token for user {}: {}", user_id, e);
        }

        info!("User logged out successfully: {}", user_id);
        success_response(Value::Null, StatusCode::OK, Some("Successfully logged out"))
    }

    async fn handle_change_password(&self, request: &Request) -> Response {
        let access_token = extract_bearer_token(request);
        if access_token.is_empty() {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Access token is required",
            );
        }

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

        let (Some(old_password), Some(new_password)) = (
            body.get("old_password").and_then(Value::as_str),
            body.get("new_password").and_then(Value::as_str),
        ) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_FIELDS",
                "Old password and new password are required",
            );
        };

        let Some(user_id) = self.authenticated_user_id(&access_token) else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        };

        if !self.is_current_password_valid(user_id, old_password).await {
            return error_response(
                StatusCode::FORBIDDEN,
                "INVALID_PASSWORD",
                "Current password is incorrect",
            );
        }

        if !validators::is_password_valid(new_password) {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_PASSWORD",
                "New password must be at least 6 characters and contain at least one letter and one digit",
            );
        }

        let new_hash = match crypto_core::hash_password(new_password, "") {
            Ok(hash) => hash,
            Err(e) => {
                error!("Password change failed: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PASSWORD_CHANGE_FAILED",
                    "Password change failed",
                );
            }
        };

        if let Err(e) = user_repo::update_password_hash(self.db(), user_id, &new_hash).await {
            error!("Password change failed: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PASSWORD_CHANGE_FAILED",
                "Password change failed",
            );
        }

        info!("Password changed successfully for user: {}", user_id);
        success_response(Value::Null, StatusCode::OK, Some("Password changed successfully"))
    }

    async fn handle_delete_account(&self, request: &Request) -> Response {
        let access_token = extract_bearer_token(request);
        if access_token.is_empty() {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Access token is required",
            );
        }

        let Some(user_id) = self.authenticated_user_id(&access_token) else {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        };

        // Cascades to the user's messages and refresh tokens.
        if let Err(e) = user_repo::delete(self.db(), user_id).await {
            error!("Account deletion failed: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ACCOUNT_DELETION_FAILED",
                "Account deletion failed",
            );
        }

        self.jwt.revoke(&access_token);

        info!("Account deleted successfully: {}", user_id);
        success_response(Value::Null, StatusCode::OK, Some("Account deleted successfully"))
    }

    async fn register_user(&self, login: &str, password: &str) -> AppResult<Value> {
        let user = User::create_from_credentials(login, password)?;
        let user_id = user
            .user_id()
            .ok_or_else(|| crate::error::AppError::Internal("user created without id".into()))?;

        user_repo::insert(self.db(), user_id, user.login(), user.password_hash()).await?;

        Ok(json!({
            "user_id": user_id.to_string(),
            "login": user.login(),
        }))
    }

    fn generate_token_pair(
        &self,
        user_id: &str,
        login: Option<&str>,
    ) -> Result<(String, String), jwt_security::JwtError> {
        let access = self
            .jwt
            .generate_access_token(user_id, login.unwrap_or_default())?;
        let refresh = self.jwt.generate_refresh_token(user_id)?;
        Ok((access, refresh))
    }

    async fn store_refresh_token(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()> {
        let token_hash = crypto_core::sha256_hex(refresh_token);
        let expires_at: DateTime<Utc> = jwt_security::token_expiry(refresh_token)?;
        token_repo::store(self.db(), user_id, &token_hash, expires_at).await
    }

    fn authenticated_user_id(&self, access_token: &str) -> Option<Uuid> {
        let user_id = validate_access_token(&self.jwt, access_token)?;
        Uuid::parse_str(&user_id).ok()
    }

    async fn is_current_password_valid(&self, user_id: Uuid, password: &str) -> bool {
        match user_repo::password_hash_by_id(self.db(), user_id).await {
            Ok(Some(hash)) => crypto_core::verify_password(password, &hash, ""),
            Ok(None) => false,
            Err(e) => {
                error!("Error verifying current password: {}", e);
                false
            }
        }
    }
}
