//! Directory endpoints: paginated listing and login search.

use std::sync::Arc;

use async_trait::async_trait;
use db_pool::StorePool;
use hyper::{Method, StatusCode};
use jwt_security::JwtManager;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::error;

use super::{
    error_response, extract_bearer_token, parse_int_or, success_response, validate_access_token,
    Handler, Request, Response,
};
use crate::db::user_repo;

const PAGE_DEFAULT: i64 = 1;
const LIMIT_DEFAULT: i64 = 50;
const LIMIT_MAX: i64 = 100;
const SEARCH_LIMIT_DEFAULT: i64 = 20;
const SEARCH_LIMIT_MAX: i64 = 50;

pub struct UserHandlers {
    jwt: Arc<JwtManager>,
    pool: Arc<StorePool>,
}

#[async_trait]
impl Handler for UserHandlers {
    async fn handle(&self, request: &Request) -> Response {
        let path = request.path();

        if path.starts_with("/api/v1/users/search") && request.method == Method::GET {
            return self.handle_search_users(request).await;
        }
        if path.starts_with("/api/v1/users") && request.method == Method::GET {
            return self.handle_get_users(request).await;
        }

        error_response(
            StatusCode::NOT_FOUND,
            "ENDPOINT_NOT_FOUND",
            "Endpoint not found",
        )
    }

    fn supported_methods(&self) -> Vec<Method> {
        vec![Method::GET]
    }
}

impl UserHandlers {
    pub fn new(jwt: Arc<JwtManager>, pool: Arc<StorePool>) -> Self {
        Self { jwt, pool }
    }

    fn db(&self) -> &PgPool {
        self.pool.inner()
    }

    async fn handle_get_users(&self, request: &Request) -> Response {
        let access_token = extract_bearer_token(request);
        if access_token.is_empty() {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Access token is required",
            );
        }

        if validate_access_token(&self.jwt, &access_token).is_none() {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        }

        let params = request.query_params();
        let page = params
            .get("page")
            .map_or(PAGE_DEFAULT, |v| parse_int_or(v, PAGE_DEFAULT))
            .max(1);
        let limit = params
            .get("limit")
            .map_or(LIMIT_DEFAULT, |v| parse_int_or(v, LIMIT_DEFAULT))
            .clamp(1, LIMIT_MAX);
        let search = params.get("search").map(String::as_str).filter(|s| !s.is_empty());

        let offset = (page - 1) * limit;

        let (users, total_count) = match tokio::try_join!(
            user_repo::list_paginated(self.db(), limit, offset, search),
            user_repo::count(self.db(), search),
        ) {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to get users: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GET_USERS_FAILED",
                    "Failed to get users",
                );
            }
        };

        let total_pages = (total_count + limit - 1) / limit;
        let users_json: Vec<Value> = users.iter().map(|user| user.to_json()).collect();

        let data = json!({
            "users": users_json,
            "pagination": {
                "page": page,
                "limit": limit,
                "total_count": total_count,
                "total_pages": total_pages,
                "has_next": page < total_pages,
                "has_prev": page > 1,
            },
        });

        success_response(data, StatusCode::OK, None)
    }

    async fn handle_search_users(&self, request: &Request) -> Response {
        let access_token = extract_bearer_token(request);
        if access_token.is_empty() {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Access token is required",
            );
        }

        if validate_access_token(&self.jwt, &access_token).is_none() {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid access token",
            );
        }

        let params = request.query_params();
        let query = params.get("query").map(String::as_str).unwrap_or_default();
        let limit = params
            .get("limit")
            .map_or(SEARCH_LIMIT_DEFAULT, |v| parse_int_or(v, SEARCH_LIMIT_DEFAULT))
            .clamp(1, SEARCH_LIMIT_MAX);

        if query.is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                "MISSING_QUERY",
                "Search query is required",
            );
        }

        let users = match user_repo::search(self.db(), query, limit).await {
            Ok(users) => users,
            Err(e) => {
                error!("Failed to search users: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SEARCH_FAILED",
                    "Search failed",
                );
            }
        };

        let users_json: Vec<Value> = users.iter().map(|user| user.to_json()).collect();

        let data = json!({
            "users": users_json,
            "meta": {
                "query": query,
                "count": users.len(),
                "limit": limit,
            },
        });

        success_response(data, StatusCode::OK, None)
    }
}
