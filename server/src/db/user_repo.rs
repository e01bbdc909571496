use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::User;

pub async fn insert(
    pool: &PgPool,
    user_id: Uuid,
    login: &str,
    password_hash: &str,
) -> AppResult<()> {
    sqlx::query("INSERT INTO users (user_id, login, password_hash) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(login)
        .bind(password_hash)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn exists_by_login(pool: &PgPool, login: &str) -> AppResult<bool> {
    let found: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM users WHERE login = $1")
        .bind(login)
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// The credential pair consulted at login: `(user_id, password_hash)`.
pub async fn credentials_by_login(
    pool: &PgPool,
    login: &str,
) -> AppResult<Option<(Uuid, String)>> {
    let row = sqlx::query_as("SELECT user_id, password_hash FROM users WHERE login = $1")
        .bind(login)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn password_hash_by_id(pool: &PgPool, user_id: Uuid) -> AppResult<Option<String>> {
    let hash = sqlx::query_scalar("SELECT password_hash FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(hash)
}

pub async fn login_by_id(pool: &PgPool, user_id: Uuid) -> AppResult<Option<String>> {
    let login = sqlx::query_scalar("SELECT login FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(login)
}

pub async fn id_by_login(pool: &PgPool, login: &str) -> AppResult<Option<Uuid>> {
    let id = sqlx::query_scalar("SELECT user_id FROM users WHERE login = $1")
        .bind(login)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}

pub async fn update_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> AppResult<u64> {
    let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE user_id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Delete the account row; messages and refresh tokens cascade.
pub async fn delete(pool: &PgPool, user_id: Uuid) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// One directory page, newest accounts first.
pub async fn list_paginated(
    pool: &PgPool,
    limit: i64,
    offset: i64,
    search: Option<&str>,
) -> AppResult<Vec<User>> {
    let rows = match search {
        Some(search) => {
            sqlx::query(
                "SELECT user_id, login, created_at FROM users WHERE login ILIKE $1 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(format!("%{search}%"))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT user_id, login, created_at FROM users \
                 ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };

    let users = rows
        .iter()
        .map(User::from_database_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(users)
}

pub async fn count(pool: &PgPool, search: Option<&str>) -> AppResult<i64> {
    let total = match search {
        Some(search) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE login ILIKE $1")
                .bind(format!("%{search}%"))
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(pool)
                .await?
        }
    };

    Ok(total)
}

/// Directory search, ordered by login ascending.
pub async fn search(pool: &PgPool, query: &str, limit: i64) -> AppResult<Vec<User>> {
    let rows = sqlx::query(
        "SELECT user_id, login, created_at FROM users WHERE login ILIKE $1 \
         ORDER BY login LIMIT $2",
    )
    .bind(format!("%{query}%"))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let users = rows
        .iter()
        .map(User::from_database_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(users)
}
