use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// Persist a refresh-token record. Only the SHA-256 fingerprint is stored.
pub async fn store(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(())
}

/// The owning user of an unexpired refresh record, if any.
pub async fn find_valid(pool: &PgPool, token_hash: &str) -> AppResult<Option<Uuid>> {
    let user_id = sqlx::query_scalar(
        "SELECT user_id FROM refresh_tokens WHERE token_hash = $1 AND expires_at > NOW()",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(user_id)
}

pub async fn delete(pool: &PgPool, token_hash: &str) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Rotate a refresh record atomically: the new row lands and the old row
/// disappears in one transaction, so a crash can never leave both valid.
pub async fn rotate(
    pool: &PgPool,
    user_id: Uuid,
    new_token_hash: &str,
    new_expires_at: DateTime<Utc>,
    old_token_hash: &str,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(new_token_hash)
        .bind(new_expires_at)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
        .bind(old_token_hash)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}
