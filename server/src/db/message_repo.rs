use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::Message;

/// Narrowing options for a message listing.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Only unread messages where the caller is the recipient.
    pub unread_only: bool,
    pub after_message_id: Option<Uuid>,
    pub before_message_id: Option<Uuid>,
    /// Already clamped by the handler.
    pub limit: i64,
    /// Resolved counterpart for a conversation narrowing.
    pub conversation_with: Option<Uuid>,
}

/// Insert a message and report the store-assigned creation time.
pub async fn insert(
    pool: &PgPool,
    message_id: Uuid,
    from_user_id: Uuid,
    to_user_id: Uuid,
    message_text: &str,
) -> AppResult<DateTime<Utc>> {
    let created_at = sqlx::query_scalar(
        "INSERT INTO messages (message_id, from_user_id, to_user_id, message_text, is_read) \
         VALUES ($1, $2, $3, $4, FALSE) RETURNING created_at",
    )
    .bind(message_id)
    .bind(from_user_id)
    .bind(to_user_id)
    .bind(message_text)
    .fetch_one(pool)
    .await?;

    Ok(created_at)
}

/// Messages where the user is sender or recipient, joined with both
/// logins, newest first.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    filter: &MessageFilter,
) -> AppResult<Vec<Message>> {
    let mut sql = String::from(
        "SELECT m.message_id, m.from_user_id, m.to_user_id, m.message_text, m.is_read, \
         m.created_at, from_user.login AS from_login, to_user.login AS to_login \
         FROM messages m \
         LEFT JOIN users from_user ON m.from_user_id = from_user.user_id \
         LEFT JOIN users to_user ON m.to_user_id = to_user.user_id \
         WHERE (m.from_user_id = $1 OR m.to_user_id = $1)",
    );
    let mut next_param = 1;

    if filter.unread_only {
        sql.push_str(" AND m.is_read = FALSE AND m.to_user_id = $1");
    }

    if filter.conversation_with.is_some() {
        next_param += 1;
        sql.push_str(&format!(
            " AND ((m.from_user_id = $1 AND m.to_user_id = ${next_param}) OR \
             (m.from_user_id = ${next_param} AND m.to_user_id = $1))"
        ));
    }

    if filter.after_message_id.is_some() {
        next_param += 1;
        sql.push_str(&format!(" AND m.message_id > ${next_param}"));
    }

    if filter.before_message_id.is_some() {
        next_param += 1;
        sql.push_str(&format!(" AND m.message_id < ${next_param}"));
    }

    next_param += 1;
    sql.push_str(&format!(" ORDER BY m.created_at DESC LIMIT ${next_param}"));

    let mut query = sqlx::query(&sql).bind(user_id);

    if let Some(other) = filter.conversation_with {
        query = query.bind(other);
    }

    if let Some(after) = filter.after_message_id {
        query = query.bind(after);
    }

    if let Some(before) = filter.before_message_id {
        query = query.bind(before);
    }

    let rows = query.bind(filter.limit).fetch_all(pool).await?;

    let messages = rows
        .iter()
        .map(Message::from_database_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(messages)
}

/// Total unread messages addressed to the user.
pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE to_user_id = $1 AND is_read = FALSE",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Flip `is_read` for the listed messages where the caller is the
/// recipient; other ids are silently ignored. Returns affected rows.
pub async fn mark_read(pool: &PgPool, message_ids: &[Uuid], user_id: Uuid) -> AppResult<u64> {
    if message_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE messages SET is_read = TRUE WHERE message_id = ANY($1) AND to_user_id = $2",
    )
    .bind(message_ids)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
