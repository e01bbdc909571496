use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::ModelError;
use crate::validators::{self, MAX_MESSAGE_LEN};

/// A point-to-point message. `from_login`/`to_login` are display-only
/// enrichments joined in at read time.
#[derive(Debug, Clone, Default)]
pub struct Message {
    message_id: Option<Uuid>,
    from_user_id: Option<Uuid>,
    to_user_id: Option<Uuid>,
    from_login: Option<String>,
    to_login: Option<String>,
    message_text: String,
    is_read: bool,
    created_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Canonical factory: sanitize the text, validate the invariants and
    /// assign a fresh identity and timestamp.
    pub fn create(from_user_id: Uuid, to_user_id: Uuid, text: &str) -> Result<Self, ModelError> {
        let mut message = Message {
            from_user_id: Some(from_user_id),
            to_user_id: Some(to_user_id),
            ..Message::default()
        };
        message.set_message_text(text)?;
        message.message_id = Some(Uuid::new_v4());
        message.created_at = Some(Utc::now());

        if !message.is_valid() {
            return Err(ModelError::Invalid("message failed validation".into()));
        }

        Ok(message)
    }

    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let mut message = Message::default();

        message.message_id = parse_optional_uuid(value, "message_id")?;
        message.from_user_id = parse_optional_uuid(value, "from_user_id")?;
        message.to_user_id = parse_optional_uuid(value, "to_user_id")?;

        if let Some(login) = value.get("from_login").and_then(Value::as_str) {
            message.from_login = Some(login.to_string());
        }

        if let Some(login) = value.get("to_login").and_then(Value::as_str) {
            message.to_login = Some(login.to_string());
        }

        if let Some(text) = value.get("message_text").and_then(Value::as_str) {
            message.set_message_text(text)?;
        }

        if let Some(is_read) = value.get("is_read").and_then(Value::as_bool) {
            message.is_read = is_read;
        }

        if let Some(created_at) = value.get("created_at").and_then(Value::as_str) {
            message.created_at = Some(
                DateTime::parse_from_rfc3339(created_at)
                    .map_err(|e| ModelError::Parse(format!("invalid created_at: {e}")))?
                    .with_timezone(&Utc),
            );
        }

        if !message.is_valid() {
            return Err(ModelError::Invalid("message failed validation".into()));
        }

        Ok(message)
    }

    /// Map a message row with joined `from_login`/`to_login` columns.
    pub fn from_database_row(row: &PgRow) -> Result<Self, ModelError> {
        let message = Message {
            message_id: Some(
                row.try_get("message_id")
                    .map_err(|e| ModelError::Parse(e.to_string()))?,
            ),
            from_user_id: Some(
                row.try_get("from_user_id")
                    .map_err(|e| ModelError::Parse(e.to_string()))?,
            ),
            to_user_id: Some(
                row.try_get("to_user_id")
                    .map_err(|e| ModelError::Parse(e.to_string()))?,
            ),
            from_login: row.try_get("from_login").ok(),
            to_login: row.try_get("to_login").ok(),
            message_text: row
                .try_get("message_text")
                .map_err(|e| ModelError::Parse(e.to_string()))?,
            is_read: row
                .try_get("is_read")
                .map_err(|e| ModelError::Parse(e.to_string()))?,
            created_at: Some(
                row.try_get("created_at")
                    .map_err(|e| ModelError::Parse(e.to_string()))?,
            ),
        };

        if !message.is_valid() {
            return Err(ModelError::Invalid("invalid message data in database row".into()));
        }

        Ok(message)
    }

    pub fn to_json(&self) -> Value {
        let mut json = json!({
            "from_user_id": self.from_user_id.map(|id| id.to_string()),
            "to_user_id": self.to_user_id.map(|id| id.to_string()),
            "from_login": self.from_login,
            "to_login": self.to_login,
            "message_text": self.message_text,
            "is_read": self.is_read,
            "created_at": self
                .created_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        });

        if let Some(id) = self.message_id {
            json["message_id"] = json!(id.to_string());
        }

        json
    }

    pub fn message_id(&self) -> Option<Uuid> {
        self.message_id
    }

    pub fn from_user_id(&self) -> Option<Uuid> {
        self.from_user_id
    }

    pub fn to_user_id(&self) -> Option<Uuid> {
        self.to_user_id
    }

    pub fn from_login(&self) -> Option<&str> {
        self.from_login.as_deref()
    }

    pub fn to_login(&self) -> Option<&str> {
        self.to_login.as_deref()
    }

    pub fn message_text(&self) -> &str {
        &self.message_text
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Sanitize and store the message body.
    ///
    /// Fails when the raw text is empty or too long, and when the cleaned
    /// text ends up empty (rejected content) or expands past the ceiling.
    pub fn set_message_text(&mut self, text: &str) -> Result<(), ModelError> {
        if !validators::is_message_length_valid(text, MAX_MESSAGE_LEN) {
            return Err(ModelError::InvalidArgument("invalid message length".into()));
        }

        let cleaned = validators::security_clean(text);
        if cleaned.is_empty() {
            return Err(ModelError::InvalidArgument(
                "message contains dangerous content".into(),
            ));
        }

        if !validators::is_message_length_valid(&cleaned, MAX_MESSAGE_LEN) {
            return Err(ModelError::InvalidArgument("invalid message length".into()));
        }

        self.message_text = cleaned;
        Ok(())
    }

    pub fn mark_as_read(&mut self) {
        self.is_read = true;
    }

    pub fn is_from_user(&self, user_id: Uuid) -> bool {
        self.from_user_id == Some(user_id)
    }

    pub fn is_to_user(&self, user_id: Uuid) -> bool {
        self.to_user_id == Some(user_id)
    }

    pub fn is_valid(&self) -> bool {
        let (Some(from), Some(to)) = (self.from_user_id, self.to_user_id) else {
            return false;
        };

        if from == to {
            return false;
        }

        if let (Some(from_login), Some(to_login)) = (&self.from_login, &self.to_login) {
            if from_login == to_login {
                return false;
            }
        }

        validators::is_message_length_valid(&self.message_text, MAX_MESSAGE_LEN)
    }

    /// Legacy SQL generator kept for parity with the reference
    /// implementation; the runtime path binds parameters instead.
    pub fn generate_insert_sql(&self) -> String {
        let from = uuid_or_empty(self.from_user_id);
        let to = uuid_or_empty(self.to_user_id);

        let mut columns = String::from("from_user_id, to_user_id, message_text");
        let mut values = format!("'{}', '{}', '{}'", from, to, self.message_text);

        if let Some(id) = self.message_id {
            columns.push_str(", message_id");
            values.push_str(&format!(", '{id}'"));
        }

        format!(
            "INSERT INTO messages ({columns}, is_read) VALUES ({values}, {})",
            if self.is_read { "TRUE" } else { "FALSE" }
        )
    }

    /// Legacy SQL generator kept for parity with the reference
    /// implementation; the runtime path binds parameters instead.
    pub fn generate_update_sql(&self) -> Result<String, ModelError> {
        let id = self.message_id.ok_or_else(|| {
            ModelError::InvalidArgument("cannot generate update SQL without id".into())
        })?;

        Ok(format!(
            "UPDATE messages SET from_user_id = '{}', to_user_id = '{}', message_text = '{}', is_read = {} WHERE message_id = '{}'",
            uuid_or_empty(self.from_user_id),
            uuid_or_empty(self.to_user_id),
            self.message_text,
            if self.is_read { "TRUE" } else { "FALSE" },
            id
        ))
    }
}

fn parse_optional_uuid(value: &Value, key: &str) -> Result<Option<Uuid>, ModelError> {
    match value.get(key).filter(|v| !v.is_null()) {
        Some(raw) => {
            let raw = raw
                .as_str()
                .ok_or_else(|| ModelError::Parse(format!("{key} must be a string")))?;
            Uuid::parse_str(raw)
                .map(Some)
                .map_err(|e| ModelError::Parse(format!("invalid {key}: {e}")))
        }
        None => Ok(None),
    }
}

fn uuid_or_empty(id: Option<Uuid>) -> String {
    id.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn test_create_message() {
        let (from, to) = (sender(), sender());
        let message = Message::create(from, to, "hello there").unwrap();

        assert!(message.message_id().is_some());
        assert!(message.created_at().is_some());
        assert_eq!(message.message_text(), "hello there");
        assert!(!message.is_read());
        assert!(message.is_from_user(from));
        assert!(message.is_to_user(to));
        assert!(message.is_valid());
    }

    #[test]
    fn test_create_rejects_self_send() {
        let user = sender();
        assert!(Message::create(user, user, "hi").is_err());
    }

    #[test]
    fn test_set_message_text_sanitizes() {
        let mut message = Message::create(sender(), sender(), "placeholder").unwrap();
        message.set_message_text("it's\nfine").unwrap();
        assert_eq!(message.message_text(), "it''s fine");
    }

    #[test]
    fn test_set_message_text_rejects_dangerous_content() {
        let mut message = Message::create(sender(), sender(), "placeholder").unwrap();
        assert!(message.set_message_text("<script>x</script>").is_err());
        assert!(message.set_message_text("1 OR 1=1").is_err());
        assert!(message.set_message_text("").is_err());
        assert!(message.set_message_text(&"x".repeat(4097)).is_err());
    }

    #[test]
    fn test_set_message_text_rejects_expansion_past_ceiling() {
        let mut message = Message::create(sender(), sender(), "placeholder").unwrap();
        // 4096 raw chars that double under quote escaping.
        assert!(message.set_message_text(&"'".repeat(4096)).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let message = Message::create(sender(), sender(), "hello").unwrap();
        let json = message.to_json();
        let parsed = Message::from_json(&json).unwrap();

        assert_eq!(parsed.message_id(), message.message_id());
        assert_eq!(parsed.from_user_id(), message.from_user_id());
        assert_eq!(parsed.to_user_id(), message.to_user_id());
        assert_eq!(parsed.message_text(), message.message_text());
        assert_eq!(parsed.is_read(), message.is_read());
        // Serialization carries microsecond precision, like the store.
        assert_eq!(
            parsed.created_at().map(|t| t.timestamp_micros()),
            message.created_at().map(|t| t.timestamp_micros())
        );
    }

    #[test]
    fn test_from_json_rejects_matching_participants() {
        let user = sender().to_string();
        let result = Message::from_json(&json!({
            "from_user_id": user,
            "to_user_id": user,
            "message_text": "hi",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_rejects_matching_logins() {
        let result = Message::from_json(&json!({
            "from_user_id": sender().to_string(),
            "to_user_id": sender().to_string(),
            "from_login": "alice",
            "to_login": "alice",
            "message_text": "hi",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_rejects_bad_uuid() {
        let result = Message::from_json(&json!({
            "from_user_id": "not-a-uuid",
            "to_user_id": sender().to_string(),
            "message_text": "hi",
        }));
        assert!(matches!(result, Err(ModelError::Parse(_))));
    }

    #[test]
    fn test_mark_as_read() {
        let mut message = Message::create(sender(), sender(), "hello").unwrap();
        assert!(!message.is_read());
        message.mark_as_read();
        assert!(message.is_read());
    }

    #[test]
    fn test_generate_insert_sql_shape() {
        let message = Message::create(sender(), sender(), "hello").unwrap();
        let sql = message.generate_insert_sql();
        assert!(sql.starts_with(
            "INSERT INTO messages (from_user_id, to_user_id, message_text, message_id, is_read)"
        ));
        assert!(sql.ends_with(", FALSE)"));
    }
}
