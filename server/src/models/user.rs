use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::ModelError;
use crate::validators;

/// A registered account. `password_hash` never leaves the process through
/// any JSON envelope.
#[derive(Debug, Clone, Default)]
pub struct User {
    user_id: Option<Uuid>,
    login: String,
    password_hash: String,
    created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Canonical factory: validate credentials, hash the password and
    /// assign a fresh identity.
    pub fn create_from_credentials(login: &str, password: &str) -> Result<Self, ModelError> {
        let mut user = User::default();
        user.set_login(login)?;
        user.set_password(password)?;
        user.user_id = Some(Uuid::new_v4());
        Ok(user)
    }

    /// Build a user from a JSON object carrying either `{login, password}`
    /// or `{login, password_hash}`.
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let mut user = User::default();

        if let Some(id) = value.get("user_id").filter(|v| !v.is_null()) {
            let id = id
                .as_str()
                .ok_or_else(|| ModelError::Parse("user_id must be a string".into()))?;
            user.user_id = Some(
                Uuid::parse_str(id)
                    .map_err(|e| ModelError::Parse(format!("invalid user_id: {e}")))?,
            );
        }

        if let Some(login) = value.get("login").and_then(Value::as_str) {
            user.set_login(login)?;
        }

        if let Some(password) = value.get("password").and_then(Value::as_str) {
            user.set_password(password)?;
        }

        if let Some(hash) = value.get("password_hash").and_then(Value::as_str) {
            user.password_hash = hash.to_string();
        }

        if let Some(created_at) = value.get("created_at").and_then(Value::as_str) {
            user.created_at = Some(
                DateTime::parse_from_rfc3339(created_at)
                    .map_err(|e| ModelError::Parse(format!("invalid created_at: {e}")))?
                    .with_timezone(&Utc),
            );
        }

        if !user.is_valid() {
            return Err(ModelError::Invalid("user failed validation".into()));
        }

        Ok(user)
    }

    /// Map a directory row (`user_id`, `login`, `created_at`, optionally
    /// `password_hash`).
    pub fn from_database_row(row: &PgRow) -> Result<Self, ModelError> {
        let user_id: Uuid = row
            .try_get("user_id")
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        let login: String = row
            .try_get("login")
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        let password_hash: String = row.try_get("password_hash").unwrap_or_default();

        if login.is_empty() {
            return Err(ModelError::Invalid("user row has empty login".into()));
        }

        Ok(User {
            user_id: Some(user_id),
            login,
            password_hash,
            created_at: Some(created_at),
        })
    }

    /// JSON projection; exposes only the public identity.
    pub fn to_json(&self) -> Value {
        let mut json = json!({ "login": self.login });

        if let Some(id) = self.user_id {
            json["user_id"] = json!(id.to_string());
        }

        json
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn set_login(&mut self, login: &str) -> Result<(), ModelError> {
        if !validators::is_login_valid(login) {
            return Err(ModelError::InvalidArgument("invalid login format".into()));
        }

        self.login = login.to_string();
        Ok(())
    }

    /// Validate strength, then store the hash of the password.
    pub fn set_password(&mut self, password: &str) -> Result<(), ModelError> {
        if !validators::is_password_valid(password) {
            return Err(ModelError::InvalidArgument("invalid password format".into()));
        }

        self.password_hash = crypto_core::hash_password(password, "")
            .map_err(|e| ModelError::InvalidArgument(e.to_string()))?;
        Ok(())
    }

    pub fn set_password_hash(&mut self, hash: String) {
        self.password_hash = hash;
    }

    pub fn verify_password(&self, password: &str) -> bool {
        crypto_core::verify_password(password, &self.password_hash, "")
    }

    pub fn is_valid(&self) -> bool {
        validators::is_login_valid(&self.login) && !self.password_hash.is_empty()
    }

    /// Legacy SQL generator kept for parity with the reference
    /// implementation; the runtime path binds parameters instead.
    pub fn generate_insert_sql(&self) -> String {
        let mut columns = String::from("login, password_hash");
        let mut values = format!("'{}', '{}'", self.login, self.password_hash);

        if let Some(id) = self.user_id {
            columns.push_str(", user_id");
            values.push_str(&format!(", '{id}'"));
        }

        format!("INSERT INTO users ({columns}) VALUES ({values})")
    }

    /// Legacy SQL generator kept for parity with the reference
    /// implementation; the runtime path binds parameters instead.
    pub fn generate_update_sql(&self) -> Result<String, ModelError> {
        let id = self
            .user_id
            .ok_or_else(|| ModelError::InvalidArgument("cannot generate update SQL without id".into()))?;

        Ok(format!(
            "UPDATE users SET login = '{}', password_hash = '{}' WHERE user_id = '{}'",
            self.login, self.password_hash, id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_from_credentials() {
        let user = User::create_from_credentials("alice", "Secret1").unwrap();

        assert!(user.user_id().is_some());
        assert_eq!(user.login(), "alice");
        assert!(!user.password_hash().is_empty());
        assert!(user.is_valid());
        assert!(user.verify_password("Secret1"));
        assert!(!user.verify_password("Secret2"));
    }

    #[test]
    fn test_create_rejects_invalid_credentials() {
        assert!(User::create_from_credentials("al", "Secret1").is_err());
        assert!(User::create_from_credentials("alice", "short").is_err());
        assert!(User::create_from_credentials("alice", "lettersonly").is_err());
    }

    #[test]
    fn test_to_json_never_exposes_password_material() {
        let user = User::create_from_credentials("alice", "Secret1").unwrap();
        let json = user.to_json();

        assert_eq!(json["login"], "alice");
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_from_json_with_password() {
        let user = User::from_json(&json!({ "login": "alice", "password": "Secret1" })).unwrap();
        assert!(user.verify_password("Secret1"));

        // to_json(from_json(..)) must not leak credentials either.
        let round = user.to_json();
        assert!(round.get("password").is_none());
        assert!(round.get("password_hash").is_none());
    }

    #[test]
    fn test_from_json_with_password_hash() {
        let hash = crypto_core::hash_password("Secret1", "").unwrap();
        let user =
            User::from_json(&json!({ "login": "alice", "password_hash": hash })).unwrap();
        assert!(user.verify_password("Secret1"));
    }

    #[test]
    fn test_from_json_rejects_incomplete_objects() {
        assert!(User::from_json(&json!({ "login": "alice" })).is_err());
        assert!(User::from_json(&json!({ "password": "Secret1" })).is_err());
        assert!(User::from_json(&json!({ "login": "!bad!", "password": "Secret1" })).is_err());
    }

    #[test]
    fn test_generate_insert_sql_shapes() {
        let mut user = User::default();
        user.set_login("alice").unwrap();
        user.set_password("Secret1").unwrap();

        assert!(!user.generate_insert_sql().contains("user_id"));
        assert!(user.generate_update_sql().is_err());

        let user = User::create_from_credentials("alice", "Secret1").unwrap();
        let sql = user.generate_insert_sql();
        assert!(sql.starts_with("INSERT INTO users (login, password_hash, user_id)"));
        assert!(user.generate_update_sql().unwrap().starts_with("UPDATE users SET"));
    }
}
