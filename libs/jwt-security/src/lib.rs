//! JWT issuance and validation for the chat server.
//!
//! Tokens are HS256-signed with a configured secret and carry the issuer
//! `nova-chat-server`. Access tokens embed the user id and login; refresh
//! tokens embed only the user id. Every verification consults the
//! in-process revocation set.

mod token_blacklist;

pub use token_blacklist::TokenBlacklist;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const ISSUER: &str = "nova-chat-server";

const MIN_SECRET_KEY_LENGTH: usize = 32;
const MIN_ACCESS_TOKEN_EXPIRY_MINUTES: u32 = 1;
const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: u32 = 525_600;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("token generation failed: {0}")]
    Generation(String),

    #[error("token verification failed: {0}")]
    Verification(String),
}

/// Claim set carried by both token kinds. `login` is present only on
/// access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "type")]
    token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    login: Option<String>,
}

/// Decoded, verified token contents.
#[derive(Debug, Clone)]
pub struct TokenPayload {
    pub user_id: String,
    pub login: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl TokenPayload {
    pub fn is_access_token(&self) -> bool {
        self.token_type == "access"
    }

    pub fn is_refresh_token(&self) -> bool {
        self.token_type == "refresh"
    }
}

pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: u32,
    refresh_token_expiry_days: u32,
    blacklist: TokenBlacklist,
}

impl JwtManager {
    pub fn new(
        secret_key: &str,
        access_token_expiry_minutes: u32,
        refresh_token_expiry_days: u32,
    ) -> Result<Self, JwtError> {
        if secret_key.is_empty() {
            return Err(JwtError::InvalidArgument(
                "secret key cannot be empty".into(),
            ));
        }

        if secret_key.len() < MIN_SECRET_KEY_LENGTH {
            warn!(
                "JWT secret key is too short (minimum {} characters recommended)",
                MIN_SECRET_KEY_LENGTH
            );
        }

        if access_token_expiry_minutes < MIN_ACCESS_TOKEN_EXPIRY_MINUTES {
            return Err(JwtError::InvalidArgument(
                "access token expiry too short".into(),
            ));
        }

        if access_token_expiry_minutes > MAX_ACCESS_TOKEN_EXPIRY_MINUTES {
            return Err(JwtError::InvalidArgument(
                "access token expiry too long".into(),
            ));
        }

        info!(
            "JwtManager initialized. Access token expiry: {} minutes, refresh token expiry: {} days",
            access_token_expiry_minutes, refresh_token_expiry_days
        );

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret_key.as_bytes()),
            access_token_expiry_minutes,
            refresh_token_expiry_days,
            blacklist: TokenBlacklist::new(),
        })
    }

    /// The configured access-token lifetime in seconds, as reported to
    /// clients in `expires_in`.
    pub fn access_expiry_seconds(&self) -> i64 {
        i64::from(self.access_token_expiry_minutes) * 60
    }

    pub fn generate_access_token(&self, user_id: &str, login: &str) -> Result<String, JwtError> {
        if user_id.is_empty() || login.is_empty() {
            return Err(JwtError::InvalidArgument(
                "user id and login cannot be empty".into(),
            ));
        }

        let now = Utc::now();
        let expires_at = now + Duration::minutes(i64::from(self.access_token_expiry_minutes));

        let claims = Claims {
            iss: ISSUER.to_string(),
            sub: "access".to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            user_id: user_id.to_string(),
            token_type: "access".to_string(),
            login: Some(login.to_string()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Generation(e.to_string()))?;

        debug!("Generated access token for user: {} ({})", user_id, login);
        Ok(token)
    }

    pub fn generate_refresh_token(&self, user_id: &str) -> Result<String, JwtError> {
        if user_id.is_empty() {
            return Err(JwtError::InvalidArgument("user id cannot be empty".into()));
        }

        let now = Utc::now();
        let expires_at = now + Duration::hours(24 * i64::from(self.refresh_token_expiry_days));

        let claims = Claims {
            iss: ISSUER.to_string(),
            sub: "refresh".to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            user_id: user_id.to_string(),
            token_type: "refresh".to_string(),
            login: None,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Generation(e.to_string()))?;

        debug!("Generated refresh token for user: {}", user_id);
        Ok(token)
    }

    /// Verify signature, issuer and expiry, then decode the claims.
    ///
    /// Empty and revoked tokens fail with [`JwtError::InvalidArgument`];
    /// every other failure is [`JwtError::Verification`].
    pub fn verify_and_decode(&self, token: &str) -> Result<TokenPayload, JwtError> {
        if token.is_empty() {
            return Err(JwtError::InvalidArgument("token is empty".into()));
        }

        if self.is_revoked(token) {
            return Err(JwtError::InvalidArgument("token is revoked".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| JwtError::Verification(e.to_string()))?;

        let expires_at = DateTime::<Utc>::from_timestamp(data.claims.exp, 0)
            .ok_or_else(|| JwtError::Verification("expiry out of range".into()))?;

        debug!("Token verified for user: {}", data.claims.user_id);

        Ok(TokenPayload {
            user_id: data.claims.user_id,
            login: data.claims.login.unwrap_or_default(),
            token_type: data.claims.token_type,
            expires_at,
            is_valid: true,
        })
    }

    /// Add a token to the revocation set. Tokens whose expiry cannot be
    /// read are logged and skipped; revocation never fails outward.
    pub fn revoke(&self, token: &str) {
        if token.is_empty() {
            return;
        }

        match token_expiry(token) {
            Ok(expires_at) => self.blacklist.insert(token, expires_at),
            Err(e) => warn!("Failed to blacklist token: {}", e),
        }
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.blacklist.contains(token)
    }

    /// Drop expired revocation entries. Scheduled periodically by the
    /// server.
    pub fn sweep(&self) -> usize {
        self.blacklist.sweep()
    }

    #[cfg(test)]
    pub(crate) fn blacklist(&self) -> &TokenBlacklist {
        &self.blacklist
    }
}

/// Extract the `exp` claim without verifying the signature.
///
/// Parses only the payload segment, the same way the revocation path needs
/// it for tokens that may no longer verify.
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, JwtError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(JwtError::InvalidArgument("invalid JWT format".into()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| JwtError::InvalidArgument(format!("failed to decode JWT payload: {e}")))?;

    let claims: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| JwtError::InvalidArgument(format!("failed to parse JWT claims: {e}")))?;

    let exp = claims
        .get("exp")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| JwtError::InvalidArgument("token does not have an expiration claim".into()))?;

    DateTime::<Utc>::from_timestamp(exp, 0)
        .ok_or_else(|| JwtError::InvalidArgument("expiration claim out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "unit-test-secret-key-0123456789abcdef";

    fn manager() -> JwtManager {
        JwtManager::new(TEST_SECRET, 15, 7).expect("manager construction")
    }

    #[test]
    fn test_construction_bounds() {
        assert!(JwtManager::new("", 15, 7).is_err());
        assert!(JwtManager::new(TEST_SECRET, 0, 7).is_err());
        assert!(JwtManager::new(TEST_SECRET, 525_601, 7).is_err());
        assert!(JwtManager::new(TEST_SECRET, 1, 7).is_ok());
        assert!(JwtManager::new(TEST_SECRET, 525_600, 7).is_ok());
        // A short secret warns but does not fail.
        assert!(JwtManager::new("short", 15, 7).is_ok());
    }

    #[test]
    fn test_access_token_round_trip() {
        let jwt = manager();
        let token = jwt
            .generate_access_token("7d7e8e2a-9c39-4a84-9461-0c7dd8296e7b", "alice")
            .unwrap();
        assert_eq!(token.matches('.').count(), 2);

        let payload = jwt.verify_and_decode(&token).unwrap();
        assert_eq!(payload.user_id, "7d7e8e2a-9c39-4a84-9461-0c7dd8296e7b");
        assert_eq!(payload.login, "alice");
        assert_eq!(payload.token_type, "access");
        assert!(payload.is_valid);
        assert!(payload.is_access_token());
        assert!(!payload.is_refresh_token());
    }

    #[test]
    fn test_refresh_token_shape() {
        let jwt = manager();
        let token = jwt.generate_refresh_token("user-1").unwrap();

        let payload = jwt.verify_and_decode(&token).unwrap();
        assert_eq!(payload.user_id, "user-1");
        assert!(payload.login.is_empty());
        assert!(payload.is_refresh_token());
    }

    #[test]
    fn test_refresh_expiry_exceeds_access_expiry() {
        let jwt = manager();
        let access = jwt.generate_access_token("user-1", "alice").unwrap();
        let refresh = jwt.generate_refresh_token("user-1").unwrap();

        let access_exp = jwt.verify_and_decode(&access).unwrap().expires_at;
        let refresh_exp = jwt.verify_and_decode(&refresh).unwrap().expires_at;
        assert!(refresh_exp > access_exp);
    }

    #[test]
    fn test_generation_rejects_empty_arguments() {
        let jwt = manager();
        assert!(matches!(
            jwt.generate_access_token("", "alice"),
            Err(JwtError::InvalidArgument(_))
        ));
        assert!(matches!(
            jwt.generate_access_token("user-1", ""),
            Err(JwtError::InvalidArgument(_))
        ));
        assert!(matches!(
            jwt.generate_refresh_token(""),
            Err(JwtError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_verify_rejects_empty_and_garbage() {
        let jwt = manager();
        assert!(matches!(
            jwt.verify_and_decode(""),
            Err(JwtError::InvalidArgument(_))
        ));
        assert!(matches!(
            jwt.verify_and_decode("not.a.token"),
            Err(JwtError::Verification(_))
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_token() {
        let jwt = manager();
        let token = jwt.generate_access_token("user-1", "alice").unwrap();
        let tampered = format!("{}x", token);
        assert!(jwt.verify_and_decode(&tampered).is_err());
    }

    #[test]
    fn test_verify_rejects_foreign_signature() {
        let jwt = manager();
        let other = JwtManager::new("another-secret-key-0123456789abcdef!!", 15, 7).unwrap();
        let token = other.generate_access_token("user-1", "alice").unwrap();
        assert!(matches!(
            jwt.verify_and_decode(&token),
            Err(JwtError::Verification(_))
        ));
    }

    #[test]
    fn test_revocation_blocks_verification() {
        let jwt = manager();
        let token = jwt.generate_access_token("user-1", "alice").unwrap();

        assert!(!jwt.is_revoked(&token));
        jwt.revoke(&token);
        assert!(jwt.is_revoked(&token));
        assert!(matches!(
            jwt.verify_and_decode(&token),
            Err(JwtError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_revoke_empty_token_is_noop() {
        let jwt = manager();
        jwt.revoke("");
        assert!(jwt.blacklist().is_empty());
    }

    #[test]
    fn test_sweep_clears_expired_revocations() {
        let jwt = manager();
        let token = jwt.generate_access_token("user-1", "alice").unwrap();

        // Force an already-expired entry to observe the sweep behavior.
        jwt.blacklist()
            .insert(&token, Utc::now() - Duration::seconds(1));
        assert!(!jwt.is_revoked(&token));
        assert_eq!(jwt.sweep(), 1);
        assert!(jwt.blacklist().is_empty());
    }

    #[test]
    fn test_token_expiry_without_verification() {
        let jwt = manager();
        let token = jwt.generate_access_token("user-1", "alice").unwrap();

        let expiry = token_expiry(&token).unwrap();
        assert!(expiry > Utc::now());
    }

    #[test]
    fn test_token_expiry_missing_claim() {
        // Payload {"sub":"x"} has no exp claim.
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"x"}"#);
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig");
        assert!(matches!(
            token_expiry(&token),
            Err(JwtError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_token_expiry_malformed_input() {
        assert!(token_expiry("only.two").is_err());
        assert!(token_expiry("a.!!!.c").is_err());
    }
}
