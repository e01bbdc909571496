use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HasherError {
    #[error("password cannot be empty")]
    EmptyPassword,
}

/// Compute the MD5 digest of the input as lowercase hex.
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Compute the SHA-256 digest of the input as lowercase hex.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a password for storage.
///
/// With an empty salt this is unsalted MD5, the legacy scheme existing
/// deployments persisted, kept so stored hashes keep verifying. With a salt
/// it is SHA-256 over `password || salt`.
pub fn hash_password(password: &str, salt: &str) -> Result<String, HasherError> {
    if password.is_empty() {
        return Err(HasherError::EmptyPassword);
    }

    if salt.is_empty() {
        Ok(md5_hex(password))
    } else {
        Ok(sha256_hex(&format!("{password}{salt}")))
    }
}

/// Verify a password against a stored hex hash.
///
/// Recomputes the hash with the same scheme selection as [`hash_password`]
/// and compares in constant time. An empty password or empty stored hash is
/// never valid.
pub fn verify_password(password: &str, stored_hash: &str, salt: &str) -> bool {
    if password.is_empty() || stored_hash.is_empty() {
        return false;
    }

    let computed = if salt.is_empty() {
        md5_hex(password)
    } else {
        sha256_hex(&format!("{password}{salt}"))
    };

    constant_time_eq(computed.as_bytes(), stored_hash.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(md5_hex("password"), "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex("hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hex_is_lowercase() {
        let digest = sha256_hex("Nova");
        assert_eq!(digest, digest.to_lowercase());
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_hash_empty_password_fails() {
        assert!(matches!(
            hash_password("", "salt"),
            Err(HasherError::EmptyPassword)
        ));
        assert!(matches!(hash_password("", ""), Err(HasherError::EmptyPassword)));
    }

    #[test]
    fn test_unsalted_hash_is_md5() {
        let hash = hash_password("Secret1", "").unwrap();
        assert_eq!(hash, md5_hex("Secret1"));
    }

    #[test]
    fn test_salted_hash_is_sha256() {
        let hash = hash_password("Secret1", "pepper").unwrap();
        assert_eq!(hash, sha256_hex("Secret1pepper"));
        assert_ne!(hash, hash_password("Secret1", "").unwrap());
    }

    #[test]
    fn test_verify_round_trip() {
        for (password, salt) in [("a", ""), ("Secret1", ""), ("Secret1", "salt"), ("p@ss w0rd", "s")] {
            let hash = hash_password(password, salt).unwrap();
            assert!(verify_password(password, &hash, salt), "{password:?}/{salt:?}");
        }
    }

    #[test]
    fn test_verify_rejects_wrong_password() {
        let hash = hash_password("Secret1", "").unwrap();
        assert!(!verify_password("Secret2", &hash, ""));
        assert!(!verify_password("Secret1", &hash, "unexpected-salt"));
    }

    #[test]
    fn test_verify_empty_inputs() {
        let hash = hash_password("Secret1", "").unwrap();
        assert!(!verify_password("", &hash, ""));
        assert!(!verify_password("Secret1", "", ""));
    }

    #[test]
    fn test_constant_time_eq_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"abc", b"abc"));
    }
}
