//! Input validation utilities: syntactic field checks, sanitization, and
//! the advisory injection/XSS heuristics applied by `security_clean`.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_LOGIN_LEN: usize = 3;
pub const MAX_LOGIN_LEN: usize = 50;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;
/// Authoritative message ceiling; matches the schema CHECK constraint.
pub const MAX_MESSAGE_LEN: usize = 4096;

// Compile regex patterns once at startup. These patterns are hardcoded and
// always valid, so expect() is acceptable here.
static LOGIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_]{3,50}$").expect("hardcoded login regex is invalid - fix source code")
});

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("hardcoded uuid regex is invalid - fix source code")
});

const SQL_KEYWORDS: [&str; 16] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "UNION", "OR", "AND", "WHERE", "FROM",
    "TABLE", "DATABASE", "ALTER", "CREATE", "EXEC", "SCRIPT",
];

const XSS_PATTERNS: [&str; 9] = [
    "<script",
    "javascript:",
    "onload=",
    "onerror=",
    "onclick=",
    "eval(",
    "alert(",
    "document.cookie",
    "<iframe",
];

/// Login: 3-50 characters, letters, digits and underscores only.
pub fn is_login_valid(login: &str) -> bool {
    LOGIN_REGEX.is_match(login)
}

/// Password: 6-128 characters with at least one letter and one digit.
pub fn is_password_valid(password: &str) -> bool {
    if password.len() < MIN_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return false;
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    has_letter && has_digit
}

/// Canonical 8-4-4-4-12 hex UUID form, case-insensitive.
pub fn is_uuid_valid(uuid: &str) -> bool {
    UUID_REGEX.is_match(uuid)
}

/// Non-empty and at most `max_len` characters.
pub fn is_message_length_valid(message: &str, max_len: usize) -> bool {
    !message.is_empty() && message.chars().count() <= max_len
}

/// Normalize untrusted input: drop NULs, collapse line/tab whitespace to a
/// single space, escape quote characters, trim the ends.
///
/// One-shot: applying it twice doubles the quote escaping, so callers
/// sanitize exactly once before persisting.
pub fn sanitize(input: &str) -> String {
    let mut sanitized = String::with_capacity(input.len());

    for c in input.chars() {
        match c {
            '\0' => {}
            '\n' | '\r' | '\t' => sanitized.push(' '),
            '\'' => sanitized.push_str("''"),
            '"' => sanitized.push_str("\\\""),
            '\\' => sanitized.push_str("\\\\"),
            _ => sanitized.push(c),
        }
    }

    sanitized.trim().to_string()
}

/// Advisory check for SQL keywords appearing as standalone words.
///
/// Word boundaries are non-alphanumeric neighbors other than `_`, so
/// `ORDER` does not trip `OR` but `1 OR 1` does.
pub fn looks_like_sql_injection(input: &str) -> bool {
    let upper = input.to_uppercase();
    let bytes = upper.as_bytes();

    for keyword in SQL_KEYWORDS {
        let mut pos = 0;
        while let Some(found) = upper[pos..].find(keyword) {
            let start = pos + found;
            let end = start + keyword.len();

            let left_boundary = start == 0 || is_word_boundary(bytes[start - 1]);
            let right_boundary = end >= bytes.len() || is_word_boundary(bytes[end]);

            if left_boundary && right_boundary {
                return true;
            }

            pos = end;
        }
    }

    false
}

/// Advisory substring check for common XSS payloads.
pub fn looks_like_xss(input: &str) -> bool {
    let lower = input.to_lowercase();
    XSS_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Sanitize, then reject input that still trips either heuristic.
///
/// An empty return value means rejection; callers must not persist it.
pub fn security_clean(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let sanitized = sanitize(input);
    if sanitized.is_empty() {
        return sanitized;
    }

    if looks_like_sql_injection(&sanitized) || looks_like_xss(&sanitized) {
        return String::new();
    }

    sanitized
}

fn is_word_boundary(byte: u8) -> bool {
    !(byte.is_ascii_alphanumeric() || byte == b'_')
}
