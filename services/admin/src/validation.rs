//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// A field that failed one rule; the rule key is translated on render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{field} violates rule {rule}")]
pub struct ValidationError {
    pub field: &'static str,
    pub rule: &'static str,
}

impl ValidationError {
    pub fn new(field: &'static str, rule: &'static str) -> Self {
        Self { field, rule }
    }
}

pub type ValidationResult = Result<(), ValidationError>;

fn char_len_between(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> ValidationResult {
    let len = value.chars().count();
    if len == 0 && min > 0 {
        return Err(ValidationError::new(field, "required"));
    }
    if len < min || len > max {
        return Err(ValidationError::new(field, "length"));
    }
    Ok(())
}

/// Validate username: 2-20 ASCII letters or digits
pub fn validate_username(username: &str) -> ValidationResult {
    char_len_between("username", username, 2, 20)?;

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("Failed to compile username regex"));

    if !regex.is_match(username) {
        return Err(ValidationError::new("username", "alphanumeric"));
    }

    Ok(())
}

/// Validate password: at least 6 characters
pub fn validate_password(field: &'static str, password: &str) -> ValidationResult {
    if password.is_empty() {
        return Err(ValidationError::new(field, "required"));
    }
    if password.chars().count() < 6 {
        return Err(ValidationError::new(field, "min_length"));
    }
    Ok(())
}

/// Validate role keyword: 1-20 of `[A-Za-z0-9_]`
pub fn validate_keyword(keyword: &str) -> ValidationResult {
    char_len_between("keyword", keyword, 1, 20)?;

    static KEYWORD_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = KEYWORD_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Failed to compile keyword regex"));

    if !regex.is_match(keyword) {
        return Err(ValidationError::new("keyword", "keyword"));
    }

    Ok(())
}

/// Validate a display name (role name, menu name)
pub fn validate_name(field: &'static str, name: &str) -> ValidationResult {
    char_len_between(field, name, 1, 20)
}

pub fn validate_rank(sort: i32) -> ValidationResult {
    if sort < 1 {
        return Err(ValidationError::new("sort", "range"));
    }
    Ok(())
}

pub fn validate_status(status: i16) -> ValidationResult {
    match status {
        1 | 2 => Ok(()),
        _ => Err(ValidationError::new("status", "one_of")),
    }
}

pub fn validate_method(method: &str) -> ValidationResult {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" => Ok(()),
        _ => Err(ValidationError::new("method", "one_of")),
    }
}

pub fn validate_path(path: &str) -> ValidationResult {
    if path.is_empty() {
        return Err(ValidationError::new("path", "required"));
    }
    if !path.starts_with('/') {
        return Err(ValidationError::new("path", "path"));
    }
    Ok(())
}

pub fn validate_ids(field: &'static str, ids: &[i64]) -> ValidationResult {
    if ids.is_empty() {
        return Err(ValidationError::new(field, "required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("admin").is_ok());
        assert!(validate_username("a1").is_ok());
        assert_eq!(
            validate_username(""),
            Err(ValidationError::new("username", "required"))
        );
        assert_eq!(
            validate_username("a"),
            Err(ValidationError::new("username", "length"))
        );
        assert!(validate_username("abcdefghijklmnopqrstu").is_err());
        assert_eq!(
            validate_username("bad_name"),
            Err(ValidationError::new("username", "alphanumeric"))
        );
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password", "123456").is_ok());
        assert_eq!(
            validate_password("password", "12345"),
            Err(ValidationError::new("password", "min_length"))
        );
        assert_eq!(
            validate_password("newPassword", ""),
            Err(ValidationError::new("newPassword", "required"))
        );
    }

    #[test]
    fn test_validate_keyword() {
        assert!(validate_keyword("ops_team").is_ok());
        assert!(validate_keyword("ops-team").is_err());
        assert!(validate_keyword("").is_err());
    }

    #[test]
    fn test_validate_api_fields() {
        assert!(validate_method("get").is_ok());
        assert!(validate_method("HEAD").is_err());
        assert!(validate_path("/admin/list").is_ok());
        assert!(validate_path("admin/list").is_err());
        assert!(validate_rank(0).is_err());
        assert!(validate_status(3).is_err());
    }
}
