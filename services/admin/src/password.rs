//! One-way password hashing
//!
//! Digests are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`) so
//! every stored record carries its own salt and cost parameters.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use std::sync::OnceLock;
use tracing::error;

use crate::error::{GateError, GateResult};

/// Hash a plaintext password with a fresh random salt
pub fn hash_password(plaintext: &str) -> GateResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let digest = argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| GateError::Internal(format!("Failed to hash password: {}", e)))?
        .to_string();
    Ok(digest)
}

/// Constant-time comparison of `plaintext` against a stored digest
///
/// An unparseable digest verifies as `false`.
pub fn verify_password(digest: &str, plaintext: &str) -> bool {
    let parsed_hash = match PasswordHash::new(digest) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Failed to parse password hash: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Burn one verification against a throwaway digest
///
/// Called when the username is unknown so that the response time matches a
/// wrong-password attempt.
pub fn verify_dummy(plaintext: &str) {
    static DUMMY_DIGEST: OnceLock<Option<String>> = OnceLock::new();
    let digest = DUMMY_DIGEST.get_or_init(|| hash_password("admin-gate-dummy-password").ok());
    if let Some(digest) = digest {
        let _ = verify_password(digest, plaintext);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let digest = hash_password("123456").unwrap();
        assert!(digest.starts_with("$argon2"));
        assert!(verify_password(&digest, "123456"));
        assert!(!verify_password(&digest, "1234567"));
        assert!(!verify_password(&digest, ""));
    }

    #[test]
    fn salts_differ() {
        let a = hash_password("secret").unwrap();
        let b = hash_password("secret").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "secret") && verify_password(&b, "secret"));
    }

    #[test]
    fn garbage_digest_never_verifies() {
        assert!(!verify_password("not-a-phc-string", "123456"));
        verify_dummy("123456");
    }
}
