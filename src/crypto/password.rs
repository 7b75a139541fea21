//! One-way hashing for account passwords and device API keys.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use anyhow::anyhow;

/// Argon2id with a fresh per-call salt; the PHC output string embeds the
/// salt and work parameters.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// `Ok(false)` means wrong password. `Err` means the stored hash itself
/// does not parse, which is an internal-error condition, never something
/// to show a caller.
pub fn verify_password(hash: &str, password: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("stored hash is invalid: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_correct_password() {
        let hash = hash_password("Sunny1day").unwrap();
        assert!(verify_password(&hash, "Sunny1day").unwrap());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("Sunny1day").unwrap();
        assert!(!verify_password(&hash, "Rainy1day").unwrap());
    }

    #[test]
    fn salts_differ_between_calls() {
        let a = hash_password("Sunny1day").unwrap();
        let b = hash_password("Sunny1day").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_stored_hash_is_an_error() {
        assert!(verify_password("", "Sunny1day").is_err());
        assert!(verify_password("not-a-phc-string", "Sunny1day").is_err());
    }
}
