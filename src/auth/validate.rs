//! Field validators for the public auth endpoints. Errors are collected
//! per field; an empty map means the request shape is acceptable.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

pub type FieldErrors = BTreeMap<&'static str, String>;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

pub fn validate_registration(name: &str, email: &str, password: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if email.is_empty() {
        errors.insert("email", "Email is required.".into());
    } else if email.len() < 5 || email.len() > 50 {
        errors.insert("email", "Email must be between 5 and 50 characters.".into());
    } else if !EMAIL_RE.is_match(email) {
        errors.insert("email", "Email is not valid.".into());
    }

    if let Some(message) = password_error(password) {
        errors.insert("password", message);
    }

    if name.is_empty() {
        errors.insert("username", "Username is required.".into());
    } else if name.len() < 3 || name.len() > 20 {
        errors.insert(
            "username",
            "Username must be between 3 and 20 characters.".into(),
        );
    } else if !USERNAME_RE.is_match(name) {
        errors.insert(
            "username",
            "Username must contain only letters, numbers, and underscores.".into(),
        );
    }

    errors
}

pub fn validate_login(email: &str, password: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if email.is_empty() {
        errors.insert("email", "Email is required.".into());
    } else if !EMAIL_RE.is_match(email) {
        errors.insert("email", "Email is not valid.".into());
    }

    if password.is_empty() {
        errors.insert("password", "Password is required.".into());
    }

    errors
}

/// Shared by registration and password updates.
pub fn password_error(password: &str) -> Option<String> {
    if password.is_empty() {
        return Some("Password is required.".into());
    }
    if password.len() < 8 || password.len() > 30 {
        return Some("Password must be between 8 and 30 characters.".into());
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Some(
            "Password must contain at least one uppercase letter, one lowercase letter, and one number."
                .into(),
        );
    }

    None
}
