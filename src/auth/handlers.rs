use axum::{extract::State, Json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::types::*;
use crate::auth::validate;
use crate::crypto::password::{hash_password, verify_password};
use crate::db::AccountInsert;
use crate::error::ApiError;
use crate::model::account::Account;
use crate::state::AppState;

/// Credential failures all surface this one message so callers cannot
/// probe which accounts exist.
pub const INVALID_CREDENTIALS: &str = "incorrect email or password";

pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let name = req.name.trim();
    let email = req.email.trim();

    let errors = validate::validate_registration(name, email, &req.password);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Lowercased before encryption so the ciphertext column has one
    // canonical form per address.
    let email_ct = state.cipher.encrypt(&email.to_lowercase())?;
    let phone_ct = match req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => Some(state.cipher.encrypt(phone)?),
        None => None,
    };

    let account = Account {
        id: Uuid::new_v4(),
        username: name.to_string(),
        email_ct,
        password_hash: hash_password(&req.password)?,
        role: req.role.unwrap_or_default(),
        phone_ct,
        created_ts: chrono::Utc::now().timestamp(),
    };

    match state.db.create_account(&account).await? {
        AccountInsert::Created => {}
        AccountInsert::DuplicateUsername => {
            return Err(ApiError::Conflict("Username already exists.".into()))
        }
        AccountInsert::DuplicateEmail => {
            return Err(ApiError::Conflict("Email already exists.".into()))
        }
    }

    info!(
        "registered account {} role={:?}",
        account.username, account.role
    );

    Ok(Json(RegisterResponse {
        id: account.id,
        name: account.username,
        role: account.role,
    }))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.trim();

    let errors = validate::validate_login(email, &req.password);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let email_ct = state.cipher.encrypt(&email.to_lowercase())?;
    let account = state
        .db
        .find_account_by_email_ct(&email_ct)
        .await?
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;

    if !verify_password(&account.password_hash, &req.password)? {
        warn!("failed login for {}", account.username);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    let token = state.tokens.issue(account.id, account.role)?;

    // Best-effort decrypt: a field that no longer decrypts is omitted
    // from the profile rather than failing the login.
    let email_plain = state.cipher.decrypt(&account.email_ct).ok();
    let phone_plain = account
        .phone_ct
        .as_deref()
        .and_then(|ct| state.cipher.decrypt(ct).ok());

    info!("login success: {} role={:?}", account.username, account.role);

    Ok(Json(LoginResponse {
        token,
        id: account.id,
        name: account.username,
        email: email_plain,
        phone: phone_plain,
        role: account.role,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::account::Role;
    use crate::testutil::test_state;

    fn register_req(name: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: "Sunny1day".into(),
            role: None,
            phone: None,
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let (state, _dir) = test_state();

        register_handler(
            State(state.clone()),
            Json(RegisterRequest {
                phone: Some("+371 20000000".into()),
                ..register_req("jane_doe", "jane@example.com")
            }),
        )
        .await
        .unwrap();

        let Json(resp) = login_handler(
            State(state),
            Json(LoginRequest {
                email: "Jane@Example.com".into(), // case-insensitive lookup
                password: "Sunny1day".into(),
            }),
        )
        .await
        .unwrap();

        assert!(!resp.token.is_empty());
        assert_eq!(resp.name, "jane_doe");
        assert_eq!(resp.role, Role::User);
        assert_eq!(resp.email.as_deref(), Some("jane@example.com"));
        assert_eq!(resp.phone.as_deref(), Some("+371 20000000"));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (state, _dir) = test_state();

        register_handler(
            State(state.clone()),
            Json(register_req("jane_doe", "jane@example.com")),
        )
        .await
        .unwrap();

        let err = register_handler(
            State(state),
            Json(register_req("other_name", "jane@example.com")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let (state, _dir) = test_state();

        register_handler(
            State(state.clone()),
            Json(register_req("jane_doe", "jane@example.com")),
        )
        .await
        .unwrap();

        let err = register_handler(
            State(state),
            Json(register_req("jane_doe", "second@example.com")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn bad_shape_is_rejected_per_field() {
        let (state, _dir) = test_state();

        let err = register_handler(
            State(state),
            Json(RegisterRequest {
                name: "x".into(),
                email: "nope".into(),
                password: "weak".into(),
                role: None,
                phone: None,
            }),
        )
        .await
        .unwrap_err();

        match err {
            ApiError::Validation(errors) => {
                assert!(errors.contains_key("email"));
                assert!(errors.contains_key("password"));
                assert!(errors.contains_key("username"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_identical() {
        let (state, _dir) = test_state();

        register_handler(
            State(state.clone()),
            Json(register_req("jane_doe", "jane@example.com")),
        )
        .await
        .unwrap();

        let wrong_password = login_handler(
            State(state.clone()),
            Json(LoginRequest {
                email: "jane@example.com".into(),
                password: "Rainy1day".into(),
            }),
        )
        .await
        .unwrap_err();

        let unknown_email = login_handler(
            State(state),
            Json(LoginRequest {
                email: "nobody@example.com".into(),
                password: "Sunny1day".into(),
            }),
        )
        .await
        .unwrap_err();

        match (wrong_password, unknown_email) {
            (ApiError::Unauthorized(a), ApiError::Unauthorized(b)) => assert_eq!(a, b),
            other => panic!("expected two unauthorized errors, got {other:?}"),
        }
    }
}
