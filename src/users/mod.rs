use axum::extract::{Path, State};
use axum::{
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::jwt::AuthenticatedUser;
use crate::auth::validate;
use crate::crypto::password::hash_password;
use crate::error::ApiError;
use crate::model::account::Role;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(current_user_handler))
        .route("/users/{id}/password", patch(update_password_handler))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub created_ts: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdateRequest {
    pub new_password: String,
}

pub async fn current_user_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let id = auth.account_id()?;
    let account = state
        .db
        .load_account(&id)
        .await?
        .ok_or(ApiError::NotFound("User not found."))?;

    // Display path: ciphertext that no longer decrypts is omitted, not
    // an error.
    let email = state.cipher.decrypt(&account.email_ct).ok();
    let phone = account
        .phone_ct
        .as_deref()
        .and_then(|ct| state.cipher.decrypt(ct).ok());

    Ok(Json(ProfileResponse {
        id: account.id,
        name: account.username,
        email,
        phone,
        role: account.role,
        created_ts: account.created_ts,
    }))
}

/// An account may change its own password; admins may change anyone's.
pub async fn update_password_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<PasswordUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = auth.account_id()?;
    if caller != id && auth.0.role != Role::Admin {
        return Err(ApiError::Forbidden("Not allowed to change this password."));
    }

    if let Some(message) = validate::password_error(&req.new_password) {
        return Err(ApiError::field("newPassword", message));
    }

    let mut account = state
        .db
        .load_account(&id)
        .await?
        .ok_or(ApiError::NotFound("User not found."))?;

    account.password_hash = hash_password(&req.new_password)?;
    state.db.save_account(&account).await?;

    info!("password updated for {}", account.username);
    Ok(Json(serde_json::json!({ "message": "Password updated" })))
}
