use axum::{extract::State, Json};

use crate::auth::jwt::AuthenticatedUser;
use crate::device::provisioner;
use crate::device::types::*;
use crate::error::ApiError;
use crate::model::account::Role;
use crate::state::AppState;

pub async fn device_login_handler(
    State(state): State<AppState>,
    Json(req): Json<DeviceLoginRequest>,
) -> Result<Json<DeviceLoginResponse>, ApiError> {
    let session =
        provisioner::device_login(&state, &req.mac, &req.username, &req.password).await?;

    Ok(Json(DeviceLoginResponse {
        device_users_id: session.link_id,
        device_id: session.device_id,
        mac: session.mac,
        device_key: session.key,
        key_issued: session.key_issued,
    }))
}

/// Pre-provisioning is restricted to administrators; the link is created
/// for the account named in the body, not for the caller.
pub async fn enroll_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    if auth.0.role != Role::Admin {
        return Err(ApiError::Forbidden("Enrollment requires an admin token."));
    }

    let ticket = provisioner::enroll(&state, req.user_id, &req.device_id).await?;

    Ok(Json(EnrollResponse {
        device_users_id: ticket.link_id,
        device_key: ticket.key,
    }))
}
