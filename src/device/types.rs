use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DeviceLoginRequest {
    pub mac: String,
    pub username: String,
    pub password: String,
}

/// `device_key` is present exactly once, on the response that issued it;
/// it can never be recovered afterwards.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLoginResponse {
    pub device_users_id: Uuid,
    pub device_id: Uuid,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_key: Option<String>,
    pub key_issued: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub user_id: Uuid,
    /// Carries the MAC; named for wire compatibility with the device
    /// fleet's existing enrollment tooling.
    pub device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub device_users_id: Uuid,
    pub device_key: String,
}
