use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::account::Role;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Email and phone are best-effort decrypted; either may be absent if the
/// stored ciphertext no longer decrypts under the current key.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
}
