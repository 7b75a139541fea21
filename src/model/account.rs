use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ShelterOwner,
    User,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

/// A human user identity. `email_ct` and `phone_ct` hold deterministic
/// ciphertext, never plaintext; `email_ct` and `username` are each unique
/// across all accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email_ct: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub phone_ct: Option<String>,
    pub created_ts: i64,
}
