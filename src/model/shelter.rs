use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shelter record, here only as the counterpart of the importer identity.
/// `email_ct` is deterministic ciphertext used for equality lookup, same
/// as on accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shelter {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email_ct: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_ts: i64,
}
