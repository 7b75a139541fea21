use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical sensor unit. `mac` is always the canonical
/// `AA:BB:CC:DD:EE:FF` form and unique across all devices; `owner_id` is
/// set by the first account to authenticate against the device and never
/// changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub mac: String,
    pub name: String,
    pub location: String,
    pub owner_id: Uuid,
    pub registered_ts: i64,
    #[serde(default)]
    pub last_seen_ts: Option<i64>,
}

/// Device ↔ account association carrying the per-link API-key hash.
/// At most one link exists per (mac, account) pair. Once `api_key_hash`
/// is set, only the hash persists; the raw key is gone for good.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLink {
    pub id: Uuid,
    pub mac: String,
    pub account_id: Uuid,
    #[serde(default)]
    pub api_key_hash: Option<String>,
    pub created_ts: i64,
}
