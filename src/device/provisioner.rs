//! Device identity provisioning.
//!
//! Per (MAC, account) pair the protocol walks four states:
//! no device → device registered (unlinked) → linked without key →
//! linked with key. Device login advances through all of them; enroll is
//! the administrative shortcut that pre-provisions a link for a target
//! account. Every lookup-then-write runs through a transactional DBLayer
//! primitive, so concurrent logins for the same brand-new MAC settle on
//! one device row, one link row, and one persisted key hash.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::password::{hash_password, verify_password};
use crate::db::{DeviceAccess, Enrollment, LinkKey};
use crate::device::mac::canonical_mac;
use crate::error::ApiError;
use crate::state::AppState;

pub const INVALID_CREDENTIALS: &str = "invalid credentials";

const LOGIN_DEVICE_NAME: &str = "ESP32";
const ENROLL_DEVICE_NAME: &str = "Auto-registered device";
const DEFAULT_LOCATION: &str = "Unknown";

/// 256 bits of randomness, base64-encoded. Hashed like a password before
/// it is stored; the raw value leaves the process exactly once.
fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

pub struct DeviceSession {
    pub link_id: Uuid,
    pub device_id: Uuid,
    pub mac: String,
    /// Set only when a key was issued by this very call.
    pub key: Option<String>,
    pub key_issued: bool,
}

pub struct EnrollmentTicket {
    pub link_id: Uuid,
    pub key: String,
}

/// Device bootstrap: authenticate the human account, find-or-create the
/// device and link, and issue the link's API key if it does not have one
/// yet.
pub async fn device_login(
    state: &AppState,
    mac_raw: &str,
    username: &str,
    password: &str,
) -> Result<DeviceSession, ApiError> {
    let mac =
        canonical_mac(mac_raw).map_err(|e| ApiError::field("mac", e.to_string()))?;

    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::field("username", "Username is required."));
    }
    if password.is_empty() {
        return Err(ApiError::field("password", "Password is required."));
    }

    // Unknown user and wrong password are indistinguishable to the caller.
    let account = state
        .db
        .find_account_by_username(username)
        .await?
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;
    if !verify_password(&account.password_hash, password)? {
        warn!("device login: bad password for {username}");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    let device = match state
        .db
        .register_device_access(&mac, account.id, LOGIN_DEVICE_NAME, DEFAULT_LOCATION)
        .await?
    {
        DeviceAccess::Created(device) => {
            info!("registered device {mac} for {username}");
            device
        }
        DeviceAccess::Seen(device) => device,
        DeviceAccess::ForeignOwner => {
            warn!("device login: {mac} is owned by another account");
            return Err(ApiError::Forbidden("Device is owned by another user."));
        }
    };

    // Check state, then decide: only a link without a key gets one. The
    // hash is computed before the transactional attach; if a concurrent
    // login wins the race the freshly generated key is simply dropped.
    let link = state.db.find_link(&mac, &account.id).await?;
    if link.as_ref().map_or(true, |l| l.api_key_hash.is_none()) {
        let raw_key = generate_api_key();
        let key_hash = hash_password(&raw_key)?;

        match state.db.attach_link_key(&mac, account.id, &key_hash).await? {
            LinkKey::Issued(link) => {
                info!("issued api key for {mac} / {username}");
                return Ok(DeviceSession {
                    link_id: link.id,
                    device_id: device.id,
                    mac,
                    key: Some(raw_key),
                    key_issued: true,
                });
            }
            LinkKey::AlreadyKeyed(link) => {
                return Ok(DeviceSession {
                    link_id: link.id,
                    device_id: device.id,
                    mac,
                    key: None,
                    key_issued: false,
                });
            }
        }
    }

    let link = link.ok_or_else(|| anyhow::anyhow!("link vanished after lookup"))?;
    Ok(DeviceSession {
        link_id: link.id,
        device_id: device.id,
        mac,
        key: None,
        key_issued: false,
    })
}

/// Administrative pre-provisioning: bind the MAC to the target account
/// and hand out a fresh key, or fail if the pair is already enrolled.
/// Never a silent no-op.
pub async fn enroll(
    state: &AppState,
    target_account: Uuid,
    mac_raw: &str,
) -> Result<EnrollmentTicket, ApiError> {
    let mac =
        canonical_mac(mac_raw).map_err(|e| ApiError::field("deviceId", e.to_string()))?;

    state
        .db
        .ensure_device(&mac, target_account, ENROLL_DEVICE_NAME, DEFAULT_LOCATION)
        .await?;

    if state.db.find_link(&mac, &target_account).await?.is_some() {
        return Err(ApiError::Conflict("Already enrolled for this user.".into()));
    }

    let raw_key = generate_api_key();
    let key_hash = hash_password(&raw_key)?;

    match state.db.enroll_link(&mac, target_account, &key_hash).await? {
        Enrollment::Created(link) => {
            info!("enrolled {mac} for account {target_account}");
            Ok(EnrollmentTicket {
                link_id: link.id,
                key: raw_key,
            })
        }
        Enrollment::Exists => Err(ApiError::Conflict("Already enrolled for this user.".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{create_account, test_state};

    const MAC: &str = "aa:bb:cc:dd:ee:01";

    #[tokio::test]
    async fn first_login_issues_key_second_does_not() {
        let (state, _dir) = test_state();
        create_account(&state, "jane_doe", "jane@example.com", "Sunny1day").await;

        let first = device_login(&state, MAC, "jane_doe", "Sunny1day")
            .await
            .unwrap();
        assert!(first.key_issued);
        let raw_key = first.key.expect("first login carries the raw key");
        assert!(!raw_key.is_empty());

        // The stored hash matches the raw key that was handed out.
        let link = state
            .db
            .find_link("AA:BB:CC:DD:EE:01", &first_account_id(&state).await)
            .await
            .unwrap()
            .unwrap();
        assert!(verify_password(link.api_key_hash.as_deref().unwrap(), &raw_key).unwrap());

        let second = device_login(&state, MAC, "jane_doe", "Sunny1day")
            .await
            .unwrap();
        assert!(!second.key_issued);
        assert!(second.key.is_none());
        assert_eq!(second.device_id, first.device_id);
        assert_eq!(second.link_id, first.link_id);
    }

    #[tokio::test]
    async fn mac_shapes_resolve_to_the_same_device() {
        let (state, _dir) = test_state();
        create_account(&state, "jane_doe", "jane@example.com", "Sunny1day").await;

        let a = device_login(&state, "aabbccddee01", "jane_doe", "Sunny1day")
            .await
            .unwrap();
        let b = device_login(&state, "AA:BB:CC:DD:EE:01", "jane_doe", "Sunny1day")
            .await
            .unwrap();

        assert_eq!(a.device_id, b.device_id);
        assert_eq!(a.mac, "AA:BB:CC:DD:EE:01");
        assert_eq!(b.mac, "AA:BB:CC:DD:EE:01");
        assert!(a.key_issued);
        assert!(!b.key_issued);
    }

    #[tokio::test]
    async fn bad_credentials_create_nothing() {
        let (state, _dir) = test_state();
        create_account(&state, "jane_doe", "jane@example.com", "Sunny1day").await;

        let unknown = device_login(&state, MAC, "nobody", "Sunny1day")
            .await
            .unwrap_err();
        let wrong = device_login(&state, MAC, "jane_doe", "Rainy1day")
            .await
            .unwrap_err();

        match (unknown, wrong) {
            (ApiError::Unauthorized(a), ApiError::Unauthorized(b)) => assert_eq!(a, b),
            other => panic!("expected two unauthorized errors, got {other:?}"),
        }
        assert!(state
            .db
            .find_device("AA:BB:CC:DD:EE:01")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn invalid_mac_is_rejected_before_any_lookup() {
        let (state, _dir) = test_state();

        let err = device_login(&state, "aa:bb:cc", "jane_doe", "Sunny1day")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn foreign_owner_is_a_conflict_with_no_writes() {
        let (state, _dir) = test_state();
        create_account(&state, "owner_acct", "owner@example.com", "Sunny1day").await;
        let intruder = create_account(&state, "intruder", "intruder@example.com", "Sunny1day").await;

        device_login(&state, MAC, "owner_acct", "Sunny1day")
            .await
            .unwrap();

        let err = device_login(&state, MAC, "intruder", "Sunny1day")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        assert!(state
            .db
            .find_link("AA:BB:CC:DD:EE:01", &intruder)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_logins_issue_exactly_one_key() {
        let (state, _dir) = test_state();
        create_account(&state, "jane_doe", "jane@example.com", "Sunny1day").await;

        let tasks = (0..4).map(|_| {
            let state = state.clone();
            tokio::spawn(async move { device_login(&state, MAC, "jane_doe", "Sunny1day").await })
        });
        let results: Vec<_> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let issued: Vec<_> = results.iter().filter(|s| s.key_issued).collect();
        assert_eq!(issued.len(), 1, "exactly one login wins the key");

        // Everyone agrees on one device and one link.
        let device_ids: std::collections::HashSet<_> =
            results.iter().map(|s| s.device_id).collect();
        let link_ids: std::collections::HashSet<_> = results.iter().map(|s| s.link_id).collect();
        assert_eq!(device_ids.len(), 1);
        assert_eq!(link_ids.len(), 1);

        // And the surviving hash matches the single issued key.
        let account_id = first_account_id(&state).await;
        let link = state
            .db
            .find_link("AA:BB:CC:DD:EE:01", &account_id)
            .await
            .unwrap()
            .unwrap();
        let raw_key = issued[0].key.as_deref().unwrap();
        assert!(verify_password(link.api_key_hash.as_deref().unwrap(), raw_key).unwrap());
    }

    #[tokio::test]
    async fn enroll_twice_conflicts() {
        let (state, _dir) = test_state();
        let account_id =
            create_account(&state, "jane_doe", "jane@example.com", "Sunny1day").await;

        let ticket = enroll(&state, account_id, "aa-bb-cc-dd-ee-02").await.unwrap();
        assert!(!ticket.key.is_empty());

        let err = enroll(&state, account_id, "AA:BB:CC:DD:EE:02")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_after_enroll_does_not_reissue() {
        let (state, _dir) = test_state();
        let account_id =
            create_account(&state, "jane_doe", "jane@example.com", "Sunny1day").await;

        enroll(&state, account_id, MAC).await.unwrap();

        let session = device_login(&state, MAC, "jane_doe", "Sunny1day")
            .await
            .unwrap();
        assert!(!session.key_issued);
        assert!(session.key.is_none());
    }

    async fn first_account_id(state: &AppState) -> Uuid {
        state
            .db
            .find_account_by_username("jane_doe")
            .await
            .unwrap()
            .unwrap()
            .id
    }
}
