//! Embedded persistence layer.
//!
//! Rows are JSON values under prefixed keys, with explicit secondary-index
//! keys for every column that must be unique (username, email ciphertext,
//! device MAC, link pair). All find-or-create sequences run inside
//! pessimistic transactions: the insert attempt is the source of truth,
//! and a lock conflict means another request got there first, so callers
//! re-read instead of failing.
//!
//! Key layout:
//!
//! ```text
//! account:{id}                    -> Account
//! account_name:{username}         -> account id
//! account_email:{email_ct}        -> account id
//! device:{mac}                    -> Device
//! device_link:{mac}:{account_id}  -> DeviceLink
//! shelter:{id}                    -> Shelter
//! shelter_email:{email_ct}        -> shelter id
//! ```

use anyhow::{anyhow, Context, Result};
use rocksdb::{ErrorKind, Options, TransactionDB, TransactionDBOptions};
use uuid::Uuid;

use crate::model::{
    account::Account,
    device::{Device, DeviceLink},
    shelter::Shelter,
};

use std::str;

const TXN_RETRIES: usize = 5;

pub struct DBLayer {
    db: TransactionDB,
}

#[derive(Debug)]
pub enum AccountInsert {
    Created,
    DuplicateUsername,
    DuplicateEmail,
}

#[derive(Debug)]
pub enum DeviceAccess {
    /// First contact: the device row was created, owned by this account.
    Created(Device),
    /// Known device owned by this account; last-seen was refreshed.
    Seen(Device),
    /// Device exists but belongs to someone else. Nothing was written.
    ForeignOwner,
}

#[derive(Debug)]
pub enum LinkKey {
    /// The hash was persisted; the caller holds the only raw copy.
    Issued(DeviceLink),
    /// A hash was already present; no write happened.
    AlreadyKeyed(DeviceLink),
}

#[derive(Debug)]
pub enum Enrollment {
    Created(DeviceLink),
    Exists,
}

#[derive(Debug)]
pub enum ShelterInsert {
    Created,
    DuplicateEmail,
}

impl DBLayer {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let txn_opts = TransactionDBOptions::default();
        let db = TransactionDB::open(&opts, &txn_opts, path)?;
        Ok(Self { db })
    }

    fn account_key(id: &Uuid) -> String {
        format!("account:{id}")
    }

    fn account_name_key(username: &str) -> String {
        format!("account_name:{username}")
    }

    fn account_email_key(email_ct: &str) -> String {
        format!("account_email:{email_ct}")
    }

    fn device_key(mac: &str) -> String {
        format!("device:{mac}")
    }

    fn link_key(mac: &str, account_id: &Uuid) -> String {
        format!("device_link:{mac}:{account_id}")
    }

    fn shelter_key(id: &Uuid) -> String {
        format!("shelter:{id}")
    }

    fn shelter_email_key(email_ct: &str) -> String {
        format!("shelter_email:{email_ct}")
    }

    /// Run a transactional closure, retrying on lock contention. Any
    /// other error propagates unchanged.
    fn with_retry<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        for _ in 0..TXN_RETRIES {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let contended = e
                        .downcast_ref::<rocksdb::Error>()
                        .map(|re| {
                            matches!(
                                re.kind(),
                                ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain
                            )
                        })
                        .unwrap_or(false);
                    if !contended {
                        return Err(e);
                    }
                }
            }
        }
        Err(anyhow!(
            "storage contention did not resolve after {TXN_RETRIES} attempts"
        ))
    }

    // ============================================================
    // ACCOUNTS
    // ============================================================

    /// Insert an account, enforcing username and email-ciphertext
    /// uniqueness in one atomic unit.
    pub async fn create_account(&self, account: &Account) -> Result<AccountInsert> {
        let key = Self::account_key(&account.id);
        let name_key = Self::account_name_key(&account.username);
        let email_key = Self::account_email_key(&account.email_ct);
        let id = account.id.to_string();

        self.with_retry(|| {
            let txn = self.db.transaction();
            if txn.get_for_update(&name_key, true)?.is_some() {
                return Ok(AccountInsert::DuplicateUsername);
            }
            if txn.get_for_update(&email_key, true)?.is_some() {
                return Ok(AccountInsert::DuplicateEmail);
            }
            txn.put(&key, serde_json::to_vec(account)?)?;
            txn.put(&name_key, id.as_bytes())?;
            txn.put(&email_key, id.as_bytes())?;
            txn.commit()?;
            Ok(AccountInsert::Created)
        })
    }

    pub async fn load_account(&self, id: &Uuid) -> Result<Option<Account>> {
        self.db
            .get(Self::account_key(id))?
            .map(|v| serde_json::from_slice(&v).context("corrupt account row"))
            .transpose()
    }

    pub async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.find_account_via_index(&Self::account_name_key(username))
            .await
    }

    pub async fn find_account_by_email_ct(&self, email_ct: &str) -> Result<Option<Account>> {
        self.find_account_via_index(&Self::account_email_key(email_ct))
            .await
    }

    async fn find_account_via_index(&self, index_key: &str) -> Result<Option<Account>> {
        let Some(raw) = self.db.get(index_key)? else {
            return Ok(None);
        };
        let id = Uuid::parse_str(str::from_utf8(&raw)?).context("corrupt account index")?;
        self.load_account(&id).await
    }

    /// Overwrite an account row in place. Username and email must be
    /// unchanged; their index entries are not touched here.
    pub async fn save_account(&self, account: &Account) -> Result<()> {
        self.db
            .put(Self::account_key(&account.id), serde_json::to_vec(account)?)?;
        Ok(())
    }

    // ============================================================
    // DEVICES
    // ============================================================

    pub async fn find_device(&self, mac: &str) -> Result<Option<Device>> {
        self.db
            .get(Self::device_key(mac))?
            .map(|v| serde_json::from_slice(&v).context("corrupt device row"))
            .transpose()
    }

    /// Device-login side of the state machine: create the device owned by
    /// this account, refresh last-seen, or report a foreign owner,
    /// atomically with respect to concurrent logins on the same MAC.
    pub async fn register_device_access(
        &self,
        mac: &str,
        account_id: Uuid,
        default_name: &str,
        default_location: &str,
    ) -> Result<DeviceAccess> {
        let key = Self::device_key(mac);

        self.with_retry(|| {
            let txn = self.db.transaction();
            let now = chrono::Utc::now().timestamp();

            match txn.get_for_update(&key, true)? {
                None => {
                    let device = Device {
                        id: Uuid::new_v4(),
                        mac: mac.to_string(),
                        name: default_name.to_string(),
                        location: default_location.to_string(),
                        owner_id: account_id,
                        registered_ts: now,
                        last_seen_ts: Some(now),
                    };
                    txn.put(&key, serde_json::to_vec(&device)?)?;
                    txn.commit()?;
                    Ok(DeviceAccess::Created(device))
                }
                Some(raw) => {
                    let mut device: Device =
                        serde_json::from_slice(&raw).context("corrupt device row")?;
                    if device.owner_id != account_id {
                        return Ok(DeviceAccess::ForeignOwner);
                    }
                    device.last_seen_ts = Some(now);
                    txn.put(&key, serde_json::to_vec(&device)?)?;
                    txn.commit()?;
                    Ok(DeviceAccess::Seen(device))
                }
            }
        })
    }

    /// Enroll side: create the device for the given owner if absent,
    /// return the existing row untouched otherwise. Pre-provisioning
    /// does not contest ownership.
    pub async fn ensure_device(
        &self,
        mac: &str,
        owner_id: Uuid,
        default_name: &str,
        default_location: &str,
    ) -> Result<Device> {
        let key = Self::device_key(mac);

        self.with_retry(|| {
            let txn = self.db.transaction();

            match txn.get_for_update(&key, true)? {
                Some(raw) => serde_json::from_slice(&raw).context("corrupt device row"),
                None => {
                    let device = Device {
                        id: Uuid::new_v4(),
                        mac: mac.to_string(),
                        name: default_name.to_string(),
                        location: default_location.to_string(),
                        owner_id,
                        registered_ts: chrono::Utc::now().timestamp(),
                        last_seen_ts: None,
                    };
                    txn.put(&key, serde_json::to_vec(&device)?)?;
                    txn.commit()?;
                    Ok(device)
                }
            }
        })
    }

    // ============================================================
    // DEVICE LINKS
    // ============================================================

    pub async fn find_link(&self, mac: &str, account_id: &Uuid) -> Result<Option<DeviceLink>> {
        self.db
            .get(Self::link_key(mac, account_id))?
            .map(|v| serde_json::from_slice(&v).context("corrupt device link row"))
            .transpose()
    }

    /// Persist a key hash on the (mac, account) link, creating the link
    /// if needed. If a hash is already present the link is returned
    /// untouched; a stored hash is never overwritten on this path, so
    /// racing callers agree on a single persisted key.
    pub async fn attach_link_key(
        &self,
        mac: &str,
        account_id: Uuid,
        key_hash: &str,
    ) -> Result<LinkKey> {
        let key = Self::link_key(mac, &account_id);

        self.with_retry(|| {
            let txn = self.db.transaction();

            match txn.get_for_update(&key, true)? {
                None => {
                    let link = DeviceLink {
                        id: Uuid::new_v4(),
                        mac: mac.to_string(),
                        account_id,
                        api_key_hash: Some(key_hash.to_string()),
                        created_ts: chrono::Utc::now().timestamp(),
                    };
                    txn.put(&key, serde_json::to_vec(&link)?)?;
                    txn.commit()?;
                    Ok(LinkKey::Issued(link))
                }
                Some(raw) => {
                    let mut link: DeviceLink =
                        serde_json::from_slice(&raw).context("corrupt device link row")?;
                    if link.api_key_hash.is_some() {
                        return Ok(LinkKey::AlreadyKeyed(link));
                    }
                    link.api_key_hash = Some(key_hash.to_string());
                    txn.put(&key, serde_json::to_vec(&link)?)?;
                    txn.commit()?;
                    Ok(LinkKey::Issued(link))
                }
            }
        })
    }

    /// Enrollment insert: any pre-existing link for the pair, keyed or
    /// not, is a conflict.
    pub async fn enroll_link(
        &self,
        mac: &str,
        account_id: Uuid,
        key_hash: &str,
    ) -> Result<Enrollment> {
        let key = Self::link_key(mac, &account_id);

        self.with_retry(|| {
            let txn = self.db.transaction();

            if txn.get_for_update(&key, true)?.is_some() {
                return Ok(Enrollment::Exists);
            }
            let link = DeviceLink {
                id: Uuid::new_v4(),
                mac: mac.to_string(),
                account_id,
                api_key_hash: Some(key_hash.to_string()),
                created_ts: chrono::Utc::now().timestamp(),
            };
            txn.put(&key, serde_json::to_vec(&link)?)?;
            txn.commit()?;
            Ok(Enrollment::Created(link))
        })
    }

    // ============================================================
    // SHELTERS (importer identity)
    // ============================================================

    pub async fn find_shelter_by_email_ct(&self, email_ct: &str) -> Result<Option<Shelter>> {
        let Some(raw) = self.db.get(Self::shelter_email_key(email_ct))? else {
            return Ok(None);
        };
        let id = Uuid::parse_str(str::from_utf8(&raw)?).context("corrupt shelter index")?;
        self.db
            .get(Self::shelter_key(&id))?
            .map(|v| serde_json::from_slice(&v).context("corrupt shelter row"))
            .transpose()
    }

    /// Insert a shelter, enforcing email-ciphertext uniqueness when an
    /// email is present.
    pub async fn create_shelter(&self, shelter: &Shelter) -> Result<ShelterInsert> {
        let key = Self::shelter_key(&shelter.id);
        let id = shelter.id.to_string();

        self.with_retry(|| {
            let txn = self.db.transaction();

            if let Some(email_ct) = shelter.email_ct.as_deref() {
                let email_key = Self::shelter_email_key(email_ct);
                if txn.get_for_update(&email_key, true)?.is_some() {
                    return Ok(ShelterInsert::DuplicateEmail);
                }
                txn.put(&email_key, id.as_bytes())?;
            }
            txn.put(&key, serde_json::to_vec(shelter)?)?;
            txn.commit()?;
            Ok(ShelterInsert::Created)
        })
    }
}
