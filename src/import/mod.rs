//! Importer identity provisioning.
//!
//! The scheduled pet-import job writes its listings under a synthetic
//! shelter-owner account. Both rows are found by deterministic
//! encrypted-email equality, so re-running the provisioning (at every
//! import cycle, or concurrently from two processes) converges on the
//! same single account/shelter pair. The account has an empty password
//! hash and can never authenticate.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{AccountInsert, ShelterInsert};
use crate::model::{
    account::{Account, Role},
    shelter::Shelter,
};
use crate::state::AppState;

pub const IMPORT_EMAIL: &str = "importer@shelter.local";
const IMPORT_USERNAME: &str = "import_bot";
const IMPORT_SHELTER_NAME: &str = "Imported listings";

/// Find-or-create the importer account and its shelter. Safe to call
/// repeatedly; a lost insert race falls back to re-reading.
pub async fn ensure_import_identity(state: &AppState) -> Result<(Account, Shelter)> {
    let email_ct = state.cipher.encrypt(IMPORT_EMAIL)?;

    let account = match state.db.find_account_by_email_ct(&email_ct).await? {
        Some(account) => account,
        None => {
            let account = Account {
                id: Uuid::new_v4(),
                username: IMPORT_USERNAME.to_string(),
                email_ct: email_ct.clone(),
                password_hash: String::new(),
                role: Role::ShelterOwner,
                phone_ct: None,
                created_ts: chrono::Utc::now().timestamp(),
            };
            match state.db.create_account(&account).await? {
                AccountInsert::Created => account,
                // Someone else created it between the read and the insert.
                AccountInsert::DuplicateUsername | AccountInsert::DuplicateEmail => state
                    .db
                    .find_account_by_email_ct(&email_ct)
                    .await?
                    .context("importer account missing after duplicate insert")?,
            }
        }
    };

    let shelter = match state.db.find_shelter_by_email_ct(&email_ct).await? {
        Some(shelter) => shelter,
        None => {
            let shelter = Shelter {
                id: Uuid::new_v4(),
                name: IMPORT_SHELTER_NAME.to_string(),
                address: "internet".to_string(),
                phone: None,
                email_ct: Some(email_ct.clone()),
                description: Some("Listings imported from external sites".to_string()),
                owner_id: account.id,
                created_ts: chrono::Utc::now().timestamp(),
            };
            match state.db.create_shelter(&shelter).await? {
                ShelterInsert::Created => shelter,
                ShelterInsert::DuplicateEmail => state
                    .db
                    .find_shelter_by_email_ct(&email_ct)
                    .await?
                    .context("importer shelter missing after duplicate insert")?,
            }
        }
    };

    Ok((account, shelter))
}

/// Background loop run once per import cycle. The fetch/parse stage of
/// the import lives outside this service; here the cycle only re-asserts
/// the identity it will write under.
pub fn spawn_import_cycle(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match ensure_import_identity(&state).await {
                Ok((account, shelter)) => {
                    debug!(
                        "import identity ready: account={} shelter={}",
                        account.username, shelter.name
                    );
                }
                Err(e) => warn!("import identity provisioning failed: {e:#}"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;

    #[tokio::test]
    async fn provisioning_is_idempotent() {
        let (state, _dir) = test_state();

        let (account_a, shelter_a) = ensure_import_identity(&state).await.unwrap();
        let (account_b, shelter_b) = ensure_import_identity(&state).await.unwrap();

        assert_eq!(account_a.id, account_b.id);
        assert_eq!(shelter_a.id, shelter_b.id);
        assert_eq!(account_a.role, Role::ShelterOwner);
        assert_eq!(shelter_a.owner_id, account_a.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_provisioning_creates_one_identity() {
        let (state, _dir) = test_state();

        let tasks = (0..4).map(|_| {
            let state = state.clone();
            tokio::spawn(async move { ensure_import_identity(&state).await })
        });
        let results: Vec<_> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let account_ids: std::collections::HashSet<_> =
            results.iter().map(|(a, _)| a.id).collect();
        let shelter_ids: std::collections::HashSet<_> =
            results.iter().map(|(_, s)| s.id).collect();
        assert_eq!(account_ids.len(), 1);
        assert_eq!(shelter_ids.len(), 1);
    }
}
