//! Shared fixtures for the colocated test modules.

use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use crate::auth::jwt::TokenIssuer;
use crate::config::AppConfig;
use crate::crypto::password::hash_password;
use crate::crypto::PiiCipher;
use crate::db::{AccountInsert, DBLayer};
use crate::model::account::{Account, Role};
use crate::state::AppState;

/// A fresh state over a throwaway store. Keep the TempDir alive for the
/// duration of the test.
pub fn test_state() -> (AppState, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let cfg = AppConfig {
        db_path: dir.path().join("db").to_string_lossy().into_owned(),
        port: 0,
        pii_key: [0x42; 32],
        jwt_secret: "test-secret".into(),
        jwt_issuer: "shelter-api".into(),
        jwt_audience: "shelter-frontend".into(),
        jwt_ttl_secs: 3600,
        allowed_origin: None,
        import_interval_secs: 3600,
    };

    let db = DBLayer::new(&cfg.db_path).expect("open temp store");
    let state = AppState {
        db: Arc::new(db),
        cipher: Arc::new(PiiCipher::new(cfg.pii_key)),
        tokens: Arc::new(TokenIssuer::new(&cfg)),
    };
    (state, dir)
}

/// Insert an account directly, bypassing the HTTP validators.
pub async fn create_account(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
) -> Uuid {
    let account = Account {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email_ct: state.cipher.encrypt(email).expect("encrypt email"),
        password_hash: hash_password(password).expect("hash password"),
        role: Role::User,
        phone_ct: None,
        created_ts: chrono::Utc::now().timestamp(),
    };
    match state.db.create_account(&account).await.expect("insert") {
        AccountInsert::Created => account.id,
        other => panic!("fixture account not created: {other:?}"),
    }
}
