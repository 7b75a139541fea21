use std::sync::Arc;

use crate::auth::jwt::TokenIssuer;
use crate::crypto::PiiCipher;
use crate::db::DBLayer;

/// Shared per-process dependencies. The cipher and token issuer hold the
/// process-wide keys, loaded once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DBLayer>,
    pub cipher: Arc<PiiCipher>,
    pub tokens: Arc<TokenIssuer>,
}
