use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::model::account::Role;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub role: Role,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

/// Signs and validates bearer tokens with the process-wide HS256 secret.
/// There is no revocation: a leaked token stays valid until `exp`.
pub struct TokenIssuer {
    secret: String,
    issuer: String,
    audience: String,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            secret: cfg.jwt_secret.clone(),
            issuer: cfg.jwt_issuer.clone(),
            audience: cfg.jwt_audience.clone(),
            ttl_secs: cfg.jwt_ttl_secs,
        }
    }

    pub fn issue(&self, account_id: Uuid, role: Role) -> anyhow::Result<String> {
        let iat = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: account_id.to_string(),
            role,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat,
            exp: iat + self.ttl_secs as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized("invalid or expired token"))
    }
}

/// Extractor for bearer-authenticated routes.
pub struct AuthenticatedUser(pub Claims);

impl AuthenticatedUser {
    pub fn account_id(&self) -> Result<Uuid, ApiError> {
        Uuid::parse_str(&self.0.sub).map_err(|_| ApiError::Unauthorized("invalid token subject"))
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::Unauthorized("missing bearer token"))?;

        let claims = state.tokens.verify(bearer.token())?;
        Ok(AuthenticatedUser(claims))
    }
}
