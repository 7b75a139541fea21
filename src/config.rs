use anyhow::{bail, Context, Result};

/// Process configuration, read once at startup. Cryptographic material
/// that is absent or malformed aborts startup; keys are never resolved
/// per request.
#[derive(Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub port: u16,
    /// 256-bit PII cipher key, supplied as 64 hex characters.
    pub pii_key: [u8; 32],
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_ttl_secs: i64,
    /// CORS origin for the frontend; permissive when unset.
    pub allowed_origin: Option<String>,
    pub import_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let pii_key = parse_pii_key(
            &std::env::var("PII_KEY").context("PII_KEY must be set (64 hex characters)")?,
        )?;

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        let jwt_issuer = std::env::var("JWT_ISSUER").context("JWT_ISSUER must be set")?;
        let jwt_audience = std::env::var("JWT_AUDIENCE").context("JWT_AUDIENCE must be set")?;

        let jwt_ttl_secs = match std::env::var("JWT_TTL_SECS") {
            Ok(raw) => raw.parse().context("JWT_TTL_SECS must be an integer")?,
            Err(_) => 86_400,
        };
        if jwt_ttl_secs <= 0 {
            bail!("JWT_TTL_SECS must be positive");
        }

        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT must be a port number")?,
            Err(_) => 5000,
        };

        let import_interval_secs = match std::env::var("IMPORT_INTERVAL_SECS") {
            Ok(raw) => raw.parse().context("IMPORT_INTERVAL_SECS must be an integer")?,
            Err(_) => 3_600,
        };

        Ok(Self {
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "shelterdb".into()),
            port,
            pii_key,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_ttl_secs,
            allowed_origin: std::env::var("ALLOWED_ORIGIN").ok(),
            import_interval_secs,
        })
    }
}

fn parse_pii_key(raw: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(raw.trim()).context("PII_KEY must be hex-encoded")?;
    if bytes.len() != 32 {
        bail!("PII_KEY must decode to exactly 32 bytes, got {}", bytes.len());
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pii_key_roundtrip() {
        let key = parse_pii_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key, [0xab; 32]);
    }

    #[test]
    fn pii_key_rejects_bad_input() {
        assert!(parse_pii_key("zz").is_err());
        assert!(parse_pii_key(&"ab".repeat(16)).is_err());
        assert!(parse_pii_key("").is_err());
    }
}
