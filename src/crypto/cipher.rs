//! Deterministic encryption for PII columns.
//!
//! Email and phone are stored as ciphertext but still have to answer
//! equality queries ("does this email already exist?", "find the account
//! for this email"), so the cipher is intentionally deterministic: for a
//! fixed key, the same plaintext always yields the same ciphertext. The
//! AES-256-GCM nonce is synthesized from a keyed hash of the plaintext
//! instead of being random. That buys confidentiality against storage
//! disclosure at the cost of semantic security against lookup-pattern
//! analysis. Do not "fix" this by introducing random nonces: every
//! equality lookup in the system depends on the determinism.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

const NONCE_SIZE: usize = 12;
const GCM_TAG_SIZE: usize = 16;

const NONCE_DOMAIN: &[u8] = b"pii-nonce-v1";
const LOOKUP_DOMAIN: &[u8] = b"pii-lookup-v1";

/// Raised when ciphertext is not validly encoded or was produced under a
/// different key. Display paths treat this as "undisplayable" and move
/// on; uniqueness and credential paths must propagate it.
#[derive(Debug, Error)]
#[error("malformed ciphertext")]
pub struct CipherError;

pub struct PiiCipher {
    key: [u8; 32],
}

impl PiiCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypt to `base64(nonce || ciphertext)`. Stable across calls for
    /// the same key and plaintext.
    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow!("cipher init failed: {e}"))?;

        let nonce_bytes = self.derive_nonce(plaintext);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("encryption failed: {e}"))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(&combined))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String, CipherError> {
        let combined = STANDARD.decode(encrypted).map_err(|_| CipherError)?;
        if combined.len() < NONCE_SIZE + GCM_TAG_SIZE {
            return Err(CipherError);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError)?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError)?;

        String::from_utf8(plaintext).map_err(|_| CipherError)
    }

    /// Keyed one-way hash for indexable lookup without decryption. No
    /// current caller uses it; kept as part of the cipher surface.
    pub fn lookup_hash(&self, plaintext: &str) -> String {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.key).expect("hmac accepts 32-byte keys");
        mac.update(LOOKUP_DOMAIN);
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn derive_nonce(&self, plaintext: &str) -> [u8; NONCE_SIZE] {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.key).expect("hmac accepts 32-byte keys");
        mac.update(NONCE_DOMAIN);
        mac.update(plaintext.as_bytes());
        let digest = mac.finalize().into_bytes();

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&digest[..NONCE_SIZE]);
        nonce
    }
}
