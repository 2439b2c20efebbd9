//! Tick ingestion record and its integrity/authentication helpers

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use ring::{digest, hmac};
use serde::{Deserialize, Serialize};

/// An externally supplied, strictly-ordered event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub sequence_id: u64,
    pub tag: String,
    pub integrity_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_tag: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// Build an unsigned tick whose integrity hash covers the tag.
    pub fn new(sequence_id: u64, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            sequence_id,
            integrity_hash: sha256_hex(tag.as_bytes()),
            tag,
            auth_tag: None,
            timestamp: Utc::now(),
        }
    }

    /// Sign with `secret`, replacing any existing auth tag.
    pub fn signed(mut self, secret: &str) -> Self {
        self.auth_tag = Some(tick_auth_tag(secret, &self));
        self
    }

    fn signing_input(&self) -> String {
        format!("{}:{}:{}", self.sequence_id, self.tag, self.integrity_hash)
    }

    /// Verify the HMAC auth tag against `secret` in constant time.
    pub fn verify_auth(&self, secret: &str) -> Result<()> {
        let provided = self
            .auth_tag
            .as_deref()
            .ok_or_else(|| Error::auth_failed("auth tag required"))?;
        let raw = STANDARD
            .decode(provided)
            .map_err(|_| Error::auth_failed("auth tag is not valid base64"))?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        hmac::verify(&key, self.signing_input().as_bytes(), &raw)
            .map_err(|_| Error::auth_failed("invalid auth tag"))
    }
}

/// Base64 HMAC-SHA256 over the tick's sequence id, tag and integrity hash.
pub fn tick_auth_tag(secret: &str, tick: &Tick) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, tick.signing_input().as_bytes());
    STANDARD.encode(tag.as_ref())
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let d = digest::digest(&digest::SHA256, bytes);
    d.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
}
