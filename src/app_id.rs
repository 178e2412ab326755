//! Per-device application identifier derivation.
//!
//! ```text
//! appId = hex(SHA-256("{deviceUUID}:{accountKey}:{timestamp}"))[..32]
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const APP_ID_LENGTH: usize = 32;

pub fn generate_app_id(device_uuid: &str, account_key: &str, timestamp: &str) -> Result<String> {
    for (name, value) in [
        ("deviceUUID", device_uuid),
        ("accountKey", account_key),
        ("timestamp", timestamp),
    ] {
        if value.is_empty() {
            return Err(Error::validation(format!(
                "{name} must be a non-empty string"
            )));
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(device_uuid.as_bytes());
    hasher.update(b":");
    hasher.update(account_key.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp.as_bytes());

    let mut app_id = hex::encode(hasher.finalize());
    app_id.truncate(APP_ID_LENGTH);
    Ok(app_id)
}

/// Timestamp format fed into [`generate_app_id`]: ISO-8601, millis, `Z`.
pub fn creation_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
