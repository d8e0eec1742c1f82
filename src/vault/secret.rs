//! SecretRecord and SecretMetadata types stored inside a vault.
//!
//! A record is serialized as JSON and then encrypted as a whole into one
//! crypt block, so the name and timestamps are just as private as the value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{Result, ShellVaultError};

/// A single decrypted secret.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretRecord {
    /// The name of the secret (e.g. "DATABASE_URL").
    pub name: String,

    /// The plaintext value.
    pub value: String,

    /// When this secret was first created.
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,

    /// When this secret was last updated.
    #[zeroize(skip)]
    pub updated_at: DateTime<Utc>,
}

impl SecretRecord {
    pub fn new(name: &str, value: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn to_json(&self) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        serde_json::to_vec(self)
            .map(zeroize::Zeroizing::new)
            .map_err(|e| ShellVaultError::SerializationError(format!("secret record: {e}")))
    }

    pub(crate) fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ShellVaultError::SerializationError(format!("secret record: {e}")))
    }
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Lightweight metadata about a secret (no value).
///
/// Returned by `UnlockedVault::list` so callers can display names,
/// timestamps and a short fingerprint of the value.
#[derive(Debug, Clone)]
pub struct SecretMetadata {
    pub name: String,
    /// On-disk identifier of the secret's crypt file.
    pub id: String,
    /// Short content digest of the value.
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validate that a secret name is safe.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty and at most 256 characters.
pub fn validate_secret_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShellVaultError::Validation(
            "secret name cannot be empty".into(),
        ));
    }
    if name.len() > 256 {
        return Err(ShellVaultError::Validation(
            "secret name cannot exceed 256 characters".into(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(ShellVaultError::Validation(format!(
            "secret name '{name}' contains invalid characters; only ASCII letters, digits, underscores, hyphens, and periods are allowed"
        )));
    }
    Ok(())
}
