//! The vault master key.
//!
//! One random master key per vault.  It never leaves memory in clear: on
//! disk it exists only sealed under the password-derived class key and
//! under each live session key.  The master key in turn seals the RSA
//! private key.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use super::random::strong_key;
use crate::errors::{Result, ShellVaultError};

/// Approximate length of a freshly minted master key.
pub const MASTER_KEY_LEN: usize = 128;

/// Shortest master key accepted when unsealing.
const MIN_MASTER_KEY_LEN: usize = 64;

/// A master key held as alphanumeric text, zeroed when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    text: String,
}

impl MasterKey {
    /// Mint a new random master key.
    pub fn generate() -> Result<Self> {
        let key = strong_key(MASTER_KEY_LEN)?;
        Ok(Self {
            text: key.as_str().to_owned(),
        })
    }

    /// Rebuild a master key from unsealed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ShellVaultError::Validation("master key is not UTF-8".into()))?;
        if text.len() < MIN_MASTER_KEY_LEN || !text.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ShellVaultError::Validation(
                "master key has the wrong shape".into(),
            ));
        }
        Ok(Self {
            text: text.to_owned(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// 256-bit AES key used to seal material under this master key.
    pub fn sealing_key(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(Sha256::digest(self.text.as_bytes()).into())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}
