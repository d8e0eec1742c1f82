//! Cryptographically strong random material.
//!
//! Every byte comes straight from the operating system CSPRNG.  A failing
//! OS generator is reported as an environment error; there is no fallback
//! to a weaker source.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryRngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{Result, ShellVaultError};

/// Fill a fresh buffer of `len` bytes from the OS CSPRNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| {
        ShellVaultError::Environment(format!("OS random generator unavailable: {e}"))
    })?;
    Ok(buf)
}

/// Fixed-size variant of [`random_bytes`].
pub fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| {
        ShellVaultError::Environment(format!("OS random generator unavailable: {e}"))
    })?;
    Ok(buf)
}

/// Mint an alphanumeric key of *at most* `approx_length` characters.
///
/// Random bytes are base64-encoded and every `+`, `/` and `=` is dropped,
/// so the result is usually a few characters short of `approx_length`.
/// Callers must not rely on an exact length.
pub fn strong_key(approx_length: usize) -> Result<Zeroizing<String>> {
    if approx_length == 0 {
        return Err(ShellVaultError::Validation(
            "strong key length must be greater than zero".into(),
        ));
    }

    let mut raw = random_bytes((approx_length * 3).div_ceil(4))?;
    let mut encoded = BASE64.encode(&raw);
    raw.zeroize();

    let key: String = encoded
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(approx_length)
        .collect();
    encoded.zeroize();

    Ok(Zeroizing::new(key))
}
