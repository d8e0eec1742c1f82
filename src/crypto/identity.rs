//! Deterministic, non-secret identifiers.
//!
//! Identifiers name things on disk and in key stores without revealing what
//! they name.  They are stable for a given input and unlikely to collide,
//! but they are short and make no attempt to resist brute force.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::errors::{Result, ShellVaultError};

/// Characters that survive the ergonomic filter: no vowels, no look-alikes.
pub const ERGONOMIC_CHARSET: &str = "bcdfghjkmnprstvw23456789";

/// Accepted range for [`ergonomic_identifier`] lengths.
pub const MIN_IDENTIFIER_LEN: usize = 2;
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Separator inserted into identifiers.
const SEPARATOR: char = '-';

/// Derive a readable identifier of `length` characters plus one separator.
///
/// ```
/// let id = shellvault::crypto::identity::ergonomic_identifier("db-password", 12).unwrap();
/// assert_eq!(id.len(), 13);
/// assert_eq!(id.chars().nth(6), Some('-'));
/// ```
pub fn ergonomic_identifier(source: &str, length: usize) -> Result<String> {
    if source.is_empty() {
        return Err(ShellVaultError::Validation(
            "identifier source cannot be empty".into(),
        ));
    }
    if !(MIN_IDENTIFIER_LEN..=MAX_IDENTIFIER_LEN).contains(&length) {
        return Err(ShellVaultError::Validation(format!(
            "identifier length must be between {MIN_IDENTIFIER_LEN} and {MAX_IDENTIFIER_LEN} (got {length})"
        )));
    }

    let reversed: String = source.chars().rev().collect();
    let mut block = Sha512::digest(source.as_bytes()).to_vec();
    block.extend_from_slice(&Sha512::digest(reversed.as_bytes()));

    let mut filtered = ergonomic_filter(&alphanumeric_pool(&block));
    while filtered.len() < length {
        block = Sha512::digest(&block).to_vec();
        filtered.extend(ergonomic_filter(&alphanumeric_pool(&block)));
    }
    filtered.truncate(length);

    Ok(hyphenate(&filtered, &[length / 2]))
}

/// Twelve-character `xxxx-xxxx-xxxx` identifier for a reference string.
pub fn digest_identifier(reference: &str) -> Result<String> {
    if reference.is_empty() {
        return Err(ShellVaultError::Validation(
            "identifier reference cannot be empty".into(),
        ));
    }
    let pool = alphanumeric_pool(&Sha384::digest(reference.as_bytes()));
    let picked = cherry_pick(12, &pool)?;
    Ok(hyphenate(&picked, &[4, 8]))
}

/// Eight-character `xxxx-xxxx` label for arbitrary content.
pub fn content_digest(content: &[u8]) -> Result<String> {
    let pool = alphanumeric_pool(&Sha256::digest(content));
    let picked = cherry_pick(8, &pool)?;
    Ok(hyphenate(&picked, &[4]))
}

/// Pick `n` evenly spaced characters from `pool`, starting at the first.
///
/// The stride is `m / n` where `m` is the largest multiple of `n` not above
/// `pool.len()`.
pub fn cherry_pick(n: usize, pool: &[char]) -> Result<Vec<char>> {
    if n == 0 {
        return Err(ShellVaultError::Validation(
            "cannot cherry-pick zero characters".into(),
        ));
    }
    if pool.len() < n {
        return Err(ShellVaultError::Validation(format!(
            "cannot cherry-pick {n} characters from a pool of {}",
            pool.len()
        )));
    }

    let multiple = pool.len() - pool.len() % n;
    let stride = multiple / n;
    Ok(pool.iter().step_by(stride).take(n).copied().collect())
}

/// Base64-encode `bytes` and keep only ASCII letters and digits.
fn alphanumeric_pool(bytes: &[u8]) -> Vec<char> {
    BASE64
        .encode(bytes)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn ergonomic_filter(pool: &[char]) -> Vec<char> {
    pool.iter()
        .copied()
        .filter(|c| ERGONOMIC_CHARSET.contains(*c))
        .collect()
}

/// Insert the separator before each position in `at` (ascending).
fn hyphenate(chars: &[char], at: &[usize]) -> String {
    let mut out = String::with_capacity(chars.len() + at.len());
    for (i, c) in chars.iter().enumerate() {
        if at.contains(&i) {
            out.push(SEPARATOR);
        }
        out.push(*c);
    }
    out
}
