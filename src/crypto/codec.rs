//! Text format of a crypt block.
//!
//! A crypt block is two base64 parts joined by an outer glue marker:
//!
//! ```text
//! <base64 RSA-wrapped outer key> OUTER_GLUE <base64 outer-encrypted body>
//! ```
//!
//! The body decrypts to the serialized [`CipherProperties`] and the base64
//! inner ciphertext, joined by the inner glue marker:
//!
//! ```text
//! <properties as TOML> INNER_GLUE <base64 inner ciphertext>
//! ```
//!
//! Glue markers are plain literals chosen so they cannot occur in base64 or
//! in the properties text.  They are not escaped: content that ever
//! contains a marker verbatim would split in the wrong place.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{Result, ShellVaultError};

/// Separates the serialized properties from the inner ciphertext.
pub const INNER_GLUE: &str = "\n<<==|| shellvault :: inner crypt glue ||==>>\n";

/// Separates the wrapped outer key from the legacy (Blowfish) body.
pub const OUTER_GLUE: &str = "\n<<==|| shellvault :: outer crypt glue ||==>>\n";

/// Separates the wrapped outer key from a sealed (AES-GCM) body.
pub const SEALED_OUTER_GLUE: &str = "\n<<==|| shellvault :: sealed crypt glue ||==>>\n";

// ---------------------------------------------------------------------------
// CipherProperties
// ---------------------------------------------------------------------------

/// Everything needed to reverse one inner encryption.
///
/// Created fresh for every encryption and only ever stored inside the
/// outer layer next to its own ciphertext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct CipherProperties {
    /// Cipher identifier, e.g. `AES-256-CBC`.
    pub algorithm: String,
    /// Base64 symmetric key.
    pub key: String,
    /// Base64 IV (or nonce).
    pub iv: String,
    /// Base64 SHA-256 digest of the plaintext.
    pub digest: String,
}

impl CipherProperties {
    pub fn new(algorithm: &str, key: String, iv: String, digest: String) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            key,
            iv,
            digest,
        }
    }

    /// `true` when all four fields carry a value.
    pub fn is_complete(&self) -> bool {
        !(self.algorithm.is_empty()
            || self.key.is_empty()
            || self.iv.is_empty()
            || self.digest.is_empty())
    }

    /// Decode the base64 key field.
    pub fn key_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        BASE64
            .decode(&self.key)
            .map(Zeroizing::new)
            .map_err(|e| ShellVaultError::MalformedBlock(format!("cipher key is not base64: {e}")))
    }

    /// Decode the base64 IV field.
    pub fn iv_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.iv)
            .map_err(|e| ShellVaultError::MalformedBlock(format!("cipher IV is not base64: {e}")))
    }
}

impl fmt::Debug for CipherProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherProperties")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .field("iv", &self.iv)
            .field("digest", &self.digest)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Cipher suites
// ---------------------------------------------------------------------------

/// Which pair of symmetric layers a crypt block uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherSuite {
    /// AES-256-CBC inner layer with a digest check, Blowfish-ECB outer layer.
    #[default]
    Legacy,
    /// AES-256-GCM for both layers.
    Sealed,
}

impl CipherSuite {
    /// The outer glue marker written for this suite.
    pub fn outer_glue(self) -> &'static str {
        match self {
            CipherSuite::Legacy => OUTER_GLUE,
            CipherSuite::Sealed => SEALED_OUTER_GLUE,
        }
    }

    /// Work out the suite of a crypt block from the glue it contains.
    pub fn detect(block: &str) -> Result<Self> {
        if block.contains(OUTER_GLUE) {
            Ok(CipherSuite::Legacy)
        } else if block.contains(SEALED_OUTER_GLUE) {
            Ok(CipherSuite::Sealed)
        } else {
            Err(ShellVaultError::MalformedBlock(
                "outer glue marker not found".into(),
            ))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CipherSuite::Legacy => "legacy",
            CipherSuite::Sealed => "sealed",
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherSuite {
    type Err = ShellVaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy" => Ok(CipherSuite::Legacy),
            "sealed" => Ok(CipherSuite::Sealed),
            other => Err(ShellVaultError::Validation(format!(
                "unknown cipher suite '{other}' (expected legacy or sealed)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Inner layer
// ---------------------------------------------------------------------------

/// Join the properties and the base64 inner ciphertext.
pub fn inner_serialize(props: &CipherProperties, ciphertext_b64: &str) -> Result<Zeroizing<String>> {
    if !props.is_complete() {
        return Err(ShellVaultError::Validation(
            "cipher properties are incomplete".into(),
        ));
    }

    let head = Zeroizing::new(
        toml::to_string(props)
            .map_err(|e| ShellVaultError::SerializationError(format!("cipher properties: {e}")))?,
    );

    let mut unified = Zeroizing::new(String::with_capacity(
        head.len() + INNER_GLUE.len() + ciphertext_b64.len(),
    ));
    unified.push_str(&head);
    unified.push_str(INNER_GLUE);
    unified.push_str(ciphertext_b64);
    Ok(unified)
}

/// Split the inner layer back into properties and raw ciphertext bytes.
pub fn inner_deserialize(text: &str) -> Result<(CipherProperties, Vec<u8>)> {
    let (head, tail) = text
        .split_once(INNER_GLUE)
        .ok_or_else(|| ShellVaultError::MalformedBlock("inner glue marker not found".into()))?;

    let props: CipherProperties = toml::from_str(head)
        .map_err(|e| ShellVaultError::MalformedBlock(format!("cipher properties: {e}")))?;
    if !props.is_complete() {
        return Err(ShellVaultError::MalformedBlock(
            "cipher properties are incomplete".into(),
        ));
    }

    let ciphertext = BASE64
        .decode(tail)
        .map_err(|e| ShellVaultError::MalformedBlock(format!("inner ciphertext: {e}")))?;

    Ok((props, ciphertext))
}

// ---------------------------------------------------------------------------
// Outer layer
// ---------------------------------------------------------------------------

/// Which half of the outer layer to pull out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPart {
    /// The asymmetrically wrapped outer key.
    Key,
    /// The symmetrically wrapped body.
    Body,
}

/// Join the wrapped key and wrapped body with the suite's outer glue.
pub fn outer_serialize(suite: CipherSuite, wrapped_key_b64: &str, wrapped_body_b64: &str) -> String {
    let glue = suite.outer_glue();
    let mut block = String::with_capacity(wrapped_key_b64.len() + glue.len() + wrapped_body_b64.len());
    block.push_str(wrapped_key_b64);
    block.push_str(glue);
    block.push_str(wrapped_body_b64);
    block
}

/// Return one half of a crypt block.
pub fn outer_deserialize(text: &str, which: BlockPart) -> Result<&str> {
    let glue = CipherSuite::detect(text)?.outer_glue();
    let (key, body) = text
        .split_once(glue)
        .ok_or_else(|| ShellVaultError::MalformedBlock("outer glue marker not found".into()))?;

    Ok(match which {
        BlockPart::Key => key,
        BlockPart::Body => body,
    })
}
