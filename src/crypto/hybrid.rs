//! Hybrid encryption of secret payloads.
//!
//! Every call mints a fresh inner AES key and a fresh 128-character outer
//! key.  The payload is encrypted under the inner key, the inner key travels
//! in the properties record inside the outer layer, and the outer key is
//! wrapped with the recipient's RSA public key (OAEP, SHA-256).
//!
//! Two suites exist.  `Legacy` is AES-256-CBC inside Blowfish-ECB and keeps
//! older vault blocks readable.  `Sealed` uses AES-256-GCM for both layers.
//! Decryption picks the suite from the glue marker found in the block.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::rand_core::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use super::aead::{self, AES_GCM_ALGORITHM};
use super::codec::{self, BlockPart, CipherProperties, CipherSuite};
use super::random::strong_key;
use super::symmetric::{self, AES_CBC_ALGORITHM};
use crate::errors::{Result, ShellVaultError};

/// Approximate length of the random outer key.
pub const OUTER_KEY_LEN: usize = 128;

/// Encrypts payloads into crypt blocks using one cipher suite.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridCipher {
    suite: CipherSuite,
}

impl HybridCipher {
    pub fn new(suite: CipherSuite) -> Self {
        Self { suite }
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Encrypt `payload` for the holder of `public_key`'s private half.
    pub fn encrypt(&self, public_key: &RsaPublicKey, payload: &[u8]) -> Result<String> {
        let (inner_ct, props) = match self.suite {
            CipherSuite::Legacy => symmetric::aes_encrypt(payload)?,
            CipherSuite::Sealed => aead::aes_gcm_encrypt(payload)?,
        };
        let unified = codec::inner_serialize(&props, &BASE64.encode(&inner_ct))?;

        let outer_key = strong_key(OUTER_KEY_LEN)?;
        let wrapped_key = public_key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), outer_key.as_bytes())?;
        let wrapped_body = outer_encrypt(self.suite, unified.as_bytes(), outer_key.as_bytes())?;

        debug!(suite = %self.suite, bytes = payload.len(), "encrypted crypt block");
        Ok(codec::outer_serialize(
            self.suite,
            &BASE64.encode(wrapped_key),
            &BASE64.encode(wrapped_body),
        ))
    }

    /// Decrypt a crypt block of either suite.
    pub fn decrypt(private_key: &RsaPrivateKey, block: &str) -> Result<Zeroizing<Vec<u8>>> {
        let suite = CipherSuite::detect(block)?;
        let wrapped_key = decode_part(codec::outer_deserialize(block, BlockPart::Key)?, "wrapped key")?;
        let wrapped_body = decode_part(codec::outer_deserialize(block, BlockPart::Body)?, "wrapped body")?;

        let outer_key = Zeroizing::new(private_key.decrypt(Oaep::new::<Sha256>(), &wrapped_key)?);
        let unified = outer_decrypt(suite, &wrapped_body, &outer_key)?;
        let unified = std::str::from_utf8(&unified)
            .map_err(|_| ShellVaultError::MalformedBlock("inner layer is not UTF-8".into()))?;

        let (props, inner_ct) = codec::inner_deserialize(unified)?;
        let payload = inner_decrypt(suite, &inner_ct, &props)?;

        debug!(%suite, bytes = payload.len(), "decrypted crypt block");
        Ok(payload)
    }
}

fn decode_part(part: &str, what: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(part)
        .map_err(|e| ShellVaultError::MalformedBlock(format!("{what}: {e}")))
}

fn outer_encrypt(suite: CipherSuite, unified: &[u8], outer_key: &[u8]) -> Result<Vec<u8>> {
    match suite {
        CipherSuite::Legacy => symmetric::blowfish_encrypt(unified, outer_key),
        CipherSuite::Sealed => aead::seal(&Sha256::digest(outer_key), unified),
    }
}

fn outer_decrypt(suite: CipherSuite, body: &[u8], outer_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    match suite {
        CipherSuite::Legacy => symmetric::blowfish_decrypt(body, outer_key),
        CipherSuite::Sealed => aead::open(&Sha256::digest(outer_key), body).map_err(|_| {
            ShellVaultError::Integrity("sealed outer layer does not verify".into())
        }),
    }
}

/// Dispatch on the recorded algorithm; it must belong to the block's suite.
fn inner_decrypt(suite: CipherSuite, ciphertext: &[u8], props: &CipherProperties) -> Result<Zeroizing<Vec<u8>>> {
    match (suite, props.algorithm.as_str()) {
        (CipherSuite::Legacy, AES_CBC_ALGORITHM) => symmetric::aes_decrypt(ciphertext, props),
        (CipherSuite::Sealed, AES_GCM_ALGORITHM) => aead::aes_gcm_decrypt(ciphertext, props),
        (_, other) => Err(ShellVaultError::MalformedBlock(format!(
            "algorithm '{other}' does not belong to the {suite} suite"
        ))),
    }
}
