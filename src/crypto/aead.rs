//! AES-256-GCM authenticated encryption.
//!
//! Used for the sealed cipher suite and for wrapping the vault's own key
//! material (master key, private key, session entries).
//!
//! `seal` generates a fresh random 12-byte nonce and prepends it to the
//! ciphertext.  `open` splits the nonce back out before decrypting.
//!
//! Layout of a sealed byte buffer:
//!   [ 12-byte nonce | ciphertext + 16-byte auth tag ]

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use super::codec::CipherProperties;
use super::random::random_bytes;
use super::symmetric::{digest_b64, verify_digest, AES_KEY_LEN};
use crate::errors::{Result, ShellVaultError};

/// Algorithm identifier recorded in the cipher properties.
pub const AES_GCM_ALGORITHM: &str = "AES-256-GCM";

/// Size of the AES-256-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with a 32-byte `key`.
///
/// Returns the nonce prepended to the ciphertext (nonce || ciphertext).
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| ShellVaultError::Integrity(format!("AES-GCM encryption error: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data that was produced by `seal`.
///
/// A short buffer, wrong key or failed tag all report `DecryptionFailed`.
pub fn open(key: &[u8], ciphertext_with_nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext_with_nonce.len() < NONCE_LEN {
        return Err(ShellVaultError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = ciphertext_with_nonce.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ShellVaultError::DecryptionFailed)?;

    cipher
        .decrypt(nonce, ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| ShellVaultError::DecryptionFailed)
}

/// Inner-layer encryption for the sealed suite: fresh key and nonce,
/// recorded in the same property shape as the CBC layer.
pub fn aes_gcm_encrypt(plaintext: &[u8]) -> Result<(Vec<u8>, CipherProperties)> {
    let key = Zeroizing::new(random_bytes(AES_KEY_LEN)?);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = Aes256Gcm::new_from_slice(&key)?
        .encrypt(&nonce, plaintext)
        .map_err(|e| ShellVaultError::Integrity(format!("AES-GCM encryption error: {e}")))?;

    let props = CipherProperties::new(
        AES_GCM_ALGORITHM,
        BASE64.encode(&*key),
        BASE64.encode(nonce),
        digest_b64(plaintext),
    );
    Ok((ciphertext, props))
}

/// Reverse [`aes_gcm_encrypt`].  A failed tag is an integrity error.
pub fn aes_gcm_decrypt(ciphertext: &[u8], props: &CipherProperties) -> Result<Zeroizing<Vec<u8>>> {
    if props.algorithm != AES_GCM_ALGORITHM {
        return Err(ShellVaultError::MalformedBlock(format!(
            "expected {AES_GCM_ALGORITHM}, found {}",
            props.algorithm
        )));
    }

    let key = props.key_bytes()?;
    let nonce_bytes = props.iv_bytes()?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(ShellVaultError::Validation(format!(
            "AES-GCM nonce must be {NONCE_LEN} bytes, got {}",
            nonce_bytes.len()
        )));
    }

    let plaintext = Aes256Gcm::new_from_slice(&key)?
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| ShellVaultError::Integrity("AES-GCM tag does not verify".into()))?;

    verify_digest(&plaintext, &props.digest)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [0xABu8; 32];
        let sealed = seal(&key, b"master key text").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + b"master key text".len() + 16);
        assert_eq!(&*open(&key, &sealed).unwrap(), b"master key text");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal(&[0x11u8; 32], b"data").unwrap();
        assert!(matches!(
            open(&[0x22u8; 32], &sealed),
            Err(ShellVaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn open_rejects_truncated_input() {
        assert!(open(&[0u8; 32], &[0u8; 5]).is_err());
    }

    #[test]
    fn gcm_layer_roundtrip_and_tamper() {
        let (mut ciphertext, props) = aes_gcm_encrypt(b"inner payload").unwrap();
        assert_eq!(props.algorithm, AES_GCM_ALGORITHM);
        assert_eq!(&*aes_gcm_decrypt(&ciphertext, &props).unwrap(), b"inner payload");

        ciphertext[0] ^= 0x80;
        assert!(matches!(
            aes_gcm_decrypt(&ciphertext, &props),
            Err(ShellVaultError::Integrity(_))
        ));
    }
}
