//! Shell sessions bound to the machine they were started on.
//!
//! A session key is a random 256-bit key.  It is wrapped under an
//! "obfuscator" key derived with BCrypt from the user, host, machine id and
//! boot id, and the wrapped form becomes a 152-character token that can sit
//! in an environment variable.  The same token only opens again on the same
//! machine, for the same user, before the next reboot.
//!
//! Token layout:
//!
//! ```text
//! [  0..128) base64( iv[16] || AES-256-CBC(obfuscator, iv, hex(session_key)) )
//! [128..152) reverse( bcrypt_salt[22] || cost[2] )
//! ```
//!
//! The obfuscator is derived from non-secret inputs.  The token is only as
//! private as the shell environment that holds it.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::kdf::{bcrypt_raw, validate_bcrypt_cost, BcryptSalt, BCRYPT_SALT_CHARS};
use super::random::random_array;
use super::symmetric::{aes_decrypt_keyed, aes_encrypt_keyed, AES_IV_LEN};
use crate::errors::{Result, ShellVaultError};

/// Total token length in characters.
pub const TOKEN_LEN: usize = 152;

/// Length of the base64 IV + ciphertext region.
const CIPHER_REGION_LEN: usize = 128;

/// Length of the reversed salt + cost suffix.
const SUFFIX_LEN: usize = BCRYPT_SALT_CHARS + 2;

/// Session key length in bytes.
pub const SESSION_KEY_LEN: usize = 32;

/// Hex session key (64 bytes) padded to whole AES blocks.
const WRAPPED_KEY_LEN: usize = 80;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The four strings a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub user: String,
    pub host: String,
    pub machine_id: String,
    pub boot_id: String,
}

impl MachineIdentity {
    /// Hex SHA-256 over all four components.
    ///
    /// BCrypt ignores input past 72 bytes, so the components are digested
    /// first and every one of them affects the obfuscator key.
    fn fingerprint(&self) -> Zeroizing<String> {
        let mut hasher = Sha256::new();
        for part in [&self.user, &self.host, &self.machine_id, &self.boot_id] {
            hasher.update(part.as_bytes());
            hasher.update(b"\n");
        }
        Zeroizing::new(hex::encode(hasher.finalize()))
    }

    /// Short tag naming this machine and boot, `mmmmmmmm.bbbbbbbb`.
    ///
    /// Stored next to session entries so entries from an earlier boot of the
    /// same machine can be recognised without keeping the raw ids.
    pub fn boot_tag(&self) -> String {
        let machine = Sha256::digest(self.machine_id.as_bytes());
        let boot = Sha256::digest(format!("{}\n{}", self.machine_id, self.boot_id).as_bytes());
        format!("{}.{}", hex::encode(&machine[..4]), hex::encode(&boot[..4]))
    }
}

/// Where the current machine and shell identity comes from.
pub trait IdentitySource {
    fn identity(&self) -> Result<MachineIdentity>;
}

/// A fixed identity.
impl IdentitySource for MachineIdentity {
    fn identity(&self) -> Result<MachineIdentity> {
        Ok(self.clone())
    }
}

/// Reads the identity of the running host.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    machine_id_path: PathBuf,
    boot_id_path: PathBuf,
}

impl HostIdentity {
    pub fn new(machine_id_path: impl Into<PathBuf>, boot_id_path: impl Into<PathBuf>) -> Self {
        Self {
            machine_id_path: machine_id_path.into(),
            boot_id_path: boot_id_path.into(),
        }
    }
}

impl IdentitySource for HostIdentity {
    fn identity(&self) -> Result<MachineIdentity> {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .map_err(|_| ShellVaultError::Environment("cannot determine the current user".into()))?;

        let host = hostname::get()
            .map_err(|e| ShellVaultError::Environment(format!("cannot read hostname: {e}")))?
            .into_string()
            .map_err(|_| ShellVaultError::Environment("hostname is not valid UTF-8".into()))?;

        Ok(MachineIdentity {
            user,
            host,
            machine_id: read_id_file(&self.machine_id_path)?,
            boot_id: read_id_file(&self.boot_id_path)?,
        })
    }
}

fn read_id_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ShellVaultError::Environment(format!("cannot read {}: {e}", path.display())))?;
    let id = content.trim();
    if id.is_empty() {
        return Err(ShellVaultError::Environment(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(id.to_string())
}

// ---------------------------------------------------------------------------
// Token and key types
// ---------------------------------------------------------------------------

/// A random 256-bit session key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// The opaque token handed to the shell.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

/// Issues and opens session tokens for one identity source.
pub struct SessionKeyBinder<I = HostIdentity> {
    identity: I,
    cost: u32,
}

impl<I: IdentitySource> SessionKeyBinder<I> {
    /// `cost` is the BCrypt cost for new tokens; old tokens carry their own.
    pub fn new(identity: I, cost: u32) -> Result<Self> {
        validate_bcrypt_cost(cost)?;
        Ok(Self { identity, cost })
    }

    /// Start a session: returns the token and the key it wraps.
    pub fn new_token(&self) -> Result<(SessionToken, SessionKey)> {
        let salt = BcryptSalt::generate(self.cost)?;
        let obfuscator = self.obfuscator_key(&salt)?;

        let session_key = SessionKey(random_array()?);
        let key_hex = Zeroizing::new(hex::encode(session_key.as_bytes()));
        let (iv, ciphertext) = aes_encrypt_keyed(&*obfuscator, key_hex.as_bytes())?;

        let mut region = Vec::with_capacity(AES_IV_LEN + ciphertext.len());
        region.extend_from_slice(&iv);
        region.extend_from_slice(&ciphertext);

        let mut token = BASE64.encode(&region);
        let suffix = format!("{}{:02}", salt.encoded(), salt.cost);
        token.extend(suffix.chars().rev());

        if token.len() != TOKEN_LEN {
            return Err(ShellVaultError::Validation(format!(
                "session token must be {TOKEN_LEN} characters, built {}",
                token.len()
            )));
        }

        debug!(cost = salt.cost, "issued session token");
        Ok((SessionToken(token), session_key))
    }

    /// Boot tag of the current identity.
    pub fn boot_tag(&self) -> Result<String> {
        Ok(self.identity.identity()?.boot_tag())
    }

    /// Re-derive the session key from a token on this machine.
    pub fn recover_session_key(&self, token: &str) -> Result<SessionKey> {
        if token.len() != TOKEN_LEN || !token.is_ascii() {
            return Err(ShellVaultError::Validation(format!(
                "session token must be {TOKEN_LEN} ASCII characters"
            )));
        }

        let (region, suffix) = token.split_at(CIPHER_REGION_LEN);
        let suffix: String = suffix.chars().rev().collect();
        let (salt_chars, cost_digits) = suffix.split_at(SUFFIX_LEN - 2);
        if !cost_digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ShellVaultError::Validation(
                "session token cost is not numeric".into(),
            ));
        }
        let cost: u32 = cost_digits
            .parse()
            .map_err(|_| ShellVaultError::Validation("session token cost is not numeric".into()))?;
        let salt = BcryptSalt::from_encoded(cost, salt_chars)?;

        let region = BASE64
            .decode(region)
            .map_err(|e| ShellVaultError::MalformedBlock(format!("session token: {e}")))?;
        if region.len() != AES_IV_LEN + WRAPPED_KEY_LEN {
            return Err(ShellVaultError::MalformedBlock(
                "session token has the wrong ciphertext length".into(),
            ));
        }
        let (iv, ciphertext) = region.split_at(AES_IV_LEN);

        let obfuscator = self.obfuscator_key(&salt)?;
        let key_hex = aes_decrypt_keyed(&*obfuscator, iv, ciphertext)
            .map_err(|_| ShellVaultError::SessionMismatch)?;
        let bytes = Zeroizing::new(hex::decode(&*key_hex).map_err(|_| ShellVaultError::SessionMismatch)?);
        let key: [u8; SESSION_KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ShellVaultError::SessionMismatch)?;

        debug!("recovered session key");
        Ok(SessionKey(key))
    }

    fn obfuscator_key(&self, salt: &BcryptSalt) -> Result<Zeroizing<[u8; 32]>> {
        let fingerprint = self.identity.identity()?.fingerprint();
        let raw = bcrypt_raw(fingerprint.as_bytes(), salt)?;
        Ok(Zeroizing::new(Sha256::digest(&*raw).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> MachineIdentity {
        MachineIdentity {
            user: "alice".into(),
            host: "workstation".into(),
            machine_id: "0f3c9a7e1d2b4c5a8e6f7a8b9c0d1e2f".into(),
            boot_id: "6a1e4b8c-2d3f-4a5b-9c8d-7e6f5a4b3c2d".into(),
        }
    }

    fn binder(id: MachineIdentity) -> SessionKeyBinder<MachineIdentity> {
        SessionKeyBinder::new(id, 4).unwrap()
    }

    #[test]
    fn token_is_152_chars_and_roundtrips() {
        let b = binder(identity());
        let (token, key) = b.new_token().unwrap();
        assert_eq!(token.as_str().len(), TOKEN_LEN);
        assert_eq!(&token.as_str()[CIPHER_REGION_LEN..CIPHER_REGION_LEN + 2], "40");
        assert_eq!(b.recover_session_key(token.as_str()).unwrap(), key);
    }

    #[test]
    fn tokens_are_fresh_each_time() {
        let b = binder(identity());
        let (t1, k1) = b.new_token().unwrap();
        let (t2, k2) = b.new_token().unwrap();
        assert_ne!(t1, t2);
        assert_ne!(k1, k2);
    }

    #[test]
    fn changed_identity_does_not_recover_the_key() {
        let (token, key) = binder(identity()).new_token().unwrap();

        let variants = [
            MachineIdentity { user: "bob".into(), ..identity() },
            MachineIdentity { host: "laptop".into(), ..identity() },
            MachineIdentity { boot_id: "ffffffff-0000-4000-8000-000000000000".into(), ..identity() },
        ];
        for other in variants {
            match binder(other).recover_session_key(token.as_str()) {
                Ok(recovered) => assert_ne!(recovered, key),
                Err(e) => assert!(matches!(e, ShellVaultError::SessionMismatch)),
            }
        }
    }

    #[test]
    fn wrong_length_is_a_validation_error() {
        let b = binder(identity());
        assert!(matches!(
            b.recover_session_key("short"),
            Err(ShellVaultError::Validation(_))
        ));
    }

    #[test]
    fn non_numeric_cost_is_a_validation_error() {
        let (token, _) = binder(identity()).new_token().unwrap();
        let mut broken = token.as_str().to_string();
        broken.replace_range(CIPHER_REGION_LEN..CIPHER_REGION_LEN + 1, "x");
        assert!(matches!(
            binder(identity()).recover_session_key(&broken),
            Err(ShellVaultError::Validation(_))
        ));
    }

    #[test]
    fn corrupted_region_is_malformed() {
        let (token, _) = binder(identity()).new_token().unwrap();
        let mut broken = token.as_str().to_string();
        broken.replace_range(0..1, "!");
        assert!(matches!(
            binder(identity()).recover_session_key(&broken),
            Err(ShellVaultError::MalformedBlock(_))
        ));
    }

    #[test]
    fn host_identity_reads_id_files() {
        let dir = tempfile::tempdir().unwrap();
        let machine = dir.path().join("machine-id");
        let boot = dir.path().join("boot_id");
        std::fs::write(&machine, "abc123\n").unwrap();
        std::fs::write(&boot, "boot-1\n").unwrap();

        let id = HostIdentity::new(&machine, &boot).identity();
        // USER may be unset in minimal CI containers.
        if let Ok(id) = id {
            assert_eq!(id.machine_id, "abc123");
            assert_eq!(id.boot_id, "boot-1");
        }
    }

    #[test]
    fn missing_id_file_is_an_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_id_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ShellVaultError::Environment(_)));
    }

    #[test]
    fn boot_tag_changes_with_boot_but_keeps_machine_prefix() {
        let before = identity().boot_tag();
        let after = MachineIdentity {
            boot_id: "ffffffff-0000-4000-8000-000000000000".into(),
            ..identity()
        }
        .boot_tag();
        let other_user = MachineIdentity { user: "bob".into(), ..identity() }.boot_tag();

        assert_eq!(before.len(), 17);
        assert_ne!(before, after);
        assert_eq!(before[..8], after[..8]);
        assert_eq!(before, other_user);
    }

    #[test]
    fn debug_output_is_redacted() {
        let (token, key) = binder(identity()).new_token().unwrap();
        assert_eq!(format!("{token:?}"), "SessionToken(<redacted>)");
        assert_eq!(format!("{key:?}"), "SessionKey(<redacted>)");
    }
}
