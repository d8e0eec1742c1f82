//! High-level vault operations used by CLI commands.
//!
//! A vault is a directory:
//!
//! ```text
//! <vault_dir>/
//!   keys.toml              salts, wrapped keys, session entries
//!   secrets/<id>.crypt     one crypt block per secret
//! ```
//!
//! `VaultStore::open` gives a locked handle that can only manage sessions.
//! Unlocking with a password or a session token yields an `UnlockedVault`
//! that holds the master key and the RSA keypair in memory.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::aead;
use crate::crypto::codec::CipherSuite;
use crate::crypto::hybrid::HybridCipher;
use crate::crypto::identity::{content_digest, digest_identifier, ergonomic_identifier};
use crate::crypto::kdf::{BcryptSalt, DualKdf, KdfParams, Salts};
use crate::crypto::keys::MasterKey;
use crate::crypto::session::{IdentitySource, SessionKeyBinder, SessionToken};
use crate::errors::{Result, ShellVaultError};
use crate::store::file::write_atomic;
use crate::store::{FileSaltStore, SaltStore};

use super::secret::{validate_secret_name, SecretMetadata, SecretRecord};

/// Key store file inside the vault directory.
pub const KEYS_FILE: &str = "keys.toml";

/// Directory holding the secret crypt files.
pub const SECRETS_DIR: &str = "secrets";

const CRYPT_EXT: &str = "crypt";

// Key store sections.
const KDF: &str = "kdf";
const KEYS: &str = "keys";
const SESSIONS: &str = "sessions";
const SESSION_BOOTS: &str = "session_boots";

/// A vault on disk whose master key is not loaded.
pub struct VaultStore {
    dir: PathBuf,
    keys: FileSaltStore,
}

impl VaultStore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a brand-new vault in `dir` protected by `password`.
    ///
    /// Derives the class key, mints the master key and the RSA keypair,
    /// and writes the key store.  The vault comes back unlocked.
    pub fn init(dir: &Path, password: &str, settings: &Settings, now: DateTime<Utc>) -> Result<UnlockedVault> {
        let keys_path = dir.join(KEYS_FILE);
        if keys_path.exists() {
            return Err(ShellVaultError::VaultAlreadyExists(dir.to_path_buf()));
        }
        settings.validate()?;

        // 1. Class key from the password.
        let kdf = DualKdf::new(settings.kdf_params())?;
        let (derived, salts) = kdf.derive_new(password)?;
        let class_key = derived.symmetric_key();

        // 2. Random master key, sealed under the class key.
        let master = MasterKey::generate()?;
        let sealed_master = aead::seal(&*class_key, master.as_bytes())?;

        // 3. RSA keypair; the private half is sealed under the master key.
        let private_key = RsaPrivateKey::new(&mut OsRng, settings.rsa_key_bits)?;
        let public_key = RsaPublicKey::from(&private_key);
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| ShellVaultError::SerializationError(format!("private key: {e}")))?;
        let sealed_private = aead::seal(&*master.sealing_key(), private_pem.as_bytes())?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ShellVaultError::SerializationError(format!("public key: {e}")))?;

        // 4. Persist.
        fs::create_dir_all(dir.join(SECRETS_DIR))?;
        let mut keys = FileSaltStore::create(&keys_path);
        keys.set(KDF, "bcrypt_salt", &salts.bcrypt)?;
        keys.set(KDF, "pbkdf2_salt", &salts.pbkdf2)?;
        keys.set(KDF, "pbkdf2_iterations", &settings.pbkdf2_iterations.to_string())?;
        keys.set(KEYS, "master", &BASE64.encode(sealed_master))?;
        keys.set(KEYS, "private", &BASE64.encode(sealed_private))?;
        keys.set(KEYS, "public", &public_pem)?;
        keys.set(KEYS, "suite", settings.cipher_suite.as_str())?;
        keys.set(KEYS, "identifier_length", &settings.identifier_length.to_string())?;
        keys.set(KEYS, "created_at", &now.to_rfc3339())?;
        keys.save()?;

        info!(
            path = %dir.display(),
            suite = %settings.cipher_suite,
            rsa_bits = settings.rsa_key_bits,
            "initialized vault"
        );

        let vault = Self {
            dir: dir.to_path_buf(),
            keys,
        };
        Ok(UnlockedVault {
            vault,
            master,
            private_key,
            public_key,
            cipher: HybridCipher::new(settings.cipher_suite),
            identifier_length: settings.identifier_length,
        })
    }

    /// Open the vault in `dir` without unlocking it.
    pub fn open(dir: &Path) -> Result<Self> {
        let keys_path = dir.join(KEYS_FILE);
        if !keys_path.exists() {
            return Err(ShellVaultError::VaultNotFound(dir.to_path_buf()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            keys: FileSaltStore::load(&keys_path)?,
        })
    }

    // ------------------------------------------------------------------
    // Unlocking
    // ------------------------------------------------------------------

    /// Unlock with the vault password.  A wrong password is `DecryptionFailed`.
    pub fn unlock(self, password: &str) -> Result<UnlockedVault> {
        let salts = Salts {
            bcrypt: self.keys.get(KDF, "bcrypt_salt")?,
            pbkdf2: self.keys.get(KDF, "pbkdf2_salt")?,
        };
        let params = KdfParams {
            bcrypt_cost: salts.bcrypt.parse::<BcryptSalt>()?.cost,
            pbkdf2_iterations: self.stored_number(KDF, "pbkdf2_iterations")?,
        };

        let derived = DualKdf::new(params)?.regenerate(password, &salts)?;
        let sealed = self.stored_bytes(KEYS, "master")?;
        let opened = aead::open(&*derived.symmetric_key(), &sealed)?;
        let master = MasterKey::from_bytes(&opened)?;

        debug!("unlocked vault with password");
        self.into_unlocked(master)
    }

    /// Unlock with a session token issued by [`UnlockedVault::login`].
    ///
    /// A token with no session entry is `NotLoggedIn`.  A token that does
    /// not open on this machine is `SessionMismatch`.
    pub fn unlock_with_token<I: IdentitySource>(
        self,
        token: &str,
        binder: &SessionKeyBinder<I>,
    ) -> Result<UnlockedVault> {
        let session_key = binder.recover_session_key(token)?;
        let entry = digest_identifier(token)?;

        let sealed = match self.keys.get(SESSIONS, &entry) {
            Ok(sealed) => decode_stored(SESSIONS, &entry, &sealed)?,
            Err(ShellVaultError::StoreKeyMissing { .. }) => return Err(ShellVaultError::NotLoggedIn),
            Err(e) => return Err(e),
        };
        let opened = aead::open(session_key.as_bytes(), &sealed).map_err(|_| ShellVaultError::SessionMismatch)?;
        let master = MasterKey::from_bytes(&opened)?;

        debug!("unlocked vault with session token");
        self.into_unlocked(master)
    }

    /// Revoke the session behind `token`.  Returns whether it existed.
    pub fn logout(&mut self, token: &str) -> Result<bool> {
        let entry = digest_identifier(token)?;
        let removed = self.keys.remove(SESSIONS, &entry)?;
        self.keys.remove(SESSION_BOOTS, &entry)?;
        if removed {
            self.keys.save()?;
            info!("revoked session");
        }
        Ok(removed)
    }

    /// Number of live session entries.
    pub fn session_count(&self) -> usize {
        self.keys.keys(SESSIONS).len()
    }

    /// Returns the vault directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Drop sessions issued on an earlier boot of the machine tagged `current`.
    ///
    /// Entries from other machines are left alone; the vault directory may
    /// be shared.  Returns how many entries went.
    fn prune_stale_sessions(&mut self, current: &str) -> Result<usize> {
        let machine = current.split('.').next().unwrap_or_default();
        let mut pruned = 0;
        for entry in self.keys.keys(SESSION_BOOTS) {
            let tag = self.keys.get(SESSION_BOOTS, &entry)?;
            if tag != current && tag.split('.').next() == Some(machine) {
                self.keys.remove(SESSIONS, &entry)?;
                self.keys.remove(SESSION_BOOTS, &entry)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn into_unlocked(self, master: MasterKey) -> Result<UnlockedVault> {
        let sealed_private = self.stored_bytes(KEYS, "private")?;
        let private_pem = aead::open(&*master.sealing_key(), &sealed_private)?;
        let private_pem = std::str::from_utf8(&private_pem)
            .map_err(|_| ShellVaultError::SerializationError("private key is not UTF-8".into()))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| ShellVaultError::SerializationError(format!("private key: {e}")))?;

        let public_key = RsaPublicKey::from_public_key_pem(&self.keys.get(KEYS, "public")?)
            .map_err(|e| ShellVaultError::SerializationError(format!("public key: {e}")))?;
        if RsaPublicKey::from(&private_key) != public_key {
            return Err(ShellVaultError::Integrity(
                "stored public key does not match the private key".into(),
            ));
        }

        let suite: CipherSuite = self.keys.get(KEYS, "suite")?.parse()?;
        let identifier_length = self.stored_number(KEYS, "identifier_length")?;

        Ok(UnlockedVault {
            vault: self,
            master,
            private_key,
            public_key,
            cipher: HybridCipher::new(suite),
            identifier_length,
        })
    }

    fn stored_bytes(&self, section: &str, key: &str) -> Result<Vec<u8>> {
        decode_stored(section, key, &self.keys.get(section, key)?)
    }

    fn stored_number<T: std::str::FromStr>(&self, section: &str, key: &str) -> Result<T> {
        self.keys.get(section, key)?.parse().map_err(|_| {
            ShellVaultError::SerializationError(format!("[{section}] {key} is not a number"))
        })
    }
}

fn decode_stored(section: &str, key: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| ShellVaultError::SerializationError(format!("[{section}] {key}: {e}")))
}

/// A vault with its master key and keypair loaded.
pub struct UnlockedVault {
    vault: VaultStore,
    master: MasterKey,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    cipher: HybridCipher,
    identifier_length: usize,
}

impl UnlockedVault {
    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Start a shell session and return its token.
    ///
    /// Sessions left over from an earlier boot of this machine can never
    /// open again and are removed here.
    pub fn login<I: IdentitySource>(&mut self, binder: &SessionKeyBinder<I>) -> Result<SessionToken> {
        let boot_tag = binder.boot_tag()?;
        let pruned = self.vault.prune_stale_sessions(&boot_tag)?;
        if pruned > 0 {
            debug!(pruned, "dropped sessions from an earlier boot");
        }

        let (token, session_key) = binder.new_token()?;
        let sealed = aead::seal(session_key.as_bytes(), self.master.as_bytes())?;

        let entry = digest_identifier(token.as_str())?;
        self.vault.keys.set(SESSIONS, &entry, &BASE64.encode(sealed))?;
        self.vault.keys.set(SESSION_BOOTS, &entry, &boot_tag)?;
        self.vault.keys.save()?;

        info!("issued session");
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Secret operations
    // ------------------------------------------------------------------

    /// Add or update a secret.  `created_at` survives updates.
    pub fn put(&mut self, name: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
        validate_secret_name(name)?;
        let path = self.secret_path(name)?;

        let mut record = SecretRecord::new(name, value, now);
        if path.exists() {
            let existing = self.read_record(&path)?;
            if existing.name != name {
                return Err(ShellVaultError::Validation(format!(
                    "secret '{name}' maps to the same identifier as '{}'",
                    existing.name
                )));
            }
            record.created_at = existing.created_at;
        }

        let block = self.cipher.encrypt(&self.public_key, &record.to_json()?)?;
        write_atomic(&path, block.as_bytes())?;

        debug!(suite = %self.cipher.suite(), "stored secret");
        Ok(())
    }

    /// Decrypt one secret.
    pub fn get(&self, name: &str) -> Result<SecretRecord> {
        validate_secret_name(name)?;
        let path = self.secret_path(name)?;
        if !path.exists() {
            return Err(ShellVaultError::SecretNotFound(name.to_string()));
        }

        let record = self.read_record(&path)?;
        if record.name != name {
            return Err(ShellVaultError::SecretNotFound(name.to_string()));
        }
        Ok(record)
    }

    /// Metadata for every secret, sorted by name.
    pub fn list(&self) -> Result<Vec<SecretMetadata>> {
        let dir = self.vault.dir.join(SECRETS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CRYPT_EXT) {
                continue;
            }
            let record = self.read_record(&path)?;
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push(SecretMetadata {
                name: record.name.clone(),
                id,
                fingerprint: content_digest(record.value.as_bytes())?,
                created_at: record.created_at,
                updated_at: record.updated_at,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Delete a secret.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.get(name)?;
        fs::remove_file(self.secret_path(name)?)?;
        debug!("deleted secret");
        Ok(())
    }

    /// Returns `true` if a secret with this name exists.
    pub fn contains(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Ok(_) => Ok(true),
            Err(ShellVaultError::SecretNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the vault directory.
    pub fn path(&self) -> &Path {
        self.vault.path()
    }

    /// Cipher suite used for new writes.
    pub fn suite(&self) -> CipherSuite {
        self.cipher.suite()
    }

    /// Give up the keys and return the locked handle.
    pub fn lock(self) -> VaultStore {
        self.vault
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn secret_path(&self, name: &str) -> Result<PathBuf> {
        let id = ergonomic_identifier(name, self.identifier_length)?;
        Ok(self
            .vault
            .dir
            .join(SECRETS_DIR)
            .join(format!("{id}.{CRYPT_EXT}")))
    }

    fn read_record(&self, path: &Path) -> Result<SecretRecord> {
        let block = fs::read_to_string(path)?;
        let json: Zeroizing<Vec<u8>> = HybridCipher::decrypt(&self.private_key, &block)?;
        SecretRecord::from_json(&json)
    }
}
