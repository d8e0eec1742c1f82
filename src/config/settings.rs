use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::codec::CipherSuite;
use crate::crypto::identity::{MAX_IDENTIFIER_LEN, MIN_IDENTIFIER_LEN};
use crate::crypto::kdf::{validate_bcrypt_cost, KdfParams};
use crate::crypto::session::HostIdentity;
use crate::errors::{Result, ShellVaultError};

/// Smallest RSA modulus that fits a 128-byte outer key under OAEP-SHA256.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Project-level configuration, loaded from `.shellvault.toml`.
///
/// Every field has a default, so a missing config file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory (relative to project root) holding the vault.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// BCrypt cost for the password KDF.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    /// PBKDF2-HMAC-SHA512 rounds for the password KDF.
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// BCrypt cost for session tokens.
    #[serde(default = "default_bcrypt_cost")]
    pub session_bcrypt_cost: u32,

    /// RSA modulus size for new vaults.
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,

    /// Cipher suite for newly written secrets.
    #[serde(default)]
    pub cipher_suite: CipherSuite,

    /// Length of the file identifiers derived from secret names.
    #[serde(default = "default_identifier_length")]
    pub identifier_length: usize,

    /// Per-install machine id file.
    #[serde(default = "default_machine_id_path")]
    pub machine_id_path: PathBuf,

    /// Per-boot id file.
    #[serde(default = "default_boot_id_path")]
    pub boot_id_path: PathBuf,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_dir() -> String {
    ".shellvault".to_string()
}

fn default_bcrypt_cost() -> u32 {
    10
}

fn default_pbkdf2_iterations() -> u32 {
    100_000
}

fn default_rsa_key_bits() -> usize {
    MIN_RSA_KEY_BITS
}

fn default_identifier_length() -> usize {
    12
}

fn default_machine_id_path() -> PathBuf {
    PathBuf::from("/etc/machine-id")
}

fn default_boot_id_path() -> PathBuf {
    PathBuf::from("/proc/sys/kernel/random/boot_id")
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            bcrypt_cost: default_bcrypt_cost(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
            session_bcrypt_cost: default_bcrypt_cost(),
            rsa_key_bits: default_rsa_key_bits(),
            cipher_suite: CipherSuite::default(),
            identifier_length: default_identifier_length(),
            machine_id_path: default_machine_id_path(),
            boot_id_path: default_boot_id_path(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".shellvault.toml";

    /// Load settings from `<project_dir>/.shellvault.toml`.
    ///
    /// A missing file yields defaults.  A file that does not parse or
    /// holds out-of-range values is an error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            ShellVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate().map_err(|e| {
            ShellVaultError::ConfigError(format!("{}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<()> {
        self.kdf_params().validate()?;
        validate_bcrypt_cost(self.session_bcrypt_cost)?;

        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(ShellVaultError::Validation(format!(
                "rsa_key_bits must be at least {MIN_RSA_KEY_BITS} (got {})",
                self.rsa_key_bits
            )));
        }
        if !(MIN_IDENTIFIER_LEN..=MAX_IDENTIFIER_LEN).contains(&self.identifier_length) {
            return Err(ShellVaultError::Validation(format!(
                "identifier_length must be between {MIN_IDENTIFIER_LEN} and {MAX_IDENTIFIER_LEN} (got {})",
                self.identifier_length
            )));
        }
        if self.vault_dir.trim().is_empty() {
            return Err(ShellVaultError::Validation("vault_dir cannot be empty".into()));
        }
        Ok(())
    }

    /// Full path of the vault directory.
    ///
    /// Example: `project_dir/.shellvault`
    pub fn vault_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.vault_dir)
    }

    /// Convert the KDF settings into crypto-layer params.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            bcrypt_cost: self.bcrypt_cost,
            pbkdf2_iterations: self.pbkdf2_iterations,
        }
    }

    /// Identity source reading the configured id files.
    pub fn host_identity(&self) -> HostIdentity {
        HostIdentity::new(&self.machine_id_path, &self.boot_id_path)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.vault_dir, ".shellvault");
        assert_eq!(s.bcrypt_cost, 10);
        assert_eq!(s.pbkdf2_iterations, 100_000);
        assert_eq!(s.rsa_key_bits, 2048);
        assert_eq!(s.cipher_suite, CipherSuite::Legacy);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.identifier_length, 12);
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
vault_dir = "secrets"
bcrypt_cost = 12
pbkdf2_iterations = 200000
cipher_suite = "sealed"
machine_id_path = "/tmp/machine-id"
"#;
        fs::write(tmp.path().join(".shellvault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_dir, "secrets");
        assert_eq!(settings.bcrypt_cost, 12);
        assert_eq!(settings.pbkdf2_iterations, 200_000);
        assert_eq!(settings.cipher_suite, CipherSuite::Sealed);
        assert_eq!(settings.machine_id_path, PathBuf::from("/tmp/machine-id"));
        // Rest should be defaults
        assert_eq!(settings.session_bcrypt_cost, 10);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".shellvault.toml"), "not valid {{toml").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn load_rejects_out_of_range_values() {
        let tmp = TempDir::new().unwrap();
        for config in [
            "bcrypt_cost = 3\n",
            "pbkdf2_iterations = 10\n",
            "rsa_key_bits = 1024\n",
            "identifier_length = 100\n",
            "cipher_suite = \"rot13\"\n",
        ] {
            fs::write(tmp.path().join(".shellvault.toml"), config).unwrap();
            let err = Settings::load(tmp.path()).unwrap_err();
            assert!(matches!(err, ShellVaultError::ConfigError(_)), "{config}");
        }
    }

    #[test]
    fn vault_path_respects_custom_vault_dir() {
        let s = Settings {
            vault_dir: "secrets".to_string(),
            ..Settings::default()
        };
        let project = Path::new("/home/user/myproject");
        assert_eq!(
            s.vault_path(project),
            PathBuf::from("/home/user/myproject/secrets")
        );
    }
}
