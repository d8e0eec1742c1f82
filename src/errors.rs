use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in ShellVault.
#[derive(Debug, Error)]
pub enum ShellVaultError {
    // --- Core crypto errors ---
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Malformed crypt block: {0}")]
    MalformedBlock(String),

    #[error("Decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    #[error("Session token does not open in this shell; log in again")]
    SessionMismatch,

    // --- Crypto backend errors (passed through untouched) ---
    #[error(transparent)]
    Rsa(#[from] rsa::Error),

    #[error(transparent)]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Invalid cipher key or IV length: {0}")]
    InvalidKeyLength(#[from] aes::cipher::InvalidLength),

    // --- Environment errors ---
    #[error("Environment error: {0}")]
    Environment(String),

    // --- Vault errors ---
    #[error("Vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Secret '{0}' not found")]
    SecretNotFound(String),

    #[error("Key store has no '{key}' in section [{section}]")]
    StoreKeyMissing { section: String, key: String },

    #[error("No active session for this token; run `shellvault login`")]
    NotLoggedIn,

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,
}

/// Convenience type alias for ShellVault results.
pub type Result<T> = std::result::Result<T, ShellVaultError>;
