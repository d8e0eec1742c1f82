//! Vault module: encrypted secret storage.
//!
//! This module provides:
//! - `SecretRecord` and `SecretMetadata` types (`secret`)
//! - `VaultStore` / `UnlockedVault` for creating, unlocking and managing vaults (`store`)

pub mod secret;
pub mod store;

// Re-export the most commonly used items.
pub use secret::{validate_secret_name, SecretMetadata, SecretRecord};
pub use store::{UnlockedVault, VaultStore};
