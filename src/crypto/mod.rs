//! Cryptographic core of shellvault.
//!
//! - `random`: OS CSPRNG bytes and alphanumeric strong keys
//! - `symmetric`: AES-256-CBC with digest check, Blowfish-ECB
//! - `aead`: AES-256-GCM sealing
//! - `codec`: crypt block text format
//! - `kdf`: BCrypt + PBKDF2 amalgam key derivation
//! - `hybrid`: RSA-wrapped two-layer payload encryption
//! - `identity`: deterministic non-secret identifiers
//! - `session`: machine-bound session tokens
//! - `keys`: the vault master key

pub mod aead;
pub mod codec;
pub mod hybrid;
pub mod identity;
pub mod kdf;
pub mod keys;
pub mod random;
pub mod session;
pub mod symmetric;

pub use codec::{CipherProperties, CipherSuite};
pub use hybrid::HybridCipher;
pub use identity::{content_digest, digest_identifier, ergonomic_identifier};
pub use kdf::{DerivedKey, DualKdf, KdfParams, KeyStretcher, Salts};
pub use keys::MasterKey;
pub use random::strong_key;
pub use session::{HostIdentity, IdentitySource, MachineIdentity, SessionKey, SessionKeyBinder, SessionToken};
