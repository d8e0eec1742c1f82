//! Password-based key derivation combining BCrypt and PBKDF2.
//!
//! The derived key is a 512-bit amalgam: the first 180 bits of a BCrypt
//! output over the password, followed by the first 332 bits of a
//! PBKDF2-HMAC-SHA512 output over the *reversed* password.  Only the two
//! salts are ever persisted; the same password and salts always rebuild
//! the identical amalgam.
//!
//! The amalgam is not an AES key.  [`DerivedKey::symmetric_key`] digests
//! it down to 256 bits for callers that need one.

use std::fmt;
use std::str::FromStr;

use base64::alphabet;
use base64::engine::general_purpose::{self, STANDARD as BASE64};
use base64::engine::GeneralPurpose;
use base64::Engine;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::random::{random_array, random_bytes};
use crate::errors::{Result, ShellVaultError};

/// Raw BCrypt output length in bits (23 bytes).
pub const BCRYPT_OUTPUT_BITS: usize = 184;

/// BCrypt bits kept in the amalgam.
pub const BCRYPT_KEPT_BITS: usize = 180;

/// PBKDF2-HMAC-SHA512 output length in bits.
pub const PBKDF2_OUTPUT_BITS: usize = 512;

/// PBKDF2 bits kept in the amalgam.
pub const PBKDF2_KEPT_BITS: usize = 332;

/// Length of the amalgam key in bits.
pub const AMALGAM_BITS: usize = 512;

const AMALGAM_LEN: usize = AMALGAM_BITS / 8;

/// Raw BCrypt salt length in bytes.
pub const BCRYPT_SALT_LEN: usize = 16;

/// BCrypt salt length once encoded with the BCrypt alphabet.
pub const BCRYPT_SALT_CHARS: usize = 22;

/// PBKDF2 salt length in bytes (256 bits).
const PBKDF2_SALT_LEN: usize = 32;

/// Length of a full `$2b$NN$<salt><hash>` BCrypt string.
const BCRYPT_HASH_STRING_LEN: usize = 60;

/// Length of the hash part at the end of a BCrypt string.
const BCRYPT_HASH_CHARS: usize = 31;

/// Accepted BCrypt cost range.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Lowest PBKDF2 round count accepted from configuration.
pub const MIN_PBKDF2_ITERATIONS: u32 = 1_000;

/// Base64 with the BCrypt alphabet and no padding.
const BCRYPT_B64: GeneralPurpose = GeneralPurpose::new(&alphabet::BCRYPT, general_purpose::NO_PAD);

// ---------------------------------------------------------------------------
// Parameters and salts
// ---------------------------------------------------------------------------

/// Cost parameters for the two primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// BCrypt cost (log2 rounds) used when minting new salts.
    pub bcrypt_cost: u32,
    /// PBKDF2 round count.
    pub pbkdf2_iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            bcrypt_cost: 10,
            pbkdf2_iterations: 100_000,
        }
    }
}

impl KdfParams {
    pub fn validate(&self) -> Result<()> {
        validate_bcrypt_cost(self.bcrypt_cost)?;
        if self.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(ShellVaultError::Validation(format!(
                "PBKDF2 iterations must be at least {MIN_PBKDF2_ITERATIONS} (got {})",
                self.pbkdf2_iterations
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_bcrypt_cost(cost: u32) -> Result<()> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(ShellVaultError::Validation(format!(
            "BCrypt cost must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST} (got {cost})"
        )));
    }
    Ok(())
}

/// The two persisted salts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salts {
    /// Modular-crypt BCrypt salt, `$2b$NN$` followed by 22 characters.
    pub bcrypt: String,
    /// Base64 PBKDF2 salt.
    pub pbkdf2: String,
}

/// A decoded BCrypt salt together with its cost.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BcryptSalt {
    pub cost: u32,
    pub bytes: [u8; BCRYPT_SALT_LEN],
}

impl BcryptSalt {
    /// Draw a fresh random salt.
    pub fn generate(cost: u32) -> Result<Self> {
        validate_bcrypt_cost(cost)?;
        Ok(Self {
            cost,
            bytes: random_array()?,
        })
    }

    /// Rebuild a salt from its 22 encoded characters and a cost.
    pub fn from_encoded(cost: u32, encoded: &str) -> Result<Self> {
        validate_bcrypt_cost(cost)?;
        if encoded.len() != BCRYPT_SALT_CHARS {
            return Err(ShellVaultError::Validation(format!(
                "BCrypt salt must be {BCRYPT_SALT_CHARS} characters, got {}",
                encoded.len()
            )));
        }
        let decoded = BCRYPT_B64
            .decode(encoded)
            .map_err(|e| ShellVaultError::Validation(format!("BCrypt salt: {e}")))?;
        let bytes: [u8; BCRYPT_SALT_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            ShellVaultError::Validation(format!(
                "BCrypt salt must decode to {BCRYPT_SALT_LEN} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self { cost, bytes })
    }

    /// The 22-character encoding of the salt bytes.
    pub fn encoded(&self) -> String {
        BCRYPT_B64.encode(self.bytes)
    }
}

impl fmt::Display for BcryptSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$2b${:02}${}", self.cost, self.encoded())
    }
}

impl fmt::Debug for BcryptSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BcryptSalt({self})")
    }
}

impl FromStr for BcryptSalt {
    type Err = ShellVaultError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || ShellVaultError::Validation(format!("malformed BCrypt salt '{s}'"));

        let rest = s.strip_prefix("$2b$").ok_or_else(malformed)?;
        let (cost, encoded) = rest.split_once('$').ok_or_else(malformed)?;
        if cost.len() != 2 || !cost.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let cost: u32 = cost.parse().map_err(|_| malformed())?;
        Self::from_encoded(cost, encoded)
    }
}

/// Run BCrypt and return its 23 raw output bytes.
///
/// BCrypt only reads the first 72 bytes of `secret`.
pub(crate) fn bcrypt_raw(secret: &[u8], salt: &BcryptSalt) -> Result<Zeroizing<Vec<u8>>> {
    let parts = bcrypt::hash_with_salt(secret, salt.cost, salt.bytes)?;
    let formatted = Zeroizing::new(parts.format_for_version(bcrypt::Version::TwoB));

    if formatted.len() != BCRYPT_HASH_STRING_LEN {
        return Err(ShellVaultError::Validation(format!(
            "BCrypt produced a {}-character hash string, expected {BCRYPT_HASH_STRING_LEN}",
            formatted.len()
        )));
    }

    let hash_part = &formatted[BCRYPT_HASH_STRING_LEN - BCRYPT_HASH_CHARS..];
    BCRYPT_B64
        .decode(hash_part)
        .map(Zeroizing::new)
        .map_err(|e| ShellVaultError::Validation(format!("BCrypt hash: {e}")))
}

// ---------------------------------------------------------------------------
// Key stretchers
// ---------------------------------------------------------------------------

/// One password-stretching primitive with its own salt format.
pub trait KeyStretcher {
    /// Mint a fresh salt, already encoded for storage.
    fn new_salt(&self) -> Result<String>;

    /// Stretch `secret` under a previously minted salt.
    fn stretch(&self, secret: &[u8], salt: &str) -> Result<Zeroizing<Vec<u8>>>;
}

/// BCrypt.  The cost lives inside each salt, so `cost` only affects new salts.
#[derive(Debug, Clone, Copy)]
pub struct BcryptStretcher {
    cost: u32,
}

impl BcryptStretcher {
    pub fn new(cost: u32) -> Result<Self> {
        validate_bcrypt_cost(cost)?;
        Ok(Self { cost })
    }
}

impl KeyStretcher for BcryptStretcher {
    fn new_salt(&self) -> Result<String> {
        Ok(BcryptSalt::generate(self.cost)?.to_string())
    }

    fn stretch(&self, secret: &[u8], salt: &str) -> Result<Zeroizing<Vec<u8>>> {
        bcrypt_raw(secret, &salt.parse()?)
    }
}

/// PBKDF2-HMAC-SHA512 with a 64-byte output.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Stretcher {
    iterations: u32,
}

impl Pbkdf2Stretcher {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl KeyStretcher for Pbkdf2Stretcher {
    fn new_salt(&self) -> Result<String> {
        Ok(BASE64.encode(random_bytes(PBKDF2_SALT_LEN)?))
    }

    fn stretch(&self, secret: &[u8], salt: &str) -> Result<Zeroizing<Vec<u8>>> {
        let salt = BASE64
            .decode(salt)
            .map_err(|e| ShellVaultError::Validation(format!("PBKDF2 salt: {e}")))?;
        if salt.len() != PBKDF2_SALT_LEN {
            return Err(ShellVaultError::Validation(format!(
                "PBKDF2 salt must be {PBKDF2_SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }

        let mut out = Zeroizing::new(vec![0u8; PBKDF2_OUTPUT_BITS / 8]);
        pbkdf2::pbkdf2_hmac::<Sha512>(secret, &salt, self.iterations, &mut out);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// DerivedKey
// ---------------------------------------------------------------------------

/// The 512-bit amalgam key.  Zeroized on drop, never printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; AMALGAM_LEN],
}

impl DerivedKey {
    fn from_bits(bits: &BitWriter) -> Result<Self> {
        if bits.bit_len != AMALGAM_BITS {
            return Err(ShellVaultError::Validation(format!(
                "amalgam key must be {AMALGAM_BITS} bits, got {}",
                bits.bit_len
            )));
        }
        let mut bytes = [0u8; AMALGAM_LEN];
        bytes.copy_from_slice(&bits.bytes);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; AMALGAM_LEN] {
        &self.bytes
    }

    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    /// SHA-256 of the amalgam, usable as an AES-256 key.
    pub fn symmetric_key(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(Sha256::digest(self.bytes).into())
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for DerivedKey {}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Big-endian bit accumulator for building the amalgam.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Append the first `bits` bits of `source`.  Callers check the length first.
    fn push_prefix(&mut self, source: &[u8], bits: usize) {
        for i in 0..bits {
            let bit = (source[i / 8] >> (7 - i % 8)) & 1;
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit == 1 {
                if let Some(last) = self.bytes.last_mut() {
                    *last |= 1 << (7 - self.bit_len % 8);
                }
            }
            self.bit_len += 1;
        }
    }
}

fn check_bits(primitive: &str, output: &[u8], expected_bits: usize) -> Result<()> {
    let actual = output.len() * 8;
    if actual != expected_bits {
        return Err(ShellVaultError::Validation(format!(
            "{primitive} output must be {expected_bits} bits, got {actual}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DualKdf
// ---------------------------------------------------------------------------

/// Derives the amalgam key from a password using two stretchers.
pub struct DualKdf<B = BcryptStretcher, P = Pbkdf2Stretcher> {
    bcrypt: B,
    pbkdf2: P,
}

impl DualKdf {
    /// Build the standard BCrypt + PBKDF2 pair.
    pub fn new(params: KdfParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            bcrypt: BcryptStretcher::new(params.bcrypt_cost)?,
            pbkdf2: Pbkdf2Stretcher::new(params.pbkdf2_iterations),
        })
    }
}

impl<B: KeyStretcher, P: KeyStretcher> DualKdf<B, P> {
    /// Build from arbitrary stretchers.
    pub fn with_stretchers(bcrypt: B, pbkdf2: P) -> Self {
        Self { bcrypt, pbkdf2 }
    }

    /// Derive a key under freshly generated salts.
    pub fn derive_new(&self, password: &str) -> Result<(DerivedKey, Salts)> {
        let salts = Salts {
            bcrypt: self.bcrypt.new_salt()?,
            pbkdf2: self.pbkdf2.new_salt()?,
        };
        let key = self.regenerate(password, &salts)?;
        Ok((key, salts))
    }

    /// Rebuild the key from the password and stored salts.
    pub fn regenerate(&self, password: &str, salts: &Salts) -> Result<DerivedKey> {
        if password.is_empty() {
            return Err(ShellVaultError::Validation("password cannot be empty".into()));
        }

        let bcrypt_out = self.bcrypt.stretch(password.as_bytes(), &salts.bcrypt)?;
        check_bits("BCrypt", &bcrypt_out, BCRYPT_OUTPUT_BITS)?;

        let reversed: Zeroizing<String> = Zeroizing::new(password.chars().rev().collect());
        let pbkdf2_out = self.pbkdf2.stretch(reversed.as_bytes(), &salts.pbkdf2)?;
        check_bits("PBKDF2", &pbkdf2_out, PBKDF2_OUTPUT_BITS)?;

        let mut bits = BitWriter::default();
        bits.push_prefix(&bcrypt_out, BCRYPT_KEPT_BITS);
        bits.push_prefix(&pbkdf2_out, PBKDF2_KEPT_BITS);

        let key = DerivedKey::from_bits(&bits)?;
        debug!(bits = key.bit_len(), "derived amalgam key");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_kdf() -> DualKdf {
        DualKdf::new(KdfParams {
            bcrypt_cost: MIN_BCRYPT_COST,
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
        })
        .unwrap()
    }

    #[test]
    fn bcrypt_salt_string_roundtrip() {
        let salt = BcryptSalt::generate(12).unwrap();
        let text = salt.to_string();
        assert!(text.starts_with("$2b$12$"));
        assert_eq!(text.len(), 7 + BCRYPT_SALT_CHARS);
        assert_eq!(text.parse::<BcryptSalt>().unwrap(), salt);
    }

    #[test]
    fn bcrypt_salt_rejects_garbage() {
        assert!("$2a$10$abcdefghijklmnopqrstuv".parse::<BcryptSalt>().is_err());
        assert!("$2b$1$abcdefghijklmnopqrstuv".parse::<BcryptSalt>().is_err());
        assert!("$2b$10$short".parse::<BcryptSalt>().is_err());
        assert!("$2b$99$abcdefghijklmnopqrstuv".parse::<BcryptSalt>().is_err());
    }

    #[test]
    fn bcrypt_raw_is_184_bits() {
        let salt = BcryptSalt::generate(MIN_BCRYPT_COST).unwrap();
        let out = bcrypt_raw(b"password", &salt).unwrap();
        assert_eq!(out.len() * 8, BCRYPT_OUTPUT_BITS);
    }

    #[test]
    fn bit_writer_packs_unaligned_prefixes() {
        let mut bits = BitWriter::default();
        bits.push_prefix(&[0b1010_0000], 3);
        bits.push_prefix(&[0b1111_1111], 5);
        bits.push_prefix(&[0b0100_0000], 2);
        assert_eq!(bits.bit_len, 10);
        assert_eq!(bits.bytes, vec![0b1011_1111, 0b0100_0000]);
    }

    #[test]
    fn amalgam_keeps_bcrypt_prefix() {
        let kdf = fast_kdf();
        let (key, salts) = kdf.derive_new("hunter22").unwrap();

        let bcrypt_out = kdf.bcrypt.stretch(b"hunter22", &salts.bcrypt).unwrap();
        // The first 22 whole bytes of the amalgam are the first 176 BCrypt bits.
        assert_eq!(key.as_bytes()[..22], bcrypt_out[..22]);
    }

    #[test]
    fn derive_and_regenerate_match() {
        let kdf = fast_kdf();
        let (key, salts) = kdf.derive_new("correct horse").unwrap();
        assert_eq!(key.bit_len(), AMALGAM_BITS);
        assert_eq!(kdf.regenerate("correct horse", &salts).unwrap(), key);
    }

    #[test]
    fn empty_password_is_rejected() {
        let kdf = fast_kdf();
        assert!(matches!(
            kdf.derive_new(""),
            Err(ShellVaultError::Validation(_))
        ));
    }

    #[test]
    fn params_are_validated() {
        assert!(DualKdf::new(KdfParams {
            bcrypt_cost: 3,
            pbkdf2_iterations: 100_000
        })
        .is_err());
        assert!(DualKdf::new(KdfParams {
            bcrypt_cost: 10,
            pbkdf2_iterations: 10
        })
        .is_err());
    }

    #[test]
    fn symmetric_key_is_digest_of_amalgam() {
        let (key, _) = fast_kdf().derive_new("pw-for-digest").unwrap();
        let expected: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        assert_eq!(*key.symmetric_key(), expected);
    }

    #[test]
    fn debug_is_redacted() {
        let (key, _) = fast_kdf().derive_new("pw").unwrap();
        assert_eq!(format!("{key:?}"), "DerivedKey(<redacted>)");
    }
}
