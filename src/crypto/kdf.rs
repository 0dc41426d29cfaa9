//! Password-based key derivation.
//!
//! Argon2id is the default for new wraps: it is memory-hard and resists
//! GPU brute force. PBKDF2-HMAC-SHA256 is kept so private keys wrapped by
//! older clients (600 000 iterations) still open.
//!
//! The work factor is always stored next to the ciphertext, so raising
//! the defaults here never breaks an existing payload.

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::errors::CryptoError;

/// Length of the derived key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// KDF tag recorded for Argon2id payloads.
pub const KDF_ARGON2ID: &str = "Argon2id";

/// KDF tag recorded for PBKDF2-HMAC-SHA256 payloads.
pub const KDF_PBKDF2: &str = "PBKDF2";

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Minimum PBKDF2-HMAC-SHA256 iteration count for new wraps.
pub const MIN_PBKDF2_ITERATIONS: u32 = 600_000;

/// Largest Argon2 memory cost accepted from a payload (4 GiB).
pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Largest Argon2 time cost accepted from a payload.
pub const MAX_ARGON2_ITERATIONS: u32 = 64;

/// Largest Argon2 lane count accepted from a payload.
pub const MAX_PARALLELISM: u32 = 64;

/// Largest PBKDF2 iteration count accepted from a payload.
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Configurable Argon2id parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl Argon2Params {
    fn validate(&self) -> Result<(), CryptoError> {
        if self.memory_kib < MIN_MEMORY_KIB {
            return Err(CryptoError::KeyDerivationFailed(format!(
                "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
                self.memory_kib
            )));
        }
        if self.iterations < 1 {
            return Err(CryptoError::KeyDerivationFailed(
                "Argon2 iterations must be at least 1".into(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::KeyDerivationFailed(
                "Argon2 parallelism must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Which KDF to use for a new wrap, with its work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    Argon2id(Argon2Params),
    Pbkdf2 { iterations: u32 },
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::Argon2id(Argon2Params::default())
    }
}

impl KdfParams {
    /// The tag written into the payload's `kdf` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Argon2id(_) => KDF_ARGON2ID,
            Self::Pbkdf2 { .. } => KDF_PBKDF2,
        }
    }

    /// The value written into the payload's `iter` field.
    pub fn iterations(&self) -> u32 {
        match self {
            Self::Argon2id(p) => p.iterations,
            Self::Pbkdf2 { iterations } => *iterations,
        }
    }

    /// Reject work factors too weak for a fresh wrap.
    ///
    /// Only applied when wrapping; unwrapping honours whatever the
    /// payload recorded, within [`KdfParams::validate_for_unwrap`].
    pub fn validate_for_wrap(&self) -> Result<(), CryptoError> {
        match self {
            Self::Argon2id(p) => p.validate(),
            Self::Pbkdf2 { iterations } if *iterations < MIN_PBKDF2_ITERATIONS => {
                Err(CryptoError::KeyDerivationFailed(format!(
                    "PBKDF2 iterations must be at least {MIN_PBKDF2_ITERATIONS} (got {iterations})"
                )))
            }
            Self::Pbkdf2 { .. } => Ok(()),
        }
    }

    /// Reject work factors a stored payload could use to exhaust memory or
    /// stall the process. Weak but bounded values are accepted.
    pub fn validate_for_unwrap(&self) -> Result<(), CryptoError> {
        let out_of_range = |what: &str, value: u32, max: u32| {
            Err(CryptoError::KeyDerivationFailed(format!(
                "{what} {value} is outside the accepted range (1..={max})"
            )))
        };
        match self {
            Self::Argon2id(p) => {
                if !(1..=MAX_MEMORY_KIB).contains(&p.memory_kib) {
                    return out_of_range("Argon2 memory_kib", p.memory_kib, MAX_MEMORY_KIB);
                }
                if !(1..=MAX_ARGON2_ITERATIONS).contains(&p.iterations) {
                    return out_of_range("Argon2 iterations", p.iterations, MAX_ARGON2_ITERATIONS);
                }
                if !(1..=MAX_PARALLELISM).contains(&p.parallelism) {
                    return out_of_range("Argon2 parallelism", p.parallelism, MAX_PARALLELISM);
                }
                Ok(())
            }
            Self::Pbkdf2 { iterations } if !(1..=MAX_PBKDF2_ITERATIONS).contains(iterations) => {
                out_of_range("PBKDF2 iterations", *iterations, MAX_PBKDF2_ITERATIONS)
            }
            Self::Pbkdf2 { .. } => Ok(()),
        }
    }

    /// Derive a 32-byte key from `password` and `salt`.
    ///
    /// The same password + salt + params always produce the same key.
    pub fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        match self {
            Self::Argon2id(p) => derive_argon2id(password, salt, p),
            Self::Pbkdf2 { iterations } => derive_pbkdf2(password, salt, *iterations),
        }
    }
}

fn derive_argon2id(
    password: &[u8],
    salt: &[u8],
    argon2_params: &Argon2Params,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(
        argon2_params.memory_kib,
        argon2_params.iterations,
        argon2_params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

fn derive_pbkdf2(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    if iterations < 1 {
        return Err(CryptoError::KeyDerivationFailed(
            "PBKDF2 iterations must be at least 1".into(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key[..]);
    Ok(key)
}
