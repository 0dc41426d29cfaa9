//! Password-based wrapping of the user's private key.
//!
//! The password is stretched with the KDF named in the payload, then the
//! secret is sealed with AES-256-GCM. Salt, work factor and KDF name are
//! stored in the payload so `unwrap` never depends on current defaults.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::encoding::b64url;
use crate::crypto::encryption::{open, seal, IV_LEN};
use crate::crypto::kdf::{Argon2Params, KdfParams, KDF_ARGON2ID, KDF_PBKDF2};
use crate::crypto::random_bytes;
use crate::errors::CryptoError;

/// Cipher tag written into wrapped-key payloads.
pub const WRAP_ALG: &str = "AES-256-GCM";

/// Current wrapped-key format version.
pub const WRAP_VERSION: u32 = 1;

/// Length of the KDF salt in bytes.
const SALT_LEN: usize = 16;

/// A secret (the user's private key) protected by a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    #[serde(rename = "v")]
    pub version: u32,
    pub alg: String,
    pub kdf: String,
    #[serde(rename = "iter")]
    pub kdf_iterations: u32,
    /// Argon2 memory cost in KiB. Absent for PBKDF2.
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub kdf_memory_kib: Option<u32>,
    /// Argon2 lanes. Absent for PBKDF2.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub kdf_parallelism: Option<u32>,
    #[serde(with = "b64url")]
    pub salt: Vec<u8>,
    #[serde(with = "b64url")]
    pub iv: Vec<u8>,
    #[serde(rename = "tag", with = "b64url")]
    pub auth_tag: Vec<u8>,
    #[serde(rename = "ct", with = "b64url")]
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Rebuild the KDF parameters recorded in this payload.
    ///
    /// Argon2id payloads must carry `m` and `p`; current defaults are never
    /// substituted.
    pub fn kdf_params(&self) -> Result<KdfParams, CryptoError> {
        match self.kdf.as_str() {
            KDF_ARGON2ID => match (self.kdf_memory_kib, self.kdf_parallelism) {
                (Some(memory_kib), Some(parallelism)) => Ok(KdfParams::Argon2id(Argon2Params {
                    memory_kib,
                    iterations: self.kdf_iterations,
                    parallelism,
                })),
                _ => Err(CryptoError::UnsupportedKdf(format!(
                    "{KDF_ARGON2ID} without m/p"
                ))),
            },
            KDF_PBKDF2 => Ok(KdfParams::Pbkdf2 {
                iterations: self.kdf_iterations,
            }),
            other => Err(CryptoError::UnsupportedKdf(other.to_string())),
        }
    }
}

/// Protect `secret` with `password`.
pub fn wrap(secret: &[u8], password: &str, params: &KdfParams) -> Result<WrappedKey, CryptoError> {
    params.validate_for_wrap()?;

    let salt = random_bytes::<SALT_LEN>();
    let iv = random_bytes::<IV_LEN>();
    let derived = params.derive(password.as_bytes(), &salt)?;
    let (ciphertext, auth_tag) = seal(&derived[..], &iv, secret)?;

    let (kdf_memory_kib, kdf_parallelism) = match params {
        KdfParams::Argon2id(p) => (Some(p.memory_kib), Some(p.parallelism)),
        KdfParams::Pbkdf2 { .. } => (None, None),
    };

    Ok(WrappedKey {
        version: WRAP_VERSION,
        alg: WRAP_ALG.to_string(),
        kdf: params.name().to_string(),
        kdf_iterations: params.iterations(),
        kdf_memory_kib,
        kdf_parallelism,
        salt: salt.to_vec(),
        iv: iv.to_vec(),
        auth_tag,
        ciphertext,
    })
}

/// Recover the secret from a [`WrappedKey`].
pub fn unwrap(payload: &WrappedKey, password: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let params = payload.kdf_params()?;
    params.validate_for_unwrap()?;
    // Older clients wrote the generic "AES-GCM" tag for the same cipher.
    if payload.alg != WRAP_ALG && payload.alg != "AES-GCM" {
        return Err(CryptoError::UnsupportedAlgorithm(payload.alg.clone()));
    }

    let derived = params.derive(password.as_bytes(), &payload.salt)?;
    open(
        &derived[..],
        &payload.iv,
        &payload.ciphertext,
        &payload.auth_tag,
    )
    .map(Zeroizing::new)
    .ok_or(CryptoError::WrongPasswordOrCorruptData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    fn fast_params() -> KdfParams {
        KdfParams::Argon2id(Argon2Params {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn records_argon2_work_factor() {
        let wrapped = wrap(b"secret", "pw-12345", &fast_params()).unwrap();
        assert_eq!(wrapped.kdf, "Argon2id");
        assert_eq!(wrapped.alg, "AES-256-GCM");
        assert_eq!(wrapped.kdf_iterations, 1);
        assert_eq!(wrapped.kdf_memory_kib, Some(8_192));
        assert_eq!(wrapped.kdf_parallelism, Some(1));
        assert_eq!(wrapped.salt.len(), 16);
    }

    #[test]
    fn unknown_kdf_is_rejected_before_derivation() {
        let mut wrapped = wrap(b"secret", "pw-12345", &fast_params()).unwrap();
        wrapped.kdf = "scrypt".into();
        assert_eq!(
            unwrap(&wrapped, "pw-12345").unwrap_err(),
            CryptoError::UnsupportedKdf("scrypt".into())
        );
    }

    #[test]
    fn missing_argon2_costs_are_not_defaulted() {
        let mut wrapped = wrap(b"secret", "pw-12345", &fast_params()).unwrap();
        wrapped.kdf_memory_kib = None;
        assert_eq!(
            unwrap(&wrapped, "pw-12345").unwrap_err(),
            CryptoError::UnsupportedKdf("Argon2id without m/p".into())
        );
    }

    #[test]
    fn hostile_work_factor_fails_before_deriving() {
        let mut wrapped = wrap(b"secret", "pw-12345", &fast_params()).unwrap();
        wrapped.kdf_memory_kib = Some(u32::MAX);
        assert!(matches!(
            unwrap(&wrapped, "pw-12345").unwrap_err(),
            CryptoError::KeyDerivationFailed(_)
        ));

        let mut wrapped = wrap(b"secret", "pw-12345", &fast_params()).unwrap();
        wrapped.kdf = "PBKDF2".into();
        wrapped.kdf_iterations = u32::MAX;
        assert!(matches!(
            unwrap(&wrapped, "pw-12345").unwrap_err(),
            CryptoError::KeyDerivationFailed(_)
        ));
    }

    #[test]
    fn unwraps_legacy_pbkdf2_payload() {
        // Build a PBKDF2 payload directly, bypassing the wrap-time minimum,
        // the way a payload from an older client would look.
        let params = KdfParams::Pbkdf2 { iterations: 1_000 };
        let salt = [3u8; SALT_LEN];
        let iv = [4u8; IV_LEN];
        let rsa_key = rsa::RsaPrivateKey::new(&mut aes_gcm::aead::OsRng, 1024).unwrap();
        let pem = rsa_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let derived = params.derive(b"legacy-password", &salt).unwrap();
        let (ciphertext, auth_tag) = seal(&derived[..], &iv, pem.as_bytes()).unwrap();

        let payload = WrappedKey {
            version: 1,
            alg: "AES-256-GCM".into(),
            kdf: "PBKDF2".into(),
            kdf_iterations: 1_000,
            kdf_memory_kib: None,
            kdf_parallelism: None,
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            auth_tag,
            ciphertext,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("m").is_none());

        let secret = unwrap(&payload, "legacy-password").unwrap();
        assert_eq!(secret.as_slice(), pem.as_bytes());
        assert!(PrivateKey::from_slice(&secret).unwrap().is_legacy());
        assert_eq!(
            unwrap(&payload, "wrong-password").unwrap_err(),
            CryptoError::WrongPasswordOrCorruptData
        );
    }
}
