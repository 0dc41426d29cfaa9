//! AES-256-GCM encryption of individual secret values.
//!
//! Each call to `encrypt` draws a fresh random 12-byte IV and a 16-byte
//! salt. The salt is unused on this path (`kdf = "none"`) but keeps the
//! payload shape identical to a password-wrapped key.
//!
//! Wire layout (JSON, binary fields base64url):
//!   { "v": 1, "alg": "AES-GCM", "kdf": "none", "iter": 0,
//!     "salt": .., "iv": .., "tag": .., "ct": .. }

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use serde::{Deserialize, Serialize};

use crate::crypto::encoding::b64url;
use crate::crypto::random_bytes;
use crate::errors::CryptoError;

/// Algorithm tag written into every variable payload.
pub const PAYLOAD_ALG: &str = "AES-GCM";

/// Current payload format version.
pub const PAYLOAD_VERSION: u32 = 1;

/// Size of the AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Size of the AES-GCM nonce in bytes.
pub(crate) const IV_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub(crate) const TAG_LEN: usize = 16;

/// Size of the (format-only) salt field in bytes.
pub(crate) const SALT_LEN: usize = 16;

/// One secret value encrypted under an environment's DEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "v")]
    pub version: u32,
    pub alg: String,
    pub kdf: String,
    #[serde(rename = "iter")]
    pub kdf_iterations: u32,
    #[serde(with = "b64url")]
    pub salt: Vec<u8>,
    #[serde(with = "b64url")]
    pub iv: Vec<u8>,
    #[serde(rename = "tag", with = "b64url")]
    pub auth_tag: Vec<u8>,
    #[serde(rename = "ct", with = "b64url")]
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` under a 32-byte `key`.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Payload, CryptoError> {
    let iv = random_bytes::<IV_LEN>();
    let salt = random_bytes::<SALT_LEN>();
    let (ciphertext, auth_tag) = seal(key, &iv, plaintext)?;

    Ok(Payload {
        version: PAYLOAD_VERSION,
        alg: PAYLOAD_ALG.to_string(),
        kdf: "none".to_string(),
        kdf_iterations: 0,
        salt: salt.to_vec(),
        iv: iv.to_vec(),
        auth_tag,
        ciphertext,
    })
}

/// Decrypt a payload produced by [`encrypt`].
pub fn decrypt(payload: &Payload, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_key_len(key)?;
    if payload.alg != PAYLOAD_ALG {
        return Err(CryptoError::UnsupportedAlgorithm(payload.alg.clone()));
    }

    open(key, &payload.iv, &payload.ciphertext, &payload.auth_tag)
        .ok_or(CryptoError::AuthenticationFailure)
}

/// AES-256-GCM with a detached tag. Returns `(ciphertext, tag)`.
pub(crate) fn seal(
    key: &[u8],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    check_key_len(key)?;
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailed(format!("invalid key: {e}")))?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer)
        .map_err(|e| CryptoError::EncryptionFailed(format!("encryption error: {e}")))?;

    Ok((buffer, tag.to_vec()))
}

/// Inverse of [`seal`]. Any failure (bad lengths, wrong key, tampering)
/// collapses to `None` so callers pick the error variant for their layer.
pub(crate) fn open(key: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8]) -> Option<Vec<u8>> {
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return None;
    }
    let cipher = Aes256Gcm::new_from_slice(key).ok()?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .ok()?;
    Some(buffer)
}

fn check_key_len(key: &[u8]) -> Result<(), CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        });
    }
    Ok(())
}
