//! In-memory holders for key material that zero themselves on drop.

use zeroize::{Zeroize, Zeroizing};

use crate::crypto::encoding;
use crate::crypto::encryption::{self, Payload, KEY_LEN};
use crate::crypto::keypair;
use crate::crypto::legacy;
use crate::crypto::random_bytes;
use crate::errors::CryptoError;

/// A per-environment Data Encryption Key (32 random bytes).
///
/// Use this to hold a DEK in memory so it cannot linger after the
/// command that opened it has finished.
#[derive(Zeroize, Clone, PartialEq, Eq)]
#[zeroize(drop)]
pub struct DataKey {
    bytes: [u8; KEY_LEN],
}

impl DataKey {
    /// Create a new `DataKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random DEK.
    pub fn generate() -> Self {
        Self::new(random_bytes::<KEY_LEN>())
    }

    /// Build a DEK from a byte slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::new(array))
    }

    /// Parse a base64url-encoded DEK (the `keys.json` format).
    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let raw = Zeroizing::new(encoding::decode(encoded)?);
        Self::from_slice(&raw)
    }

    /// Encode as base64url for the local cache.
    pub fn to_encoded(&self) -> String {
        encoding::encode(&self.bytes)
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Encrypt one secret value under this DEK.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Payload, CryptoError> {
        encryption::encrypt(plaintext, &self.bytes)
    }

    /// Decrypt one secret value under this DEK.
    pub fn decrypt(&self, payload: &Payload) -> Result<Vec<u8>, CryptoError> {
        encryption::decrypt(payload, &self.bytes)
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// A user's unwrapped private key.
#[derive(Clone)]
pub enum PrivateKey {
    /// The current identity format.
    X25519(Zeroizing<[u8; keypair::KEY_LEN]>),
    /// A PEM RSA key from an older client. It opens legacy envelopes only.
    LegacyRsa(Zeroizing<Vec<u8>>),
}

impl PrivateKey {
    pub fn new(bytes: [u8; keypair::KEY_LEN]) -> Self {
        Self::X25519(Zeroizing::new(bytes))
    }

    /// Take ownership of freshly unwrapped key bytes.
    ///
    /// 32 raw bytes are an X25519 key; a PEM document must parse as RSA.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if legacy::is_pem(bytes) {
            legacy::parse_private_key(bytes)?;
            return Ok(Self::LegacyRsa(Zeroizing::new(bytes.to_vec())));
        }
        let array: [u8; keypair::KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::new(array))
    }

    /// The raw key bytes (PEM text for a legacy key).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::X25519(bytes) => &bytes[..],
            Self::LegacyRsa(pem) => &pem[..],
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::LegacyRsa(_))
    }

    /// The matching X25519 public key.
    pub fn public_key(&self) -> Result<[u8; keypair::KEY_LEN], CryptoError> {
        match self {
            Self::X25519(bytes) => keypair::public_key_for(&bytes[..]),
            Self::LegacyRsa(_) => Err(CryptoError::LegacyPrivateKey),
        }
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X25519(_) => f.write_str("PrivateKey(..)"),
            Self::LegacyRsa(_) => f.write_str("PrivateKey::LegacyRsa(..)"),
        }
    }
}
