//! Read-only support for RSA identities written by older clients.
//!
//! Those clients stored a PEM-encoded RSA-4096 private key inside the
//! password-wrapped payload and sealed each DEK with RSA-OAEP (SHA-1,
//! MGF1-SHA-1, matching OpenSSL's `PKCS1_OAEP_PADDING`). Such envelopes
//! can still be opened so `envelope rewrap` can move them to X25519.
//! Nothing new is ever encrypted with RSA.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::errors::CryptoError;

/// Envelope discriminator used by older clients.
pub const LEGACY_ENVELOPE_ALG: &str = "RSA-OAEP";

const PEM_PREFIX: &[u8] = b"-----BEGIN ";

/// Whether unwrapped key bytes look like a PEM document.
pub fn is_pem(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .is_some_and(|start| bytes[start..].starts_with(PEM_PREFIX))
}

/// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`)
/// PEM private key.
pub fn parse_private_key(pem: &[u8]) -> Result<RsaPrivateKey, CryptoError> {
    let text = std::str::from_utf8(pem).map_err(|_| CryptoError::InvalidPrivateKey)?;
    RsaPrivateKey::from_pkcs8_pem(text)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text))
        .map_err(|_| CryptoError::InvalidPrivateKey)
}

/// Decrypt an RSA-OAEP envelope body with a PEM private key.
pub fn decrypt_oaep(ciphertext: &[u8], pem: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let key = parse_private_key(pem)?;
    key.decrypt(Oaep::new::<Sha1>(), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailure)
}
