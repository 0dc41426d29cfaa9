//! Per-recipient envelopes around an environment's DEK.
//!
//! An envelope is the DEK encrypted for one user's public key. One exists
//! for every (environment, recipient) pair; only the matching private key
//! opens it.
//!
//! New envelopes are always `X25519-AES-GCM`. `RSA-OAEP` envelopes from
//! older clients are opened but never created.

pub mod protocol;

use serde::{Deserialize, Serialize};

use crate::crypto::encoding::b64url;
use crate::crypto::keypair::{decrypt_with_private_key, encrypt_for_recipient};
use crate::crypto::legacy::{self, LEGACY_ENVELOPE_ALG};
use crate::crypto::DataKey;
use crate::errors::CryptoError;

/// Discriminator for X25519 + HKDF-SHA256 + AES-256-GCM envelopes.
pub const ENVELOPE_ALG: &str = "X25519-AES-GCM";

/// Current envelope format version.
pub const ENVELOPE_VERSION: u32 = 1;

/// The DEK wrapped for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "v")]
    pub version: u32,
    pub alg: String,
    #[serde(rename = "ct", with = "b64url")]
    pub ciphertext: Vec<u8>,
}

/// Wrap `dek` for the owner of `public_key`.
pub fn create_envelope(dek: &DataKey, public_key: &[u8]) -> Result<Envelope, CryptoError> {
    let ciphertext = encrypt_for_recipient(dek.as_bytes(), public_key)?;
    Ok(Envelope {
        version: ENVELOPE_VERSION,
        alg: ENVELOPE_ALG.to_string(),
        ciphertext,
    })
}

/// Recover the DEK from an envelope addressed to `private_key`.
///
/// `private_key` is the raw X25519 key, or the PEM text of a legacy RSA
/// key when the envelope is `RSA-OAEP`.
pub fn open_envelope(envelope: &Envelope, private_key: &[u8]) -> Result<DataKey, CryptoError> {
    let raw = match envelope.alg.as_str() {
        ENVELOPE_ALG => zeroize::Zeroizing::new(decrypt_with_private_key(
            &envelope.ciphertext,
            private_key,
        )?),
        LEGACY_ENVELOPE_ALG => legacy::decrypt_oaep(&envelope.ciphertext, private_key)?,
        other => return Err(CryptoError::UnsupportedEnvelopeAlgorithm(other.to_string())),
    };
    DataKey::from_slice(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_key_pair;

    #[test]
    fn envelope_is_tagged() {
        let pair = generate_key_pair();
        let envelope = create_envelope(&DataKey::generate(), &pair.public_key).unwrap();
        assert_eq!(envelope.version, 1);
        assert_eq!(envelope.alg, ENVELOPE_ALG);

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("ct").and_then(|v| v.as_str()).is_some());
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let pair = generate_key_pair();
        let mut envelope = create_envelope(&DataKey::generate(), &pair.public_key).unwrap();
        envelope.alg = "RSA-OAEP-256".into();
        assert_eq!(
            open_envelope(&envelope, &pair.private_key[..]).unwrap_err(),
            CryptoError::UnsupportedEnvelopeAlgorithm("RSA-OAEP-256".into())
        );
    }

    #[test]
    fn legacy_envelope_needs_a_pem_key() {
        let pair = generate_key_pair();
        let envelope = Envelope {
            version: 1,
            alg: LEGACY_ENVELOPE_ALG.into(),
            ciphertext: vec![0u8; 512],
        };
        assert_eq!(
            open_envelope(&envelope, &pair.private_key[..]).unwrap_err(),
            CryptoError::InvalidPrivateKey
        );
    }

    #[test]
    fn wrong_private_key_cannot_open() {
        let alice = generate_key_pair();
        let bob = generate_key_pair();
        let envelope = create_envelope(&DataKey::generate(), &alice.public_key).unwrap();
        assert_eq!(
            open_envelope(&envelope, &bob.private_key[..]).unwrap_err(),
            CryptoError::DecryptionFailure
        );
    }
}
