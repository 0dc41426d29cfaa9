//! X25519 identity keys and small-payload hybrid encryption.
//!
//! `encrypt_for_recipient` is ECIES-style: an ephemeral X25519 key agrees
//! a shared secret with the recipient, HKDF-SHA256 turns it into an
//! AES-256-GCM key, and the payload is sealed under a random nonce.
//!
//! Ciphertext layout:
//!   [ 32-byte ephemeral public key | 12-byte nonce | ciphertext + 16-byte tag ]
//!
//! Only meant for DEK transport; inputs above `MAX_PAYLOAD_LEN` are refused.

use aes_gcm::aead::OsRng;
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::encryption::{open, seal, IV_LEN, TAG_LEN};
use crate::crypto::random_bytes;
use crate::errors::CryptoError;

/// Raw length of an X25519 public or private key.
pub const KEY_LEN: usize = 32;

/// Largest payload `encrypt_for_recipient` accepts.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// HKDF context string binding derived keys to this scheme.
const HKDF_INFO: &[u8] = b"secret-stash envelope v1";

/// A user's long-term identity.
pub struct KeyPair {
    pub public_key: [u8; KEY_LEN],
    pub private_key: Zeroizing<[u8; KEY_LEN]>,
}

/// Generate a fresh X25519 key pair.
pub fn generate_key_pair() -> KeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    KeyPair {
        public_key: public.to_bytes(),
        private_key: Zeroizing::new(secret.to_bytes()),
    }
}

/// Derive the public half of a private key.
pub fn public_key_for(private_key: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    let secret = static_secret(private_key)?;
    Ok(PublicKey::from(&secret).to_bytes())
}

/// Encrypt `data` so only the holder of `public_key`'s private half can read it.
pub fn encrypt_for_recipient(data: &[u8], public_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() > MAX_PAYLOAD_LEN {
        return Err(CryptoError::PayloadTooLarge {
            len: data.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let recipient: [u8; KEY_LEN] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let recipient = PublicKey::from(recipient);

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient);
    // A low-order recipient key yields an all-zero shared secret.
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey);
    }

    let key = wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes())?;
    let nonce = random_bytes::<IV_LEN>();
    let (ciphertext, tag) = seal(&key[..], &nonce, data)?;

    let mut out = Vec::with_capacity(KEY_LEN + IV_LEN + ciphertext.len() + TAG_LEN);
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypt data produced by [`encrypt_for_recipient`].
pub fn decrypt_with_private_key(
    ciphertext: &[u8],
    private_key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let secret = static_secret(private_key)?;
    if ciphertext.len() < KEY_LEN + IV_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailure);
    }

    let (ephemeral, rest) = ciphertext.split_at(KEY_LEN);
    let (nonce, sealed) = rest.split_at(IV_LEN);
    let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let ephemeral: [u8; KEY_LEN] = ephemeral
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailure)?;
    let ephemeral = PublicKey::from(ephemeral);
    let shared = secret.diffie_hellman(&ephemeral);
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailure);
    }

    let own_public = PublicKey::from(&secret);
    let key = wrap_key(shared.as_bytes(), ephemeral.as_bytes(), own_public.as_bytes())?;
    open(&key[..], nonce, body, tag).ok_or(CryptoError::DecryptionFailure)
}

fn static_secret(private_key: &[u8]) -> Result<StaticSecret, CryptoError> {
    let bytes: Zeroizing<[u8; KEY_LEN]> = Zeroizing::new(
        private_key
            .try_into()
            .map_err(|_| CryptoError::InvalidPrivateKey)?,
    );
    Ok(StaticSecret::from(*bytes))
}

/// HKDF-SHA256 over the shared secret, salted with both public keys.
fn wrap_key(
    shared: &[u8],
    ephemeral_public: &[u8],
    recipient_public: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut salt = [0u8; 2 * KEY_LEN];
    salt[..KEY_LEN].copy_from_slice(ephemeral_public);
    salt[KEY_LEN..].copy_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(HKDF_INFO, &mut okm[..])
        .map_err(|e| CryptoError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}
