//! Cryptographic primitives for SecretStash.
//!
//! This module provides:
//! - base64url encoding for payload fields (`encoding`)
//! - AES-256-GCM encryption of secret values (`encryption`)
//! - Argon2id / PBKDF2 password key derivation (`kdf`)
//! - password wrapping of the private key (`wrap`)
//! - X25519 key pairs and hybrid DEK transport (`keypair`)
//! - zeroizing DEK and private key holders (`keys`)
//! - read-only RSA-OAEP envelopes from older clients (`legacy`)

pub mod encoding;
pub mod encryption;
pub mod kdf;
pub mod keypair;
pub mod keys;
pub mod legacy;
pub mod wrap;

use rand::RngCore;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, wrap, unwrap, ...};
pub use encryption::{decrypt, encrypt, Payload};
pub use kdf::{Argon2Params, KdfParams};
pub use keypair::{decrypt_with_private_key, encrypt_for_recipient, generate_key_pair, KeyPair};
pub use keys::{DataKey, PrivateKey};
pub use wrap::{unwrap, wrap, WrappedKey};

/// Fill an `N`-byte array from the thread-local CSPRNG.
pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rng().fill_bytes(&mut buf);
    buf
}
