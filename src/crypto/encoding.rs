//! URL-safe, padding-free base64 for binary fields in JSON payloads.
//!
//! Standard alphabet with `+` → `-` and `/` → `_`, trailing `=` stripped.
//! Decoding also accepts padded input so values produced by other clients
//! still load.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::errors::CryptoError;

const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded base64url.
pub fn encode(data: &[u8]) -> String {
    BASE64URL.encode(data)
}

/// Decode a base64url string produced by [`encode`].
pub fn decode(data: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64URL
        .decode(data)
        .map_err(|e| CryptoError::Decode(e.to_string()))
}

/// Serde adapter: `#[serde(with = "crate::crypto::encoding::b64url")]`.
pub mod b64url {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(serde::de::Error::custom)
    }
}
