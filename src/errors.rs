use std::path::PathBuf;
use thiserror::Error;

use crate::envelope::protocol::RewrapStage;

/// Failures of the cryptographic primitives.
///
/// None of these messages carry key material; a wrong key and a corrupted
/// ciphertext surface as the same variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key length — expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Authentication failed — wrong key or corrupted data")]
    AuthenticationFailure,

    #[error("Unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("Failed to decrypt private key — wrong password or corrupted data")]
    WrongPasswordOrCorruptData,

    #[error("Unsupported KDF '{0}'")]
    UnsupportedKdf(String),

    #[error("Decryption failed — wrong private key or corrupted ciphertext")]
    DecryptionFailure,

    #[error("Payload too large — {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Legacy RSA private key — it can open old envelopes but cannot receive new ones")]
    LegacyPrivateKey,

    #[error("Unsupported envelope algorithm '{0}'")]
    UnsupportedEnvelopeAlgorithm(String),

    #[error("Invalid base64url data: {0}")]
    Decode(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
}

/// All errors that can occur in SecretStash.
#[derive(Debug, Error)]
pub enum StashError {
    // --- Crypto errors ---
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    // --- Configuration errors ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid API token — the server rejected the request")]
    InvalidApiToken,

    #[error("API request failed: {0}")]
    Api(String),

    // --- Not found ---
    #[error("Private key not found at {0}")]
    PrivateKeyNotFound(PathBuf),

    #[error("No user keys registered on the server")]
    UserKeysNotFound,

    #[error("No envelope found for environment '{0}'")]
    EnvelopeNotFound(String),

    #[error("Environment '{0}' not found")]
    EnvironmentNotFound(String),

    #[error("No environments found for application '{0}'")]
    NoEnvironmentsFound(String),

    #[error("File not found: {0}")]
    EnvFileNotFound(PathBuf),

    // --- Protocol errors ---
    #[error("Rewrap failed while {stage}: {source}")]
    RewrapFailed {
        stage: RewrapStage,
        #[source]
        source: Box<StashError>,
    },

    #[error("Failed to create any envelopes — {}", .0.join("; "))]
    ShareFailed(Vec<String>),

    // --- Local storage ---
    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("Password mismatch — passwords do not match")]
    PasswordMismatch,
}

impl StashError {
    /// A guided next step for errors the operator can fix, if any.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::PrivateKeyNotFound(_) => Some(
                "Run `secret-stash keys init` to create keys, or `secret-stash keys sync` to download them.",
            ),
            Self::UserKeysNotFound => Some("Run `secret-stash keys init` first."),
            Self::EnvelopeNotFound(_) => Some(
                "Push variables to create the environment key, or ask a teammate to run `secret-stash share`.",
            ),
            Self::EnvironmentNotFound(_) | Self::NoEnvironmentsFound(_) => {
                Some("Check the --environment value or create the environment on the server.")
            }
            Self::Configuration(_) => Some(
                "Set SECRET_STASH_APPLICATION_ID / SECRET_STASH_API_TOKEN or pass the matching flags.",
            ),
            Self::InvalidApiToken => Some("Generate a new API token and set SECRET_STASH_API_TOKEN."),
            Self::Crypto(CryptoError::LegacyPrivateKey) => Some(
                "Run `secret-stash keys init`, then `secret-stash envelope rewrap` to move your environments to the new key.",
            ),
            Self::RewrapFailed { .. } => {
                Some("Run `secret-stash envelope repair` to reset the environment key instead.")
            }
            _ => None,
        }
    }
}

/// Convenience type alias for SecretStash results.
pub type Result<T> = std::result::Result<T, StashError>;
