//! The remote service boundary.
//!
//! The server only ever sees public keys, password-wrapped private keys,
//! envelopes and encrypted variable payloads. `StashApi` names exactly the
//! calls the envelope protocol and the commands depend on, so the protocol
//! can run against any backend.

pub mod client;

use serde::{Deserialize, Serialize};

use crate::crypto::encoding;
use crate::crypto::{Payload, WrappedKey};
use crate::envelope::Envelope;
use crate::errors::{CryptoError, Result};

pub use client::HttpClient;

/// The caller's key material as registered on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKeys {
    /// base64url-encoded X25519 public key.
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_payload: Option<WrappedKey>,
}

impl UserKeys {
    /// Decode the public key to raw bytes.
    pub fn public_key_bytes(&self) -> std::result::Result<Vec<u8>, CryptoError> {
        encoding::decode(&self.public_key)
    }
}

/// One environment of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub slug: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// An organization member and their access to one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub has_public_key: bool,
    #[serde(default)]
    pub public_key: Option<String>,
    pub has_envelope: bool,
    pub needs_envelope: bool,
}

/// An envelope addressed to one member, as uploaded in a bulk share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEnvelope {
    pub user_id: String,
    pub envelope: Envelope,
}

/// Server-side outcome of a bulk envelope upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkEnvelopeResult {
    pub created: u32,
    pub updated: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// An encrypted variable as stored on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVariable {
    pub name: String,
    pub payload: Payload,
}

/// Remote calls consumed by SecretStash.
///
/// Getters return `Ok(None)` when the server has nothing stored, so
/// "create on first use" is an ordinary branch for callers.
pub trait StashApi {
    /// `GET user-keys`
    fn user_keys(&self) -> Result<Option<UserKeys>>;

    /// `POST user-keys`
    fn store_user_keys(&self, public_key: &str, private_key_payload: &WrappedKey) -> Result<()>;

    /// `GET applications/{id}/environments`
    fn environments(&self, application_id: &str) -> Result<Vec<EnvironmentSummary>>;

    /// `GET environments/{id}/envelope`
    fn envelope(&self, environment_id: &str) -> Result<Option<Envelope>>;

    /// `POST environments/{id}/envelope`
    fn store_envelope(&self, environment_id: &str, envelope: &Envelope) -> Result<()>;

    /// `POST environments/{id}/envelopes/bulk`
    fn store_envelopes(
        &self,
        environment_id: &str,
        envelopes: &[RecipientEnvelope],
    ) -> Result<BulkEnvelopeResult>;

    /// `GET environments/{id}/members`
    fn members(&self, environment_id: &str) -> Result<Vec<Member>>;

    /// `GET environments/{id}/variables`
    fn variables(&self, environment_id: &str) -> Result<Vec<RemoteVariable>>;

    /// `POST environments/{id}/variables`
    fn create_variable(&self, environment_id: &str, name: &str, payload: &Payload) -> Result<()>;
}
