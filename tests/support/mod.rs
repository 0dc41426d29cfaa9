//! In-memory `StashApi` used by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use secret_stash::api::{
    BulkEnvelopeResult, EnvironmentSummary, Member, RecipientEnvelope, RemoteVariable, StashApi,
    UserKeys,
};
use secret_stash::crypto::encoding::encode;
use secret_stash::crypto::{Payload, WrappedKey};
use secret_stash::envelope::Envelope;
use secret_stash::errors::{Result, StashError};

/// A server that keeps everything in memory.
///
/// `envelope()` returns the caller's envelope; bulk uploads are recorded
/// separately so tests can inspect exactly what was sent.
#[derive(Default)]
pub struct FakeApi {
    pub user_keys: Mutex<Option<UserKeys>>,
    pub environments: Mutex<Vec<EnvironmentSummary>>,
    pub envelopes: Mutex<HashMap<String, Envelope>>,
    pub members: Mutex<HashMap<String, Vec<Member>>>,
    pub bulk_uploads: Mutex<Vec<(String, Vec<RecipientEnvelope>)>>,
    pub variables: Mutex<HashMap<String, Vec<RemoteVariable>>>,
    pub envelope_writes: Mutex<u32>,
    pub fail_variable: Mutex<Option<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `public_key` as the caller's current key.
    pub fn with_public_key(self, public_key: &[u8]) -> Self {
        *self.user_keys.lock().unwrap() = Some(UserKeys {
            public_key: encode(public_key),
            private_key_payload: None,
        });
        self
    }

    pub fn with_envelope(self, environment_id: &str, envelope: Envelope) -> Self {
        self.envelopes
            .lock()
            .unwrap()
            .insert(environment_id.to_string(), envelope);
        self
    }

    pub fn envelope_for(&self, environment_id: &str) -> Option<Envelope> {
        self.envelopes.lock().unwrap().get(environment_id).cloned()
    }

    pub fn writes(&self) -> u32 {
        *self.envelope_writes.lock().unwrap()
    }
}

impl StashApi for FakeApi {
    fn user_keys(&self) -> Result<Option<UserKeys>> {
        Ok(self.user_keys.lock().unwrap().clone())
    }

    fn store_user_keys(&self, public_key: &str, private_key_payload: &WrappedKey) -> Result<()> {
        *self.user_keys.lock().unwrap() = Some(UserKeys {
            public_key: public_key.to_string(),
            private_key_payload: Some(private_key_payload.clone()),
        });
        Ok(())
    }

    fn environments(&self, _application_id: &str) -> Result<Vec<EnvironmentSummary>> {
        Ok(self.environments.lock().unwrap().clone())
    }

    fn envelope(&self, environment_id: &str) -> Result<Option<Envelope>> {
        Ok(self.envelope_for(environment_id))
    }

    fn store_envelope(&self, environment_id: &str, envelope: &Envelope) -> Result<()> {
        *self.envelope_writes.lock().unwrap() += 1;
        self.envelopes
            .lock()
            .unwrap()
            .insert(environment_id.to_string(), envelope.clone());
        Ok(())
    }

    fn store_envelopes(
        &self,
        environment_id: &str,
        envelopes: &[RecipientEnvelope],
    ) -> Result<BulkEnvelopeResult> {
        let members = self.members(environment_id)?;
        let mut result = BulkEnvelopeResult::default();
        for recipient in envelopes {
            match members.iter().find(|m| m.user_id == recipient.user_id) {
                Some(m) if m.has_envelope => result.updated += 1,
                Some(_) => result.created += 1,
                None => result
                    .errors
                    .push(format!("{} is not a member", recipient.user_id)),
            }
        }
        self.bulk_uploads
            .lock()
            .unwrap()
            .push((environment_id.to_string(), envelopes.to_vec()));
        Ok(result)
    }

    fn members(&self, environment_id: &str) -> Result<Vec<Member>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(environment_id)
            .cloned()
            .unwrap_or_default())
    }

    fn variables(&self, environment_id: &str) -> Result<Vec<RemoteVariable>> {
        Ok(self
            .variables
            .lock()
            .unwrap()
            .get(environment_id)
            .cloned()
            .unwrap_or_default())
    }

    fn create_variable(&self, environment_id: &str, name: &str, payload: &Payload) -> Result<()> {
        if self.fail_variable.lock().unwrap().as_deref() == Some(name) {
            return Err(StashError::Api(format!("rejected {name}")));
        }
        self.variables
            .lock()
            .unwrap()
            .entry(environment_id.to_string())
            .or_default()
            .push(RemoteVariable {
                name: name.to_string(),
                payload: payload.clone(),
            });
        Ok(())
    }
}

/// A member with or without a registered public key.
pub fn member(user_id: &str, public_key: Option<&[u8]>) -> Member {
    Member {
        user_id: user_id.to_string(),
        name: format!("User {user_id}"),
        email: format!("{user_id}@example.com"),
        has_public_key: public_key.is_some(),
        public_key: public_key.map(encode),
        has_envelope: false,
        needs_envelope: true,
    }
}
