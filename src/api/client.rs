//! Blocking HTTP implementation of [`StashApi`].
//!
//! Every endpoint lives under `{api_url}/api/`, authenticates with a bearer
//! token and wraps its JSON body in a top-level `data` object.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ureq::http::Response;
use ureq::{Agent, Body};

use crate::api::{
    BulkEnvelopeResult, EnvironmentSummary, Member, RecipientEnvelope, RemoteVariable, StashApi,
    UserKeys,
};
use crate::crypto::{Payload, WrappedKey};
use crate::envelope::Envelope;
use crate::errors::{Result, StashError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct DataWrapper<T> {
    data: T,
}

#[derive(Deserialize)]
struct EnvelopeData {
    envelope: Option<Envelope>,
}

#[derive(Serialize)]
struct StoreUserKeys<'a> {
    public_key: &'a str,
    private_key_payload: &'a WrappedKey,
}

#[derive(Serialize)]
struct StoreEnvelope<'a> {
    envelope: &'a Envelope,
}

#[derive(Serialize)]
struct StoreEnvelopes<'a> {
    envelopes: &'a [RecipientEnvelope],
}

#[derive(Serialize)]
struct CreateVariable<'a> {
    name: &'a str,
    payload: &'a Payload,
}

/// SecretStash REST client.
pub struct HttpClient {
    agent: Agent,
    base_url: String,
    token: String,
}

impl HttpClient {
    /// Build a client for `api_url` (e.g. `https://stash.example.com`).
    pub fn new(api_url: &str, token: &str) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();

        Self {
            agent: Agent::new_with_config(config),
            base_url: format!("{}/api", api_url.trim_end_matches('/')),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn get(&self, path: &str) -> Result<Response<Body>> {
        tracing::debug!(path, "GET");
        self.agent
            .get(&self.url(path))
            .header("Authorization", &self.bearer())
            .header("Accept", "application/json")
            .call()
            .map_err(|e| StashError::Api(format!("GET {path}: {e}")))
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Response<Body>> {
        tracing::debug!(path, "POST");
        self.agent
            .post(&self.url(path))
            .header("Authorization", &self.bearer())
            .header("Accept", "application/json")
            .send_json(body)
            .map_err(|e| StashError::Api(format!("POST {path}: {e}")))
    }

    /// Read a `{ "data": ... }` body after mapping error statuses.
    fn read_data<T: DeserializeOwned>(path: &str, resp: Response<Body>) -> Result<T> {
        let mut resp = check_status(path, resp)?;
        let wrapper: DataWrapper<T> = resp
            .body_mut()
            .read_json()
            .map_err(|e| StashError::Api(format!("invalid response from {path}: {e}")))?;
        Ok(wrapper.data)
    }

    /// Like [`read_data`](Self::read_data) but `404` means "nothing stored".
    fn read_optional<T: DeserializeOwned>(path: &str, resp: Response<Body>) -> Result<Option<T>> {
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        Self::read_data(path, resp).map(Some)
    }
}

fn check_status(path: &str, resp: Response<Body>) -> Result<Response<Body>> {
    let status = resp.status().as_u16();
    match status {
        200..=299 => Ok(resp),
        401 | 403 => Err(StashError::InvalidApiToken),
        _ => {
            tracing::warn!(path, status, "API request rejected");
            Err(StashError::Api(format!("{path} returned HTTP {status}")))
        }
    }
}

impl StashApi for HttpClient {
    fn user_keys(&self) -> Result<Option<UserKeys>> {
        let path = "user-keys";
        let resp = self.get(path)?;
        // The server answers 200 with an empty public key before keys exist.
        let keys: Option<UserKeys> = Self::read_optional(path, resp)?;
        Ok(keys.filter(|k| !k.public_key.is_empty()))
    }

    fn store_user_keys(&self, public_key: &str, private_key_payload: &WrappedKey) -> Result<()> {
        let path = "user-keys";
        let body = StoreUserKeys {
            public_key,
            private_key_payload,
        };
        check_status(path, self.post(path, &body)?)?;
        Ok(())
    }

    fn environments(&self, application_id: &str) -> Result<Vec<EnvironmentSummary>> {
        let path = format!("applications/{application_id}/environments");
        let resp = self.get(&path)?;
        Self::read_data(&path, resp)
    }

    fn envelope(&self, environment_id: &str) -> Result<Option<Envelope>> {
        let path = format!("environments/{environment_id}/envelope");
        let resp = self.get(&path)?;
        let data: Option<EnvelopeData> = Self::read_optional(&path, resp)?;
        Ok(data.and_then(|d| d.envelope))
    }

    fn store_envelope(&self, environment_id: &str, envelope: &Envelope) -> Result<()> {
        let path = format!("environments/{environment_id}/envelope");
        check_status(&path, self.post(&path, &StoreEnvelope { envelope })?)?;
        Ok(())
    }

    fn store_envelopes(
        &self,
        environment_id: &str,
        envelopes: &[RecipientEnvelope],
    ) -> Result<BulkEnvelopeResult> {
        let path = format!("environments/{environment_id}/envelopes/bulk");
        let resp = self.post(&path, &StoreEnvelopes { envelopes })?;
        Self::read_data(&path, resp)
    }

    fn members(&self, environment_id: &str) -> Result<Vec<Member>> {
        let path = format!("environments/{environment_id}/members");
        let resp = self.get(&path)?;
        Self::read_data(&path, resp)
    }

    fn variables(&self, environment_id: &str) -> Result<Vec<RemoteVariable>> {
        let path = format!("environments/{environment_id}/variables");
        let resp = self.get(&path)?;
        Self::read_data(&path, resp)
    }

    fn create_variable(&self, environment_id: &str, name: &str, payload: &Payload) -> Result<()> {
        let path = format!("environments/{environment_id}/variables");
        check_status(&path, self.post(&path, &CreateVariable { name, payload })?)?;
        Ok(())
    }
}
