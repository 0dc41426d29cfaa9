//! Key lifecycle operations on environment envelopes.
//!
//! - `environment_key` / `open_or_create_key` recover the caller's DEK
//! - `rewrap` moves an envelope from an old identity to the current one
//! - `reset` replaces the DEK after explicit confirmation
//! - `repair` tries `rewrap` and falls back to a confirmed `reset`
//! - `share` wraps the DEK for every member still lacking access
//!
//! Every operation that writes to the server does so as its last step, so
//! a failure earlier on leaves remote state untouched.

use std::fmt;

use crate::api::{Member, RecipientEnvelope, StashApi};
use crate::crypto::{self, DataKey, PrivateKey, WrappedKey};
use crate::envelope::{create_envelope, open_envelope};
use crate::errors::{Result, StashError};

/// Where a rewrap was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewrapStage {
    Start,
    LoadOldPrivateKey,
    OpenOldEnvelope,
    FetchNewPublicKey,
    CreateNewEnvelope,
    Store,
    Done,
}

impl fmt::Display for RewrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Start => "starting",
            Self::LoadOldPrivateKey => "decrypting the old private key",
            Self::OpenOldEnvelope => "opening the existing envelope",
            Self::FetchNewPublicKey => "fetching your current public key",
            Self::CreateNewEnvelope => "creating the new envelope",
            Self::Store => "storing the new envelope",
            Self::Done => "finishing",
        };
        f.write_str(text)
    }
}

/// Whether the caller already holds an envelope for an environment.
#[derive(Debug)]
pub enum EnvelopeState {
    Found(DataKey),
    Missing,
}

/// Result of [`repair`].
#[derive(Debug)]
pub enum RepairOutcome {
    /// The existing DEK was recovered and rewrapped.
    Rewrapped(DataKey),
    /// The DEK was replaced; existing variables must be pushed again.
    Reset(DataKey),
}

/// Result of [`share`]. Per-recipient failures are data, not errors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShareReport {
    pub created: u32,
    pub updated: u32,
    pub errors: Vec<String>,
    /// Members that need access but have no public key yet.
    pub skipped: Vec<String>,
}

/// Decrypt a password-wrapped private key.
pub fn unlock_private_key(wrapped: &WrappedKey, password: &str) -> Result<PrivateKey> {
    let raw = crypto::unwrap(wrapped, password)?;
    Ok(PrivateKey::from_slice(&raw)?)
}

/// Open the caller's envelope for `environment_id`, if one exists.
pub fn environment_key<A: StashApi + ?Sized>(
    api: &A,
    environment_id: &str,
    private_key: &PrivateKey,
) -> Result<EnvelopeState> {
    match api.envelope(environment_id)? {
        Some(envelope) => {
            let dek = open_envelope(&envelope, private_key.as_bytes())?;
            tracing::debug!(environment_id, "opened environment envelope");
            Ok(EnvelopeState::Found(dek))
        }
        None => Ok(EnvelopeState::Missing),
    }
}

/// Like [`environment_key`], but creates the first DEK when none exists.
///
/// Returns the key and whether it was newly created.
pub fn open_or_create_key<A: StashApi + ?Sized>(
    api: &A,
    environment_id: &str,
    private_key: &PrivateKey,
) -> Result<(DataKey, bool)> {
    if let EnvelopeState::Found(dek) = environment_key(api, environment_id, private_key)? {
        return Ok((dek, false));
    }

    let dek = DataKey::generate();
    let envelope = create_envelope(&dek, &private_key.public_key()?)?;
    api.store_envelope(environment_id, &envelope)?;
    tracing::info!(environment_id, "created environment key");
    Ok((dek, true))
}

/// Recover the DEK with an old identity and wrap it for the caller's
/// current public key.
///
/// `old_key` is the wrapped private key the existing envelope was created
/// for. The envelope on the server is only replaced once everything else
/// has succeeded.
pub fn rewrap<A: StashApi + ?Sized>(
    api: &A,
    environment_id: &str,
    old_key: &WrappedKey,
    old_password: &str,
) -> Result<DataKey> {
    let mut stage = RewrapStage::Start;
    tracing::info!(environment_id, "rewrapping environment envelope");

    let fail = |stage: RewrapStage| {
        move |source: StashError| {
            tracing::warn!(%stage, error = %source, "rewrap failed");
            StashError::RewrapFailed {
                stage,
                source: Box::new(source),
            }
        }
    };

    stage = next(stage, RewrapStage::LoadOldPrivateKey);
    let old_private = unlock_private_key(old_key, old_password).map_err(fail(stage))?;

    stage = next(stage, RewrapStage::OpenOldEnvelope);
    let dek = api
        .envelope(environment_id)
        .and_then(|found| {
            found.ok_or_else(|| StashError::EnvelopeNotFound(environment_id.to_string()))
        })
        .and_then(|envelope| Ok(open_envelope(&envelope, old_private.as_bytes())?))
        .map_err(fail(stage))?;
    drop(old_private);

    stage = next(stage, RewrapStage::FetchNewPublicKey);
    let public_key = api
        .user_keys()
        .and_then(|keys| keys.ok_or(StashError::UserKeysNotFound))
        .and_then(|keys| Ok(keys.public_key_bytes()?))
        .map_err(fail(stage))?;

    stage = next(stage, RewrapStage::CreateNewEnvelope);
    let envelope = create_envelope(&dek, &public_key)
        .map_err(StashError::from)
        .map_err(fail(stage))?;

    stage = next(stage, RewrapStage::Store);
    api.store_envelope(environment_id, &envelope)
        .map_err(fail(stage))?;

    next(stage, RewrapStage::Done);
    tracing::info!(environment_id, "envelope rewrapped");
    Ok(dek)
}

fn next(from: RewrapStage, to: RewrapStage) -> RewrapStage {
    tracing::debug!(%from, %to, "rewrap stage");
    to
}

/// Replace the environment's DEK with a fresh one wrapped for the caller.
///
/// `confirm` is asked once before anything happens; answering no returns
/// [`StashError::UserCancelled`]. Values encrypted under the previous key
/// become unreadable and must be pushed again.
pub fn reset<A, F>(api: &A, environment_id: &str, confirm: F) -> Result<DataKey>
where
    A: StashApi + ?Sized,
    F: FnOnce(&str) -> Result<bool>,
{
    let question = format!(
        "Reset the key for environment '{environment_id}'? Existing variables will need to be re-uploaded."
    );
    if !confirm(&question)? {
        tracing::info!(environment_id, "reset declined");
        return Err(StashError::UserCancelled);
    }

    let public_key = api
        .user_keys()?
        .ok_or(StashError::UserKeysNotFound)?
        .public_key_bytes()?;

    let dek = DataKey::generate();
    let envelope = create_envelope(&dek, &public_key)?;
    api.store_envelope(environment_id, &envelope)?;
    tracing::info!(environment_id, "environment key reset");
    Ok(dek)
}

/// Try [`rewrap`]; if it fails, offer [`reset`] instead.
///
/// The rewrap error is handed to `confirm` so the prompt can explain why a
/// reset is being proposed. Declining returns [`StashError::UserCancelled`].
pub fn repair<A, F>(
    api: &A,
    environment_id: &str,
    old_key: Option<(&WrappedKey, &str)>,
    confirm: F,
) -> Result<RepairOutcome>
where
    A: StashApi + ?Sized,
    F: FnOnce(&StashError, &str) -> Result<bool>,
{
    let failure = match old_key {
        Some((key, password)) => match rewrap(api, environment_id, key, password) {
            Ok(dek) => return Ok(RepairOutcome::Rewrapped(dek)),
            Err(e) => e,
        },
        None => StashError::RewrapFailed {
            stage: RewrapStage::LoadOldPrivateKey,
            source: Box::new(StashError::KeyStore("no previous private key available".into())),
        },
    };

    reset(api, environment_id, |question| confirm(&failure, question)).map(RepairOutcome::Reset)
}

/// Wrap `dek` for every member that still needs access and upload the
/// batch in one call.
///
/// Members without a public key are skipped; envelope failures for one
/// member are collected and do not stop the others. Fails with
/// [`StashError::ShareFailed`], carrying every per-member error, only when
/// nobody could be served.
pub fn share<A: StashApi + ?Sized>(
    api: &A,
    environment_id: &str,
    dek: &DataKey,
    members: &[Member],
) -> Result<ShareReport> {
    let mut pending: Vec<&Member> = members
        .iter()
        .filter(|m| m.needs_envelope || !m.has_envelope)
        .collect();
    pending.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let mut report = ShareReport::default();
    let mut envelopes = Vec::with_capacity(pending.len());

    for member in pending {
        let public_key = match (&member.public_key, member.has_public_key) {
            (Some(key), true) if !key.is_empty() => key,
            _ => {
                report.skipped.push(member.user_id.clone());
                continue;
            }
        };

        let built = crypto::encoding::decode(public_key)
            .and_then(|key| create_envelope(dek, &key));
        match built {
            Ok(envelope) => envelopes.push(RecipientEnvelope {
                user_id: member.user_id.clone(),
                envelope,
            }),
            Err(e) => {
                tracing::warn!(user_id = %member.user_id, error = %e, "envelope creation failed");
                report.errors.push(format!("{}: {e}", display_name(member)));
            }
        }
    }

    if envelopes.is_empty() {
        if report.errors.is_empty() {
            return Ok(report);
        }
        return Err(StashError::ShareFailed(report.errors));
    }

    let result = api.store_envelopes(environment_id, &envelopes)?;
    report.created = result.created;
    report.updated = result.updated;
    report.errors.extend(result.errors);

    tracing::info!(
        environment_id,
        created = report.created,
        updated = report.updated,
        errors = report.errors.len(),
        skipped = report.skipped.len(),
        "shared environment key"
    );
    Ok(report)
}

fn display_name(member: &Member) -> &str {
    if member.name.is_empty() {
        &member.user_id
    } else {
        &member.name
    }
}
