//! `secret-stash variables`: sync a `.env` file with the server.
//!
//! Values are encrypted with the environment's DEK before upload and
//! decrypted locally after download. The server only stores payloads.

use std::collections::BTreeMap;
use std::path::Path;

use zeroize::Zeroizing;

use crate::api::StashApi;
use crate::cli::env_parser::{parse_env_file, write_merged_env};
use crate::cli::{output, Context};
use crate::crypto::DataKey;
use crate::envelope::protocol::{self, EnvelopeState};
use crate::errors::{Result, StashError};
use crate::keystore::KeyStore;

/// Outcome of uploading a batch of variables.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub created: u32,
    pub failed: Vec<String>,
}

/// Outcome of downloading an environment's variables.
#[derive(Debug, Default)]
pub struct PullReport {
    pub values: BTreeMap<String, String>,
    pub failed: Vec<String>,
}

/// Encrypt and upload each variable. One failure never stops the rest.
pub fn push_variables<A: StashApi + ?Sized>(
    api: &A,
    environment_id: &str,
    dek: &DataKey,
    vars: &[(String, String)],
) -> PushReport {
    let mut report = PushReport::default();

    for (name, value) in vars {
        let result = dek
            .encrypt(value.as_bytes())
            .map_err(StashError::from)
            .and_then(|payload| api.create_variable(environment_id, name, &payload));
        match result {
            Ok(()) => report.created += 1,
            Err(e) => {
                tracing::warn!(variable = name.as_str(), error = %e, "push failed");
                report.failed.push(name.clone());
            }
        }
    }

    report
}

/// Download and decrypt every variable not excluded by `ignored`.
pub fn pull_variables<A, F>(
    api: &A,
    environment_id: &str,
    dek: &DataKey,
    ignored: F,
) -> Result<PullReport>
where
    A: StashApi + ?Sized,
    F: Fn(&str) -> bool,
{
    let mut report = PullReport::default();

    for variable in api.variables(environment_id)? {
        if ignored(&variable.name) {
            continue;
        }
        let plaintext = dek
            .decrypt(&variable.payload)
            .map(Zeroizing::new)
            .map_err(StashError::from)
            .and_then(|bytes| {
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| StashError::CommandFailed("value is not UTF-8".into()))
            });
        match plaintext {
            Ok(value) => {
                report.values.insert(variable.name, value);
            }
            Err(e) => {
                tracing::warn!(variable = variable.name.as_str(), error = %e, "pull failed");
                report.failed.push(variable.name);
            }
        }
    }

    Ok(report)
}

/// Drop a cached DEK that failed to decrypt part of a pull.
///
/// That usually means the environment was reset from another machine and
/// the cache now holds an orphaned key. Returns whether an entry was removed.
pub fn forget_stale_cached_key(
    store: &KeyStore,
    environment_id: &str,
    report: &PullReport,
) -> Result<bool> {
    if report.failed.is_empty() {
        return Ok(false);
    }
    let removed = store.remove_environment_key(environment_id)?;
    if removed {
        tracing::warn!(environment_id, failed = report.failed.len(), "dropped stale cached key");
    }
    Ok(removed)
}

/// Execute `variables push`.
pub fn push(ctx: &Context, file: &Path, remember: bool) -> Result<()> {
    // 1. Read the file, dropping variables that must never leave the machine.
    let vars: Vec<(String, String)> = parse_env_file(file)?
        .into_iter()
        .filter(|(name, _)| !ctx.settings.is_ignored(name))
        .collect();
    if vars.is_empty() {
        output::info(&format!("No variables to push in {}.", file.display()));
        return Ok(());
    }

    // 2. Resolve the environment and its key (created on first push).
    let client = ctx.client()?;
    let environment_id = ctx.environment_id(&client)?;
    let dek = match ctx.store.environment_key(&environment_id)? {
        Some(cached) => {
            output::warning("Using the environment key cached in keys.json.");
            output::tip(&format!(
                "If the key was reset elsewhere, run `secret-stash keys forget {environment_id}` first."
            ));
            cached
        }
        None => {
            let private_key = ctx.unlock()?;
            let (dek, created) =
                protocol::open_or_create_key(&client, &environment_id, &private_key)?;
            if created {
                output::info("Created a new encryption key for this environment.");
            }
            dek
        }
    };
    if remember {
        ctx.store.set_environment_key(&environment_id, &dek)?;
    }

    // 3. Encrypt and upload.
    output::info(&format!("Pushing {} variable(s)...", vars.len()));
    let report = push_variables(&client, &environment_id, &dek, &vars);

    output::success(&format!("Pushed {} variable(s).", report.created));
    if !report.failed.is_empty() {
        output::warning(&format!(
            "Failed to push {} variable(s): {}",
            report.failed.len(),
            report.failed.join(", ")
        ));
    }
    Ok(())
}

/// Execute `variables pull`.
pub fn pull(ctx: &Context, file: &Path, remember: bool) -> Result<()> {
    let client = ctx.client()?;
    let environment_id = ctx.environment_id(&client)?;

    let cached = ctx.store.environment_key(&environment_id)?;
    let from_cache = cached.is_some();
    let dek = match cached {
        Some(cached) => cached,
        None => {
            let private_key = ctx.unlock()?;
            match protocol::environment_key(&client, &environment_id, &private_key)? {
                EnvelopeState::Found(dek) => dek,
                EnvelopeState::Missing => {
                    return Err(StashError::EnvelopeNotFound(environment_id))
                }
            }
        }
    };
    if remember {
        ctx.store.set_environment_key(&environment_id, &dek)?;
    }

    let report = pull_variables(&client, &environment_id, &dek, |name| {
        ctx.settings.is_ignored(name)
    })?;
    if from_cache && forget_stale_cached_key(&ctx.store, &environment_id, &report)? {
        output::warning("The cached key could not decrypt every variable and was removed from keys.json.");
        output::tip("Pull again to fetch the current key from the server.");
    }
    if report.values.is_empty() && report.failed.is_empty() {
        output::info("No variables stored for this environment.");
        return Ok(());
    }

    write_merged_env(file, &report.values)?;
    output::success(&format!(
        "Pulled {} variable(s) into {}.",
        report.values.len(),
        file.display()
    ));
    if !report.failed.is_empty() {
        output::warning(&format!(
            "Could not decrypt {} variable(s): {}",
            report.failed.len(),
            report.failed.join(", ")
        ));
        output::tip("They may have been encrypted with a key that was since reset.");
    }
    Ok(())
}
