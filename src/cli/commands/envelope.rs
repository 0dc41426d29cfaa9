//! `secret-stash envelope`: recover access after a key change.
//!
//! `rewrap` needs the old encrypted private key (and its password) that
//! the current envelope was created for. `reset` throws the environment
//! key away and starts over. `repair` tries the first and offers the
//! second.

use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::cli::{confirm, expand_home, output, prompt_password, Context, OLD_PASSWORD_ENV};
use crate::crypto::{DataKey, WrappedKey};
use crate::envelope::protocol::{self, RepairOutcome};
use crate::errors::{Result, StashError};
use crate::keystore::KeyStore;

/// Execute `envelope rewrap`.
pub fn rewrap(ctx: &Context, old_key_file: Option<&str>) -> Result<()> {
    let client = ctx.client()?;
    let environment_id = ctx.environment_id(&client)?;

    let (old_key, old_password) = load_old_identity(ctx, old_key_file)?;

    output::info("Rewrapping environment envelope...");
    let dek = protocol::rewrap(&client, &environment_id, &old_key, &old_password)?;
    refresh_cache(ctx, &environment_id, &dek)?;

    println!();
    output::success("Envelope rewrapped successfully!");
    Ok(())
}

/// Execute `envelope repair`.
pub fn repair(ctx: &Context, old_key_file: Option<&str>) -> Result<()> {
    let client = ctx.client()?;
    let environment_id = ctx.environment_id(&client)?;

    let old_identity = match load_old_identity(ctx, old_key_file) {
        Ok(found) => Some(found),
        Err(e @ StashError::PrivateKeyNotFound(_)) => {
            output::warning(&e.to_string());
            None
        }
        Err(e) => return Err(e),
    };

    let outcome = protocol::repair(
        &client,
        &environment_id,
        old_identity
            .as_ref()
            .map(|(key, password)| (key, password.as_str())),
        |failure, question| {
            output::warning(&format!("Unable to rewrap the envelope: {failure}"));
            confirm(question, false)
        },
    )?;

    println!();
    match outcome {
        RepairOutcome::Rewrapped(dek) => {
            refresh_cache(ctx, &environment_id, &dek)?;
            output::success("Envelope rewrapped successfully!");
        }
        RepairOutcome::Reset(_) => {
            ctx.store.remove_environment_key(&environment_id)?;
            print_reset_success();
        }
    }
    Ok(())
}

/// Execute `envelope reset`.
pub fn reset(ctx: &Context, yes: bool) -> Result<()> {
    let client = ctx.client()?;
    let environment_id = ctx.environment_id(&client)?;

    protocol::reset(&client, &environment_id, |question| {
        if yes {
            Ok(true)
        } else {
            confirm(question, false)
        }
    })?;
    ctx.store.remove_environment_key(&environment_id)?;

    println!();
    print_reset_success();
    Ok(())
}

fn print_reset_success() {
    output::success("Environment key reset successfully!");
    output::tip("Re-upload your variables to encrypt them with the new key.");
}

/// Read the old wrapped key and its password.
///
/// Defaults to the key `keys init` set aside when it replaced the previous
/// identity.
fn load_old_identity(
    ctx: &Context,
    old_key_file: Option<&str>,
) -> Result<(WrappedKey, Zeroizing<String>)> {
    let path: PathBuf = match old_key_file {
        Some(p) => expand_home(p),
        None => ctx.store.previous_user_key_path(),
    };
    let old_key = KeyStore::load_user_key_from(&path)?;
    let password = prompt_password("Enter the old private key password", OLD_PASSWORD_ENV)?;
    Ok((old_key, password))
}

/// Keep a cached DEK in sync after the envelope changed.
fn refresh_cache(ctx: &Context, environment_id: &str, dek: &DataKey) -> Result<()> {
    if ctx.store.environment_key(environment_id)?.is_some() {
        ctx.store.set_environment_key(environment_id, dek)?;
    }
    Ok(())
}
