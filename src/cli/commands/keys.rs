//! `secret-stash keys`: manage the user's X25519 key pair.
//!
//! The private key is wrapped with a password-derived key before it is
//! written to disk or uploaded; the password itself never leaves the
//! machine.

use subtle::ConstantTimeEq;

use crate::api::StashApi;
use crate::cli::{confirm, output, prompt_new_password, spin, Context};
use crate::crypto::{encoding, generate_key_pair, wrap};
use crate::errors::{Result, StashError};

/// Execute `keys status`.
pub fn status(ctx: &Context) -> Result<()> {
    output::heading("Key Status");

    let local = ctx.store.load_user_key()?;
    output::status_line("Local private key", local.is_some(), "Present", "Missing");
    if let Some(key) = &local {
        output::tip(&format!(
            "{} (wrapped with {}, {} iterations)",
            ctx.store.user_key_path().display(),
            key.kdf,
            key.kdf_iterations
        ));
    }

    let server = ctx.client().and_then(|client| client.user_keys());
    match server {
        Ok(Some(keys)) => {
            output::status_line("Server public key", true, "Present", "");
            output::status_line(
                "Server private key (encrypted)",
                keys.private_key_payload.is_some(),
                "Present",
                "Missing",
            );
        }
        Ok(None) => output::status_line("Server keys", false, "", "Not uploaded"),
        Err(e) => {
            tracing::debug!(error = %e, "server key check failed");
            output::status_line("Server keys", false, "", "Unable to check");
        }
    }

    println!();
    if local.is_none() {
        output::info("Run `secret-stash keys init` to generate your encryption keys.");
    }
    Ok(())
}

/// Execute `keys init`.
pub fn init(ctx: &Context, force: bool) -> Result<()> {
    let client = ctx.client()?;

    // 1. Guard against silently replacing an identity.
    if !force && ctx.store.load_user_key()?.is_some() {
        let overwrite = confirm(
            "Keys already exist locally. Generate new keys? (This will require re-sharing all environments)",
            false,
        )?;
        if !overwrite {
            output::info("Initialization cancelled.");
            return Ok(());
        }
    }

    if !force {
        match client.user_keys() {
            Ok(Some(_)) => {
                let replace = confirm(
                    "Keys already exist on the server. Replace them? Existing envelopes will need a rewrap.",
                    false,
                )?;
                if !replace {
                    output::info("Initialization cancelled.");
                    output::tip("Run `secret-stash keys sync` to download your existing keys.");
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => output::warning(&format!(
                "Unable to check for server keys ({e}). Continuing may invalidate existing access."
            )),
        }
    }

    // 2. Choose the wrapping password.
    output::info("Choose a password to protect your private key.");
    output::info("This password is NEVER sent to the server and cannot be recovered if lost.");
    let password = prompt_new_password()?;

    // 3. Generate and wrap on a worker thread.
    let params = ctx.settings.kdf_params()?;
    let (public_key, wrapped) = spin("Generating keys...", move || {
        let pair = generate_key_pair();
        let wrapped = wrap(&pair.private_key[..], &password, &params)?;
        Ok::<_, StashError>((encoding::encode(&pair.public_key), wrapped))
    })??;
    output::success("Keys generated successfully!");

    // 4. Keep the previous key so existing envelopes can be rewrapped.
    if let Some(backup) = ctx.store.backup_user_key()? {
        output::tip(&format!("Previous key saved to {}", backup.display()));
    }
    ctx.store.save_user_key(&wrapped)?;
    output::success("Private key saved locally (encrypted).");

    // 5. Upload. A failure here leaves a usable local key.
    match client.store_user_keys(&public_key, &wrapped) {
        Ok(()) => output::success("Keys uploaded to server successfully!"),
        Err(e) => {
            output::error(&format!("Failed to upload keys to server: {e}"));
            output::warning(
                "Your keys are saved locally but not on the server. Run `secret-stash keys init --force` to retry the upload.",
            );
            return Err(e);
        }
    }

    tracing::info!(kdf = wrapped.kdf.as_str(), "initialized user keys");
    output::tip("You can now push variables and share environments with your team.");
    Ok(())
}

/// Execute `keys sync`.
pub fn sync(ctx: &Context) -> Result<()> {
    let client = ctx.client()?;

    output::info("Fetching keys from server...");
    let keys = client.user_keys()?.ok_or(StashError::UserKeysNotFound)?;
    let wrapped = keys.private_key_payload.ok_or(StashError::UserKeysNotFound)?;

    if let Some(backup) = ctx.store.replace_user_key(&wrapped)? {
        output::warning(&format!(
            "Your previous local key differed from the server's and was saved to {}",
            backup.display()
        ));
        output::tip("Use it with `secret-stash envelope rewrap --old-key-file` if envelopes were made for it.");
    }
    output::success("Your encrypted private key has been downloaded.");
    output::tip("You will need your password to decrypt it when using variables.");
    Ok(())
}

/// Execute `keys verify`: unlock the local key and compare its public half
/// with the one registered on the server.
pub fn verify(ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let keys = client.user_keys()?.ok_or(StashError::UserKeysNotFound)?;
    let private_key = ctx.unlock()?;

    let local_public = private_key.public_key()?;
    let server_public = keys.public_key_bytes()?;

    if bool::from(local_public[..].ct_eq(&server_public[..])) {
        output::success("Local private key matches the server's public key.");
        Ok(())
    } else {
        output::error("Local private key does NOT match the server's public key.");
        output::tip("Run `secret-stash keys sync` to download the key registered on the server.");
        Err(StashError::CommandFailed("key mismatch".into()))
    }
}

/// Execute `keys cached`.
pub fn cached(ctx: &Context) -> Result<()> {
    let keys = ctx.store.environment_keys()?;
    output::print_cached_keys_table(&keys);
    Ok(())
}

/// Execute `keys forget <environment_id>`.
pub fn forget(ctx: &Context, environment_id: &str) -> Result<()> {
    if ctx.store.remove_environment_key(environment_id)? {
        output::success(&format!("Removed cached key for '{environment_id}'."));
    } else {
        output::info(&format!("No cached key for '{environment_id}'."));
    }
    Ok(())
}
