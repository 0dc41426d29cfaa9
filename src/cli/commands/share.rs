//! `secret-stash share`: grant team members access to an environment.

use crate::api::StashApi;
use crate::cli::{confirm, output, Context};
use crate::envelope::protocol::{self, EnvelopeState};
use crate::errors::{Result, StashError};

/// Execute the `share` command.
pub fn execute(ctx: &Context, yes: bool) -> Result<()> {
    let client = ctx.client()?;
    let environment_id = ctx.environment_id(&client)?;

    // 1. Show who can read the environment today.
    output::heading("Environment Sharing Status");
    let members = client.members(&environment_id)?;
    if members.is_empty() {
        return Err(StashError::CommandFailed(
            "No organization members found.".into(),
        ));
    }
    output::print_members_table(&members);

    let pending = members
        .iter()
        .filter(|m| m.needs_envelope || !m.has_envelope)
        .count();
    if pending == 0 {
        println!();
        output::success("All team members with keys already have access to this environment!");
        return Ok(());
    }

    println!();
    output::info(&format!(
        "{pending} team member(s) need access to this environment."
    ));
    if !yes && !confirm("Grant access to these members?", true)? {
        output::info("Sharing cancelled.");
        return Ok(());
    }

    // 2. Recover the environment key from our own envelope.
    let private_key = ctx.unlock()?;
    let dek = match protocol::environment_key(&client, &environment_id, &private_key)? {
        EnvelopeState::Found(dek) => dek,
        EnvelopeState::Missing => return Err(StashError::EnvelopeNotFound(environment_id)),
    };
    drop(private_key);

    // 3. Wrap it for everyone else and upload the batch.
    output::info("Creating envelopes for team members...");
    let report = protocol::share(&client, &environment_id, &dek, &members)?;

    println!();
    output::print_share_report(&report);
    Ok(())
}
