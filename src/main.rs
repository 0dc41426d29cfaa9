use clap::Parser;
use secret_stash::cli::commands::{envelope, keys, share, variables};
use secret_stash::cli::{
    output, Cli, Commands, Context, EnvelopeAction, KeysAction, VariablesAction,
};
use secret_stash::errors::StashError;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = Context::from_cli(&cli).and_then(|ctx| match &cli.command {
        Commands::Keys { action } => match action {
            KeysAction::Status => keys::status(&ctx),
            KeysAction::Init { force } => keys::init(&ctx, *force),
            KeysAction::Sync => keys::sync(&ctx),
            KeysAction::Verify => keys::verify(&ctx),
            KeysAction::Cached => keys::cached(&ctx),
            KeysAction::Forget { environment_id } => keys::forget(&ctx, environment_id),
        },
        Commands::Envelope { action } => match action {
            EnvelopeAction::Rewrap { old_key_file } => {
                envelope::rewrap(&ctx, old_key_file.as_deref())
            }
            EnvelopeAction::Repair { old_key_file } => {
                envelope::repair(&ctx, old_key_file.as_deref())
            }
            EnvelopeAction::Reset { yes } => envelope::reset(&ctx, *yes),
        },
        Commands::Share { yes } => share::execute(&ctx, *yes),
        Commands::Variables { action } => match action {
            VariablesAction::Push { file, remember } => variables::push(&ctx, file, *remember),
            VariablesAction::Pull { file, remember } => variables::pull(&ctx, file, *remember),
        },
    });

    match result {
        Ok(()) => {}
        Err(StashError::UserCancelled) => {
            output::info("Operation cancelled.");
        }
        Err(e) => {
            output::error(&e.to_string());
            if let Some(tip) = e.remediation() {
                output::tip(tip);
            }
            std::process::exit(1);
        }
    }
}

/// Log to stderr, filtered by `SECRET_STASH_LOG` (default: warn).
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("SECRET_STASH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
