//! CLI module: Clap argument parser, prompts, and command implementations.

pub mod commands;
pub mod env_parser;
pub mod output;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::Parser;
use zeroize::Zeroizing;

use crate::api::{EnvironmentSummary, HttpClient, StashApi};
use crate::config::Settings;
use crate::crypto::PrivateKey;
use crate::envelope::protocol::unlock_private_key;
use crate::errors::{Result, StashError};
use crate::keystore::KeyStore;

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Non-interactive password for the current private key.
pub const PASSWORD_ENV: &str = "SECRET_STASH_PASSWORD";

/// Non-interactive password for the previous private key (rewrap).
pub const OLD_PASSWORD_ENV: &str = "SECRET_STASH_OLD_PASSWORD";

/// SecretStash CLI: end-to-end encrypted environment variables.
#[derive(Parser)]
#[command(
    name = "secret-stash",
    about = "Zero-knowledge secrets manager with per-environment envelope encryption",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding keys and config (default: ~/.secret-stash)
    #[arg(long, env = "SECRET_STASH_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Application ID
    #[arg(short, long, env = "SECRET_STASH_APPLICATION_ID", global = true)]
    pub application: Option<String>,

    /// Environment ID or slug (prompts when omitted)
    #[arg(short, long, global = true)]
    pub environment: Option<String>,

    /// SecretStash server URL
    #[arg(long, env = "SECRET_STASH_API_URL", global = true)]
    pub api_url: Option<String>,

    /// API token
    #[arg(long, env = "SECRET_STASH_API_TOKEN", hide_env_values = true, global = true)]
    pub api_token: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Manage your encryption key pair
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Recover or replace an environment's envelope
    Envelope {
        #[command(subcommand)]
        action: EnvelopeAction,
    },

    /// Grant team members access to an environment
    Share {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Push or pull encrypted variables
    Variables {
        #[command(subcommand)]
        action: VariablesAction,
    },
}

/// Key pair management.
#[derive(clap::Subcommand)]
pub enum KeysAction {
    /// Show local and server key status
    Status,

    /// Generate a new key pair and upload it
    Init {
        /// Replace existing keys without asking
        #[arg(short, long)]
        force: bool,
    },

    /// Download your encrypted private key from the server
    Sync,

    /// Check that the local private key matches the server's public key
    Verify,

    /// List environment keys cached in keys.json
    Cached,

    /// Remove a cached environment key
    Forget {
        /// Environment ID
        environment_id: String,
    },
}

/// Envelope recovery.
#[derive(clap::Subcommand)]
pub enum EnvelopeAction {
    /// Re-encrypt the environment key for your current key pair
    Rewrap {
        /// Encrypted private key the envelope was created for
        #[arg(long)]
        old_key_file: Option<String>,
    },

    /// Try a rewrap, offering a reset if it fails
    Repair {
        /// Encrypted private key the envelope was created for
        #[arg(long)]
        old_key_file: Option<String>,
    },

    /// Generate a new environment key (existing variables must be re-pushed)
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Variable sync.
#[derive(clap::Subcommand)]
pub enum VariablesAction {
    /// Encrypt and upload variables from a .env file
    Push {
        /// Source file
        #[arg(short, long, default_value = ".env")]
        file: PathBuf,

        /// Cache the environment key in keys.json
        #[arg(long)]
        remember: bool,
    },

    /// Download and decrypt variables into a .env file
    Pull {
        /// Target file
        #[arg(short, long, default_value = ".env")]
        file: PathBuf,

        /// Cache the environment key in keys.json
        #[arg(long)]
        remember: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Resolved configuration for one invocation.
///
/// Flags and `SECRET_STASH_*` variables win over `config.toml`.
pub struct Context {
    pub store: KeyStore,
    pub settings: Settings,
    pub api_url: String,
    pub application_id: Option<String>,
    pub environment: Option<String>,
    api_token: Option<String>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let home = stash_home(cli.home.as_deref())?;
        let settings = Settings::load(&home)?;

        Ok(Self {
            store: KeyStore::new(home),
            api_url: cli
                .api_url
                .clone()
                .unwrap_or_else(|| settings.api_url.clone()),
            application_id: cli
                .application
                .clone()
                .or_else(|| settings.application_id.clone()),
            environment: cli.environment.clone(),
            api_token: cli.api_token.clone(),
            settings,
        })
    }

    /// An authenticated client for the configured server.
    pub fn client(&self) -> Result<HttpClient> {
        match self.api_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(HttpClient::new(&self.api_url, token)),
            _ => Err(StashError::Configuration(
                "no API token configured".into(),
            )),
        }
    }

    /// Resolve `--environment` (id or slug) to an environment id, or ask.
    pub fn environment_id(&self, api: &dyn StashApi) -> Result<String> {
        let Some(application_id) = self.application_id.as_deref() else {
            // Without an application, an explicit environment is taken as an id.
            return self.environment.clone().ok_or_else(|| {
                StashError::Configuration("no application ID configured".into())
            });
        };

        let environments = api.environments(application_id)?;
        if environments.is_empty() {
            return Err(StashError::NoEnvironmentsFound(application_id.to_string()));
        }

        match &self.environment {
            Some(wanted) => find_environment(&environments, wanted)
                .map(|env| env.id.clone())
                .ok_or_else(|| StashError::EnvironmentNotFound(wanted.clone())),
            None => select_environment(&environments),
        }
    }

    /// Load and decrypt the local private key.
    pub fn unlock(&self) -> Result<PrivateKey> {
        let wrapped = self
            .store
            .load_user_key()?
            .ok_or_else(|| StashError::PrivateKeyNotFound(self.store.user_key_path()))?;
        let password = prompt_password("Enter your private key password", PASSWORD_ENV)?;
        spin("Decrypting private key...", move || {
            unlock_private_key(&wrapped, &password)
        })?
    }
}

/// Match an environment by id, then by slug.
pub fn find_environment<'a>(
    environments: &'a [EnvironmentSummary],
    wanted: &str,
) -> Option<&'a EnvironmentSummary> {
    environments
        .iter()
        .find(|env| env.id == wanted)
        .or_else(|| environments.iter().find(|env| env.slug == wanted))
}

fn select_environment(environments: &[EnvironmentSummary]) -> Result<String> {
    let labels: Vec<String> = environments
        .iter()
        .map(|env| format!("{} ({})", env.name, env.kind))
        .collect();
    let index = dialoguer::Select::new()
        .with_prompt("Select an environment")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| StashError::CommandFailed(format!("environment prompt: {e}")))?;
    Ok(environments[index].id.clone())
}

/// The SecretStash home: `--home`, `SECRET_STASH_HOME`, or `~/.secret-stash`.
pub fn stash_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand_home(&path.to_string_lossy()));
    }
    dirs::home_dir()
        .map(|home| home.join(".secret-stash"))
        .ok_or_else(|| StashError::Configuration("cannot determine home directory".into()))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(path),
    }
}

/// Get a password, trying in order:
/// 1. the `env_var` environment variable (CI/CD)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password(prompt: &str, env_var: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(env_var) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| StashError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new private key password with confirmation.
///
/// Also respects `SECRET_STASH_PASSWORD` for scripted usage.
/// Enforces a minimum password length.
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            if pw.len() < MIN_PASSWORD_LEN {
                return Err(StashError::CommandFailed(format!(
                    "password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let first = Zeroizing::new(
            dialoguer::Password::new()
                .with_prompt("Choose a private key password")
                .interact()
                .map_err(|e| StashError::CommandFailed(format!("password prompt: {e}")))?,
        );

        if first.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        let second = Zeroizing::new(
            dialoguer::Password::new()
                .with_prompt("Confirm password")
                .interact()
                .map_err(|e| StashError::CommandFailed(format!("password prompt: {e}")))?,
        );
        if *first != *second {
            return Err(StashError::PasswordMismatch);
        }

        return Ok(first);
    }
}

/// Ask a yes/no question.
pub fn confirm(question: &str, default: bool) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(question)
        .default(default)
        .interact()
        .map_err(|e| StashError::CommandFailed(format!("confirmation prompt: {e}")))
}

/// Run `work` on a worker thread while showing a spinner on stderr.
///
/// Used for key generation and password hashing, which take long enough
/// to look like a hang.
pub fn spin<T, F>(message: &str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    const FRAMES: [char; 4] = ['|', '/', '-', '\\'];

    let handle = thread::spawn(work);
    let term = console::Term::stderr();
    let animate = term.is_term();

    let mut frame = 0;
    while !handle.is_finished() {
        if animate {
            let _ = write!(&term, "\r{} {message}", FRAMES[frame % FRAMES.len()]);
            frame += 1;
        }
        thread::sleep(Duration::from_millis(80));
    }
    if animate {
        let _ = term.clear_line();
    }

    handle
        .join()
        .map_err(|_| StashError::CommandFailed("background task panicked".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(id: &str, slug: &str) -> EnvironmentSummary {
        EnvironmentSummary {
            id: id.into(),
            name: slug.to_uppercase(),
            slug: slug.into(),
            kind: "development".into(),
        }
    }

    #[test]
    fn finds_environment_by_id_or_slug() {
        let envs = vec![env("env_1", "local"), env("env_2", "production")];
        assert_eq!(find_environment(&envs, "env_2").unwrap().slug, "production");
        assert_eq!(find_environment(&envs, "local").unwrap().id, "env_1");
        assert!(find_environment(&envs, "staging").is_none());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/key.json"), PathBuf::from("/tmp/key.json"));
        assert_eq!(expand_home("relative.json"), PathBuf::from("relative.json"));
    }

    #[test]
    fn expand_home_replaces_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/keys/old.json"), home.join("keys/old.json"));
        }
    }

    #[test]
    fn spin_returns_worker_result() {
        assert_eq!(spin("working", || 6 * 7).unwrap(), 42);
    }

    #[test]
    fn explicit_home_wins() {
        let home = stash_home(Some(Path::new("/tmp/stash"))).unwrap();
        assert_eq!(home, PathBuf::from("/tmp/stash"));
    }

    #[test]
    fn client_requires_token() {
        let ctx = Context {
            store: KeyStore::new("/tmp/unused"),
            settings: Settings::default(),
            api_url: "http://localhost:8000".into(),
            application_id: None,
            environment: None,
            api_token: None,
        };
        assert!(matches!(ctx.client(), Err(StashError::Configuration(_))));
    }
}
