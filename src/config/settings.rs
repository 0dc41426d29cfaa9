use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{Argon2Params, KdfParams, KDF_ARGON2ID, KDF_PBKDF2, MIN_PBKDF2_ITERATIONS};
use crate::errors::{Result, StashError};

/// User-level configuration, loaded from `<home>/config.toml`.
///
/// Every field has a default, so SecretStash runs without any config
/// file. Command-line flags and `SECRET_STASH_*` variables take precedence
/// over values read here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the SecretStash server.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Application whose environments commands operate on.
    #[serde(default)]
    pub application_id: Option<String>,

    /// Variables never pushed to or pulled from the server.
    #[serde(default = "default_ignored_variables")]
    pub ignored_variables: Vec<String>,

    /// KDF for newly wrapped private keys: "Argon2id" or "PBKDF2".
    #[serde(default = "default_kdf")]
    pub kdf: String,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// PBKDF2 iteration count when `kdf = "PBKDF2"`.
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_ignored_variables() -> Vec<String> {
    vec!["APP_KEY".to_string()]
}

fn default_kdf() -> String {
    KDF_ARGON2ID.to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_pbkdf2_iterations() -> u32 {
    MIN_PBKDF2_ITERATIONS
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            application_id: None,
            ignored_variables: default_ignored_variables(),
            kdf: default_kdf(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

impl Settings {
    /// Name of the config file inside the SecretStash home.
    pub const FILE_NAME: &'static str = "config.toml";

    /// Load settings from `<home>/config.toml`.
    ///
    /// A missing file yields defaults; an unparsable one is an error.
    pub fn load(home: &Path) -> Result<Self> {
        let config_path = home.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            StashError::Configuration(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        tracing::debug!(path = %config_path.display(), "loaded settings");
        Ok(settings)
    }

    /// The KDF and work factor to use for new private key wraps.
    pub fn kdf_params(&self) -> Result<KdfParams> {
        let params = match self.kdf.as_str() {
            KDF_ARGON2ID => KdfParams::Argon2id(Argon2Params {
                memory_kib: self.argon2_memory_kib,
                iterations: self.argon2_iterations,
                parallelism: self.argon2_parallelism,
            }),
            KDF_PBKDF2 => KdfParams::Pbkdf2 {
                iterations: self.pbkdf2_iterations,
            },
            other => {
                return Err(StashError::Configuration(format!(
                    "unknown kdf '{other}' (expected \"{KDF_ARGON2ID}\" or \"{KDF_PBKDF2}\")"
                )))
            }
        };
        params.validate_for_wrap()?;
        Ok(params)
    }

    /// Whether `name` must never be synced.
    ///
    /// `SECRET_STASH_*` variables configure the client itself and are
    /// always ignored.
    pub fn is_ignored(&self, name: &str) -> bool {
        name.starts_with("SECRET_STASH_") || self.ignored_variables.iter().any(|v| v == name)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.api_url, "http://localhost:8000");
        assert!(s.application_id.is_none());
        assert_eq!(s.kdf, "Argon2id");
        assert_eq!(s.argon2_memory_kib, 65_536);
        assert_eq!(s.pbkdf2_iterations, 600_000);
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.api_url, "http://localhost:8000");
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
api_url = "https://stash.example.com"
application_id = "app_42"
ignored_variables = ["APP_KEY", "DB_PASSWORD"]
kdf = "PBKDF2"
pbkdf2_iterations = 700000
"#;
        fs::write(tmp.path().join("config.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.api_url, "https://stash.example.com");
        assert_eq!(settings.application_id.as_deref(), Some("app_42"));
        assert_eq!(settings.ignored_variables.len(), 2);
        assert_eq!(
            settings.kdf_params().unwrap(),
            KdfParams::Pbkdf2 { iterations: 700_000 }
        );
        // Untouched fields keep defaults.
        assert_eq!(settings.argon2_iterations, 3);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "not valid {{toml").unwrap();

        assert!(matches!(
            Settings::load(tmp.path()),
            Err(StashError::Configuration(_))
        ));
    }

    #[test]
    fn kdf_params_rejects_unknown_and_weak() {
        let unknown = Settings {
            kdf: "scrypt".into(),
            ..Settings::default()
        };
        assert!(matches!(
            unknown.kdf_params(),
            Err(StashError::Configuration(_))
        ));

        let weak = Settings {
            kdf: "PBKDF2".into(),
            pbkdf2_iterations: 1_000,
            ..Settings::default()
        };
        assert!(weak.kdf_params().is_err());
    }

    #[test]
    fn ignores_configured_and_prefixed_names() {
        let s = Settings::default();
        assert!(s.is_ignored("APP_KEY"));
        assert!(s.is_ignored("SECRET_STASH_API_TOKEN"));
        assert!(!s.is_ignored("DB_HOST"));
    }
}
