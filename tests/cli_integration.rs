//! Integration tests for the SecretStash CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`.
//! Anything that needs a server or an interactive password is covered by
//! the library-level tests; here we check argument handling, local-only
//! commands, and error reporting.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

/// Helper: a Command for the secret-stash binary with an isolated home.
fn secret_stash(home: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("secret-stash").expect("binary should exist");
    cmd.env("SECRET_STASH_HOME", home.path())
        .env_remove("SECRET_STASH_API_TOKEN")
        .env_remove("SECRET_STASH_APPLICATION_ID")
        .env_remove("SECRET_STASH_API_URL")
        .env_remove("SECRET_STASH_PASSWORD");
    cmd
}

#[test]
fn help_flag_shows_usage() {
    let home = TempDir::new().unwrap();
    secret_stash(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("envelope encryption"))
        .stdout(predicate::str::contains("keys"))
        .stdout(predicate::str::contains("envelope"))
        .stdout(predicate::str::contains("share"))
        .stdout(predicate::str::contains("variables"));
}

#[test]
fn version_flag_shows_version() {
    let home = TempDir::new().unwrap();
    secret_stash(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("secret-stash"));
}

#[test]
fn no_args_shows_help() {
    let home = TempDir::new().unwrap();
    secret_stash(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn envelope_help_lists_recovery_commands() {
    let home = TempDir::new().unwrap();
    secret_stash(&home)
        .args(["envelope", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rewrap"))
        .stdout(predicate::str::contains("repair"))
        .stdout(predicate::str::contains("reset"));
}

#[test]
fn keys_status_without_anything_configured() {
    let home = TempDir::new().unwrap();
    secret_stash(&home)
        .args(["keys", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Local private key: Missing"))
        .stdout(predicate::str::contains("keys init"));
}

#[test]
fn keys_cached_with_empty_cache() {
    let home = TempDir::new().unwrap();
    secret_stash(&home)
        .args(["keys", "cached"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No environment keys are cached"));
}

#[test]
fn keys_cached_lists_truncated_keys() {
    let home = TempDir::new().unwrap();
    home.child("keys.json")
        .write_str(r#"{"env_1": "qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqo"}"#)
        .unwrap();

    secret_stash(&home)
        .args(["keys", "cached"])
        .assert()
        .success()
        .stdout(predicate::str::contains("env_1"))
        .stdout(predicate::str::contains("qqqqqqqq..."))
        .stdout(predicate::str::contains("qqqqqqqqqq").not());
}

#[test]
fn keys_forget_removes_entry() {
    let home = TempDir::new().unwrap();
    home.child("keys.json")
        .write_str(r#"{"env_1": "qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqo"}"#)
        .unwrap();

    secret_stash(&home)
        .args(["keys", "forget", "env_1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed cached key"));

    home.child("keys.json")
        .assert(predicate::str::contains("env_1").not());
}

#[test]
fn server_commands_require_a_token() {
    let home = TempDir::new().unwrap();
    secret_stash(&home)
        .args(["keys", "sync"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API token configured"))
        .stdout(predicate::str::contains("SECRET_STASH_API_TOKEN"));
}

#[test]
fn push_with_missing_file_fails() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    secret_stash(&home)
        .args(["variables", "push", "--file"])
        .arg(project.path().join("missing.env"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn push_with_only_ignored_variables_is_a_no_op() {
    let home = TempDir::new().unwrap();
    let env_file = home.child(".env");
    env_file
        .write_str("APP_KEY=base64:abc\nSECRET_STASH_API_TOKEN=t\n")
        .unwrap();

    secret_stash(&home)
        .args(["variables", "push", "--file"])
        .arg(env_file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No variables to push"));
}

#[test]
fn invalid_config_is_reported() {
    let home = TempDir::new().unwrap();
    home.child("config.toml").write_str("not valid {{toml").unwrap();

    secret_stash(&home)
        .args(["keys", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));
}
