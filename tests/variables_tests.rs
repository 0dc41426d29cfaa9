//! Variable push/pull against an in-memory server, plus `.env` merging.

mod support;

use std::collections::BTreeMap;
use std::fs;

use secret_stash::cli::commands::variables::{
    forget_stale_cached_key, pull_variables, push_variables,
};
use secret_stash::cli::env_parser::{merge_env, parse_env_file, write_merged_env};
use secret_stash::config::Settings;
use secret_stash::crypto::DataKey;
use secret_stash::keystore::KeyStore;

use support::FakeApi;

const ENV: &str = "env_123";

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn pulled_values_merge_into_existing_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join(".env");
    fs::write(&path, "BAZ=qux\n").unwrap();

    let values = BTreeMap::from([
        ("FOO".to_string(), "bar".to_string()),
        ("EMPTY".to_string(), String::new()),
        ("SPACED".to_string(), "has space".to_string()),
    ]);
    write_merged_env(&path, &values).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines.contains(&"BAZ=qux"));
    assert!(lines.contains(&"FOO=bar"));
    assert!(lines.contains(&r#"EMPTY="""#));
    assert!(lines.contains(&r#"SPACED="has space""#));

    let keys: Vec<String> = parse_env_file(&path)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys.len(), 4, "no duplicate keys: {content}");

    // Writing the same values again changes nothing.
    write_merged_env(&path, &values).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), content);
}

#[test]
fn merge_into_empty_file_sorts_keys() {
    let values = BTreeMap::from([
        ("B".to_string(), "2".to_string()),
        ("A".to_string(), "1".to_string()),
    ]);
    assert_eq!(merge_env("", &values), "A=1\nB=2\n");
}

#[test]
fn push_then_pull_roundtrips_values() {
    let api = FakeApi::new();
    let dek = DataKey::generate();
    let input = vars(&[("DB_HOST", "localhost"), ("DB_PASS", "s3cr3t with space")]);

    let report = push_variables(&api, ENV, &dek, &input);
    assert_eq!(report.created, 2);
    assert!(report.failed.is_empty());

    // The server only ever saw ciphertext.
    for stored in &api.variables.lock().unwrap()[ENV] {
        assert!(!String::from_utf8_lossy(&stored.payload.ciphertext).contains("localhost"));
    }

    let pulled = pull_variables(&api, ENV, &dek, |_| false).unwrap();
    assert_eq!(pulled.values["DB_HOST"], "localhost");
    assert_eq!(pulled.values["DB_PASS"], "s3cr3t with space");
}

#[test]
fn push_counts_failures_and_continues() {
    let api = FakeApi::new();
    *api.fail_variable.lock().unwrap() = Some("BROKEN".to_string());
    let dek = DataKey::generate();

    let report = push_variables(&api, ENV, &dek, &vars(&[("A", "1"), ("BROKEN", "2"), ("C", "3")]));
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, vec!["BROKEN".to_string()]);
}

#[test]
fn pull_reports_undecryptable_values() {
    let api = FakeApi::new();
    push_variables(&api, ENV, &DataKey::generate(), &vars(&[("OLD", "x")]));
    push_variables(&api, ENV, &DataKey::new([9; 32]), &vars(&[("NEW", "y")]));

    let pulled = pull_variables(&api, ENV, &DataKey::new([9; 32]), |_| false).unwrap();
    assert_eq!(pulled.values.len(), 1);
    assert_eq!(pulled.failed, vec!["OLD".to_string()]);
}

#[test]
fn cached_key_that_cannot_decrypt_is_forgotten() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = KeyStore::new(tmp.path());

    // Another machine reset the environment; this one still caches the old key.
    let orphaned = DataKey::new([1; 32]);
    store.set_environment_key(ENV, &orphaned).unwrap();
    let api = FakeApi::new();
    push_variables(&api, ENV, &DataKey::new([2; 32]), &vars(&[("FRESH", "v")]));

    let pulled = pull_variables(&api, ENV, &orphaned, |_| false).unwrap();
    assert!(forget_stale_cached_key(&store, ENV, &pulled).unwrap());
    assert_eq!(store.environment_key(ENV).unwrap(), None);
}

#[test]
fn cached_key_survives_a_clean_pull() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = KeyStore::new(tmp.path());
    let dek = DataKey::new([3; 32]);
    store.set_environment_key(ENV, &dek).unwrap();

    let api = FakeApi::new();
    push_variables(&api, ENV, &dek, &vars(&[("A", "1")]));

    let pulled = pull_variables(&api, ENV, &dek, |_| false).unwrap();
    assert!(!forget_stale_cached_key(&store, ENV, &pulled).unwrap());
    assert_eq!(store.environment_key(ENV).unwrap(), Some(dek));
}

#[test]
fn ignored_variables_are_not_pulled() {
    let api = FakeApi::new();
    let dek = DataKey::generate();
    push_variables(
        &api,
        ENV,
        &dek,
        &vars(&[("APP_KEY", "base64:abc"), ("SECRET_STASH_API_TOKEN", "t"), ("KEEP", "1")]),
    );

    let settings = Settings::default();
    let pulled = pull_variables(&api, ENV, &dek, |name| settings.is_ignored(name)).unwrap();
    assert_eq!(pulled.values.keys().collect::<Vec<_>>(), vec!["KEEP"]);
}
