//! `.env` file parsing, formatting, and merging.
//!
//! `parse_env_file` feeds `variables push`; `merge_env` writes pulled
//! values back into an existing file without disturbing unrelated lines.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{Result, StashError};

/// Parse a single `.env` line into a (key, value) pair.
///
/// Returns `None` for blank lines, comments, and lines without `=`.
/// Handles: `export` prefix, double/single quotes, values with `=`, and
/// `\\` / `\"` escapes inside double quotes.
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();

    // Skip empty lines and comments.
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    // Strip optional `export ` prefix.
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);

    // Split on the first '=' to get KEY and VALUE.
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    if key.is_empty() {
        return None;
    }

    let value = if let Some(inner) = strip_quotes(value, '"') {
        unescape(inner)
    } else if let Some(inner) = strip_quotes(value, '\'') {
        inner.to_string()
    } else {
        value.to_string()
    };

    Some((key.to_string(), value))
}

fn strip_quotes(value: &str, quote: char) -> Option<&str> {
    if value.len() < 2 {
        return None;
    }
    value.strip_prefix(quote)?.strip_suffix(quote)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '"')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a `.env` file into (key, value) pairs in file order.
///
/// A key that appears twice keeps its last value.
pub fn parse_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        return Err(StashError::EnvFileNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)
        .map_err(|e| StashError::CommandFailed(format!("failed to read file: {e}")))?;

    let mut vars: Vec<(String, String)> = Vec::new();
    for (key, value) in content.lines().filter_map(parse_env_line) {
        match vars.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => vars.push((key, value)),
        }
    }

    Ok(vars)
}

/// Render `KEY=value`, quoting the value when a `.env` reader would
/// otherwise misread it.
pub fn format_env_assignment(key: &str, value: &str) -> String {
    // Values that arrive already quoted are unwrapped first.
    let value = match strip_quotes(value, '"') {
        Some(inner) => unescape(inner),
        None => value.to_string(),
    };

    if needs_quotes(&value) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{key}=\"{escaped}\"")
    } else {
        format!("{key}={value}")
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.chars().any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '=' | '\\'))
        || value.contains("${")
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:export\s+)?([-A-Za-z0-9_.]+)\s*=").expect("key pattern is valid")
    })
}

/// Merge `vars` into existing `.env` content.
///
/// Existing keys (matched case-insensitively, first occurrence only) are
/// replaced in place; new keys are appended in sorted order; every other
/// line is kept verbatim. Merging the same values twice is a no-op.
pub fn merge_env(existing: &str, vars: &BTreeMap<String, String>) -> String {
    let by_upper: BTreeMap<String, (&String, &String)> = vars
        .iter()
        .map(|(k, v)| (k.to_uppercase(), (k, v)))
        .collect();
    let mut written: HashSet<String> = HashSet::new();

    let mut lines: Vec<String> = Vec::new();
    for line in existing.lines() {
        let replacement = key_pattern()
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_uppercase())
            .filter(|upper| !written.contains(upper))
            .and_then(|upper| by_upper.get(&upper).map(|entry| (upper, *entry)));

        match replacement {
            Some((upper, (key, value))) => {
                lines.push(format_env_assignment(key, value));
                written.insert(upper);
            }
            None => lines.push(line.to_string()),
        }
    }

    for (upper, (key, value)) in &by_upper {
        if !written.contains(upper) {
            lines.push(format_env_assignment(key, value));
        }
    }

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Merge `vars` into the file at `path` (created if missing) atomically.
pub fn write_merged_env(path: &Path, vars: &BTreeMap<String, String>) -> Result<()> {
    let existing = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };
    let merged = merge_env(&existing, vars);

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, merged)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
