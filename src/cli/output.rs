//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use std::collections::BTreeMap;

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::api::Member;
use crate::envelope::protocol::ShareReport;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a bold cyan section heading.
pub fn heading(msg: &str) {
    println!();
    println!("{}", style(msg).cyan().bold());
    println!();
}

/// A present/missing status line: "check_mark Label: Present".
pub fn status_line(label: &str, present: bool, yes: &str, no: &str) {
    if present {
        println!(
            "{} {label}: {}",
            style("\u{2713}").green(),
            style(yes).green()
        );
    } else {
        println!("{} {label}: {}", style("\u{2717}").red(), style(no).red());
    }
}

/// Print who can open an environment (Name, Email, Has Key, Access).
pub fn print_members_table(members: &[Member]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Email", "Has Key", "Access Status"]);

    for m in members {
        let key = if m.has_public_key { "\u{2713}" } else { "\u{2717}" };
        let access = if m.has_envelope {
            "Has Access"
        } else {
            "Needs Access"
        };
        table.add_row(vec![
            m.name.clone(),
            m.email.clone(),
            key.to_string(),
            access.to_string(),
        ]);
    }

    println!("{table}");
}

/// Print cached environment keys with the key material truncated.
pub fn print_cached_keys_table(keys: &BTreeMap<String, String>) {
    if keys.is_empty() {
        info("No environment keys are cached.");
        tip("Pass `--remember` to `variables push` or `variables pull` to cache one.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Environment", "Key"]);

    for (environment_id, encoded) in keys {
        let preview: String = encoded.chars().take(8).collect();
        table.add_row(vec![environment_id.clone(), format!("{preview}...")]);
    }

    println!("{table}");
}

/// Summarize a share run.
pub fn print_share_report(report: &ShareReport) {
    success("Sharing complete!");
    println!("{} {}", style("Created:").yellow(), report.created);
    println!("{} {}", style("Updated:").yellow(), report.updated);

    if !report.skipped.is_empty() {
        warning(&format!(
            "Skipped {} member(s) without a public key: {}",
            report.skipped.len(),
            report.skipped.join(", ")
        ));
    }

    if !report.errors.is_empty() {
        error("Some errors occurred:");
        for e in &report.errors {
            eprintln!("  - {e}");
        }
    }
}
