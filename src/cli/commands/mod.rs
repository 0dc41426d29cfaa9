//! One module per top-level subcommand.

pub mod envelope;
pub mod keys;
pub mod share;
pub mod variables;
