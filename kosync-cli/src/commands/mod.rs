//! Subcommand implementations.

pub mod backfill;
pub mod fingerprint;
pub mod progress;
pub mod prune;
pub mod user;
