//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and cron jobs to handle errors appropriately.

use kosync_server::{BackfillError, StorageError};

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error.
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (a backfill batch was rolled back).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Named user does not exist.
/// Maps to EX_NOUSER from sysexits.h.
pub const NO_USER: i32 = 67;

/// Database unreachable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const UNAVAILABLE: i32 = 69;

/// Missing or invalid configuration.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Typed errors first, then classify by message
        let typed = err.chain().find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<BackfillError>() {
                return Some(match e {
                    BackfillError::UnknownOwner(_) => NO_USER,
                    BackfillError::Storage(_) => UNAVAILABLE,
                    BackfillError::BatchFailed { .. } => DATA_ERROR,
                });
            }
            match cause.downcast_ref::<StorageError>() {
                Some(StorageError::Connection(_) | StorageError::Migration(_)) => Some(UNAVAILABLE),
                _ => None,
            }
        });

        let code = typed.unwrap_or_else(|| {
            if message.contains("Failed to read file") {
                INPUT_ERROR
            } else if message.contains("Unknown user") {
                NO_USER
            } else if message.contains("DATABASE_URL") {
                CONFIG_ERROR
            } else {
                GENERAL_ERROR
            }
        });

        Self {
            code,
            message: Some(message),
        }
    }
}
