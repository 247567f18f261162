//! Common utility functions shared across CLI commands.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Utc};
use kosync_server::{Config, Database, User};
use md5::{Digest, Md5};
use tracing::debug;

/// Options every subcommand may need, resolved from global flags.
pub struct Context {
    pub database_url: Option<String>,
    pub library_root: Option<PathBuf>,
    pub quiet: bool,
}

impl Context {
    /// Connect to PostgreSQL. Admin commands never fall back to memory.
    pub async fn connect(&self) -> Result<Database> {
        let Some(url) = self.database_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            bail!("DATABASE_URL must be set for this command (or pass --database-url)");
        };
        debug!("Connecting to database");
        let db = Database::connect(url, 2, 1)
            .await
            .context("Failed to connect to database")?;
        Ok(db)
    }

    /// Library root from `--library-root`, else the server's default.
    pub fn library_root(&self) -> PathBuf {
        self.library_root
            .clone()
            .unwrap_or_else(|| Config::default().library_root)
    }
}

/// Look up a user by name, failing with an "Unknown user" error.
pub async fn require_user(db: &Database, username: &str) -> Result<User> {
    db.users
        .find_by_username(username)
        .await
        .context("Failed to look up user")?
        .with_context(|| format!("Unknown user: {username}"))
}

/// Derive the key KOReader sends from a plain password.
pub fn client_key_from_password(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

/// Format a timestamp as a human-readable UTC string.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
