//! User management commands.

use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use kosync_server::hash_key;
use tracing::info;

use crate::utils::{client_key_from_password, Context};

/// The key as the server will see it in `x-auth-key`, which is trimmed.
fn resolve_client_key(key: Option<String>, password: Option<String>) -> Result<String> {
    let client_key = match (key, password) {
        (Some(key), _) => key.trim().to_string(),
        (None, Some(password)) => client_key_from_password(&password),
        (None, None) => bail!("Either --key or --password is required"),
    };
    if client_key.is_empty() {
        bail!("Key must not be empty");
    }
    Ok(client_key)
}

/// Register a user or replace their key.
pub async fn add(
    ctx: &Context,
    username: String,
    key: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        bail!("Username must not be empty");
    }

    let client_key = resolve_client_key(key, password)?;

    let db = ctx.connect().await?;

    // Argon2 is CPU-bound
    let key_hash = tokio::task::spawn_blocking(move || hash_key(&client_key))
        .await
        .context("Key hashing task failed")?
        .context("Failed to hash key")?;

    let user = db
        .users
        .upsert(username, Some(&key_hash))
        .await
        .context("Failed to store user")?;

    info!(user_id = user.id, username = %user.username, "User registered");

    if !ctx.quiet {
        println!(
            "{} {} (id {})",
            "Registered".green().bold(),
            user.username,
            user.id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_trimmed() {
        let padded = "  5f4dcc3b5aa765d61d8327deb882cf99\n".to_string();
        let key = resolve_client_key(Some(padded), None).unwrap();
        assert_eq!(key, "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[test]
    fn test_blank_key_is_rejected() {
        assert!(resolve_client_key(Some("   ".into()), None).is_err());
        assert!(resolve_client_key(None, None).is_err());
    }

    #[test]
    fn test_password_derives_md5_key() {
        let key = resolve_client_key(None, Some("password".into())).unwrap();
        assert_eq!(key, "5f4dcc3b5aa765d61d8327deb882cf99");
    }
}
