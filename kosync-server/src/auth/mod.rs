//! Sync protocol authentication
//!
//! KOReader authenticates every call with two headers: `x-auth-user` and
//! `x-auth-key`, the latter being the MD5 of the user's password. The server
//! keeps an Argon2id hash of that key and verifies against it on each request.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::User;
use crate::error::ApiError;
use crate::state::AppState;

pub const AUTH_USER_HEADER: &str = "x-auth-user";
pub const AUTH_KEY_HEADER: &str = "x-auth-key";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to hash key: {0}")]
    Hash(String),

    #[error("Stored key hash is malformed: {0}")]
    Malformed(String),
}

/// Hash a client key for storage (Argon2id, random salt, PHC string)
pub fn hash_key(key: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(key.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Check a client key against a stored PHC string
pub fn verify_key(key: &str, stored: &str) -> Result<bool, CredentialError> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| CredentialError::Malformed(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(key.as_bytes(), &parsed)
        .is_ok())
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Authenticated sync user extractor.
///
/// Rejects with 401 when either header is missing or empty, the user is
/// unknown, the user has no stored key, or the key does not verify.
#[derive(Debug, Clone)]
pub struct KoreaderAuth {
    pub user: User,
}

impl FromRequestParts<AppState> for KoreaderAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let username = header_value(parts, AUTH_USER_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing x-auth-user header"))?;
        let key = header_value(parts, AUTH_KEY_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing x-auth-key header"))?
            .to_string();

        let user = state
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| ApiError::unauthorized(format!("Unknown user {username}")))?;

        let stored = user
            .key_hash
            .clone()
            .ok_or_else(|| ApiError::unauthorized(format!("No sync key stored for {username}")))?;

        // Argon2 verification is CPU-bound
        let verified = tokio::task::spawn_blocking(move || verify_key(&key, &stored))
            .await
            .map_err(|e| ApiError::internal(format!("Key verification task failed: {e}")))?
            .map_err(|e| ApiError::internal(e.to_string()))?;

        if !verified {
            return Err(ApiError::unauthorized(format!(
                "Key mismatch for {username}"
            )));
        }

        tracing::debug!(owner = user.id, "Authenticated sync user");
        Ok(Self { user })
    }
}
