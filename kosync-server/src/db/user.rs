//! Sync user entity and repository
//!
//! A user owns documents, mappings, and progress rows. The stored credential
//! is a salted hash of the key the client sends in `x-auth-key`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{Backend, StorageError};

/// User entity from database
#[derive(Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub key_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("key_hash", &self.key_hash.as_ref().map(|_| "[REDACTED]"))
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Repository for user database operations
#[derive(Clone, Debug)]
pub struct UserRepository {
    backend: Backend,
}

impl UserRepository {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Find user by username
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, key_hash, created_at
                FROM users
                WHERE username = $1
                "#,
            )
            .bind(username)
            .fetch_optional(pool)
            .await?),
            Backend::Memory(tables) => Ok(tables.users.get(username).map(|u| u.value().clone())),
        }
    }

    /// Find user by internal ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, key_hash, created_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await?),
            Backend::Memory(tables) => Ok(tables
                .users
                .iter()
                .find(|u| u.id == id)
                .map(|u| u.value().clone())),
        }
    }

    /// Create a user, or replace the stored credential of an existing one
    pub async fn upsert(
        &self,
        username: &str,
        key_hash: Option<&str>,
    ) -> Result<User, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (username, key_hash)
                VALUES ($1, $2)
                ON CONFLICT (username)
                DO UPDATE SET key_hash = EXCLUDED.key_hash
                RETURNING id, username, key_hash, created_at
                "#,
            )
            .bind(username)
            .bind(key_hash)
            .fetch_one(pool)
            .await?),
            Backend::Memory(tables) => {
                let mut entry = tables
                    .users
                    .entry(username.to_string())
                    .or_insert_with(|| User {
                        id: tables.next_user_id(),
                        username: username.to_string(),
                        key_hash: None,
                        created_at: Utc::now(),
                    });
                entry.key_hash = key_hash.map(str::to_string);
                Ok(entry.value().clone())
            }
        }
    }

    /// List all users, ordered by id
    pub async fn list(&self) -> Result<Vec<User>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, User>(
                "SELECT id, username, key_hash, created_at FROM users ORDER BY id",
            )
            .fetch_all(pool)
            .await?),
            Backend::Memory(tables) => {
                let mut users: Vec<User> = tables.users.iter().map(|u| u.value().clone()).collect();
                users.sort_by_key(|u| u.id);
                Ok(users)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_upsert_creates_then_replaces_credential() {
        let db = Database::in_memory();

        let created = db.users.upsert("alice", Some("hash-1")).await.unwrap();
        let updated = db.users.upsert("alice", Some("hash-2")).await.unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.key_hash.as_deref(), Some("hash-2"));
        assert_eq!(db.users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_username_and_id() {
        let db = Database::in_memory();
        let bob = db.users.upsert("bob", None).await.unwrap();

        let by_name = db.users.find_by_username("bob").await.unwrap().unwrap();
        let by_id = db.users.find_by_id(bob.id).await.unwrap().unwrap();
        assert_eq!(by_name.id, by_id.id);
        assert!(by_name.key_hash.is_none());
        assert!(db.users.find_by_username("nobody").await.unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_key_hash() {
        let user = super::User {
            id: 1,
            username: "alice".to_string(),
            key_hash: Some("$argon2id$secret".to_string()),
            created_at: chrono::Utc::now(),
        };
        let rendered = format!("{:?}", user);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
