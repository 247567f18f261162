//! Persistence for the sync server
//!
//! Every store runs against one of two backends:
//! - **PostgreSQL** (production): tables created by the migrations in `./migrations`.
//! - **Memory** (development and tests): `DashMap` tables that emulate the same
//!   uniqueness and cascade rules. Data is lost on restart.
//!
//! If `DATABASE_URL` is not set, the server falls back to the memory backend.

pub mod document;
pub mod hash_mapping;
pub mod memory;
pub mod sync_progress;
pub mod user;

pub use document::{Document, DocumentRepository, NewDocument};
pub use hash_mapping::{HashMapping, HashMappingStore};
pub use memory::MemoryTables;
pub use sync_progress::{ProgressRecord, ProgressUpdate, SyncProgressStore};
pub use user::{User, UserRepository};

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(e.to_string())
    }
}

/// Storage backend shared by all stores of one [`Database`]
#[derive(Clone)]
pub enum Backend {
    /// PostgreSQL storage (production)
    Postgres(PgPool),
    /// In-memory storage (development fallback, tests)
    Memory(Arc<MemoryTables>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres(_) => f.write_str("Postgres(<PgPool>)"),
            Self::Memory(tables) => f.debug_tuple("Memory").field(tables).finish(),
        }
    }
}

/// All stores, wired to a single backend.
#[derive(Clone, Debug)]
pub struct Database {
    backend: Backend,
    pub users: Arc<UserRepository>,
    pub documents: Arc<DocumentRepository>,
    pub mappings: Arc<HashMappingStore>,
    pub progress: Arc<SyncProgressStore>,
}

impl Database {
    /// Build every store on top of `backend`.
    pub fn from_backend(backend: Backend) -> Self {
        Self {
            users: Arc::new(UserRepository::new(backend.clone())),
            documents: Arc::new(DocumentRepository::new(backend.clone())),
            mappings: Arc::new(HashMappingStore::new(backend.clone())),
            progress: Arc::new(SyncProgressStore::new(backend.clone())),
            backend,
        }
    }

    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to PostgreSQL and applied migrations");
        Ok(Self::from_backend(Backend::Postgres(pool)))
    }

    /// In-memory database (development and tests)
    pub fn in_memory() -> Self {
        Self::from_backend(Backend::Memory(Arc::new(MemoryTables::default())))
    }

    /// Connect using `config.database_url`, falling back to memory when unset.
    pub async fn from_config(config: &Config) -> Result<Self, StorageError> {
        match config.database_url.as_deref() {
            Some(url) if !url.is_empty() => {
                Self::connect(
                    url,
                    config.database_max_connections,
                    config.database_min_connections,
                )
                .await
            }
            _ => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage - sync data will be lost on restart!");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Check if using persistent storage
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Postgres(_))
    }

    /// Check database health (always Ok for memory backend)
    pub async fn check_health(&self) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(|e| StorageError::Connection(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory();
        assert!(!db.is_persistent());
    }

    #[tokio::test]
    async fn test_memory_backend_is_always_healthy() {
        let db = Database::in_memory();
        assert!(db.check_health().await.is_ok());
    }

    #[tokio::test]
    async fn test_from_config_without_url_falls_back_to_memory() {
        let config = Config::default();
        let db = Database::from_config(&config).await.unwrap();
        assert!(!db.is_persistent());
    }
}
