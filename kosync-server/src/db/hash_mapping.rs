//! Fingerprint to document mappings
//!
//! A document owns several fingerprints over its lifetime (current content,
//! current name, and whatever it used to hash to before an edit or rename).
//! Each `(owner, fingerprint)` pair maps to at most one document; writing a
//! pair again replaces the previous mapping, whatever its kind.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use kosync_core::{Fingerprint, FingerprintKind};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use super::{Backend, StorageError};

/// A persisted `(owner, fingerprint) -> document` association
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HashMapping {
    pub owner: i64,
    pub fingerprint: Fingerprint,
    pub kind: FingerprintKind,
    pub document_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Row as stored in `hash_mapping`
#[derive(Debug, FromRow)]
struct HashMappingRow {
    owner: i64,
    document_hash: String,
    hash_type: String,
    metadata_id: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<HashMappingRow> for HashMapping {
    type Error = StorageError;

    fn try_from(row: HashMappingRow) -> Result<Self, Self::Error> {
        let kind = row
            .hash_type
            .parse::<FingerprintKind>()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Self {
            owner: row.owner,
            fingerprint: Fingerprint::from_client(row.document_hash),
            kind,
            document_id: row.metadata_id,
            created_at: row.created_at,
        })
    }
}

/// Store for fingerprint mappings
#[derive(Clone, Debug)]
pub struct HashMappingStore {
    backend: Backend,
}

impl HashMappingStore {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Replace whatever mapping exists for `(owner, fingerprint)`.
    ///
    /// Idempotent: repeating the call leaves exactly one row.
    pub async fn upsert(
        &self,
        owner: i64,
        fingerprint: &Fingerprint,
        kind: FingerprintKind,
        document_id: i64,
    ) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                upsert_query(&mut tx, owner, fingerprint, kind, document_id).await?;
                tx.commit().await?;
            }
            Backend::Memory(tables) => {
                tables.mappings.insert(
                    (owner, fingerprint.to_string()),
                    HashMapping {
                        owner,
                        fingerprint: fingerprint.clone(),
                        kind,
                        document_id,
                        created_at: Utc::now(),
                    },
                );
            }
        }

        tracing::debug!(
            owner,
            fingerprint = %fingerprint,
            kind = %kind,
            document_id,
            "Stored fingerprint mapping"
        );
        Ok(())
    }

    /// Document a fingerprint currently maps to
    pub async fn lookup_document(
        &self,
        owner: i64,
        fingerprint: &Fingerprint,
    ) -> Result<Option<i64>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_scalar::<_, i64>(
                "SELECT metadata_id FROM hash_mapping WHERE owner = $1 AND document_hash = $2",
            )
            .bind(owner)
            .bind(fingerprint.as_str())
            .fetch_optional(pool)
            .await?),
            Backend::Memory(tables) => Ok(tables
                .mappings
                .get(&(owner, fingerprint.to_string()))
                .map(|m| m.document_id)),
        }
    }

    /// Every fingerprint mapped to `document_id`
    pub async fn all_fingerprints_for(
        &self,
        owner: i64,
        document_id: i64,
    ) -> Result<BTreeSet<Fingerprint>, StorageError> {
        Ok(self
            .mappings_for(owner, document_id)
            .await?
            .into_iter()
            .map(|m| m.fingerprint)
            .collect())
    }

    /// Every mapping pointing at `document_id`, oldest first
    pub async fn mappings_for(
        &self,
        owner: i64,
        document_id: i64,
    ) -> Result<Vec<HashMapping>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => sqlx::query_as::<_, HashMappingRow>(
                r#"
                SELECT owner, document_hash, hash_type, metadata_id, created_at
                FROM hash_mapping
                WHERE owner = $1 AND metadata_id = $2
                ORDER BY created_at, document_hash
                "#,
            )
            .bind(owner)
            .bind(document_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(HashMapping::try_from)
            .collect(),
            Backend::Memory(tables) => {
                let mut mappings: Vec<HashMapping> = tables
                    .mappings
                    .iter()
                    .filter(|m| m.owner == owner && m.document_id == document_id)
                    .map(|m| m.value().clone())
                    .collect();
                mappings.sort_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
                });
                Ok(mappings)
            }
        }
    }

    /// Remove every mapping pointing at `document_id`. Returns rows removed.
    pub async fn delete_all_for(&self, owner: i64, document_id: i64) -> Result<u64, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => {
                let result =
                    sqlx::query("DELETE FROM hash_mapping WHERE owner = $1 AND metadata_id = $2")
                        .bind(owner)
                        .bind(document_id)
                        .execute(pool)
                        .await?;
                Ok(result.rows_affected())
            }
            Backend::Memory(tables) => {
                let mut removed = 0;
                tables.mappings.retain(|_, m| {
                    let hit = m.owner == owner && m.document_id == document_id;
                    removed += u64::from(hit);
                    !hit
                });
                Ok(removed)
            }
        }
    }

    /// Remove a single mapping
    pub async fn delete(&self, owner: i64, fingerprint: &Fingerprint) -> Result<bool, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => {
                let result =
                    sqlx::query("DELETE FROM hash_mapping WHERE owner = $1 AND document_hash = $2")
                        .bind(owner)
                        .bind(fingerprint.as_str())
                        .execute(pool)
                        .await?;
                Ok(result.rows_affected() > 0)
            }
            Backend::Memory(tables) => Ok(tables
                .mappings
                .remove(&(owner, fingerprint.to_string()))
                .is_some()),
        }
    }

    /// Number of mappings held for `owner`
    pub async fn count(&self, owner: i64) -> Result<u64, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM hash_mapping WHERE owner = $1")
                        .bind(owner)
                        .fetch_one(pool)
                        .await?;
                Ok(count as u64)
            }
            Backend::Memory(tables) => {
                Ok(tables.mappings.iter().filter(|m| m.owner == owner).count() as u64)
            }
        }
    }
}

/// Delete-then-insert for one mapping on an open connection.
///
/// Callers run this inside a transaction. The insert still carries an
/// `ON CONFLICT` clause so two racing transactions converge on the last
/// writer instead of failing on the primary key.
pub(crate) async fn upsert_query(
    conn: &mut PgConnection,
    owner: i64,
    fingerprint: &Fingerprint,
    kind: FingerprintKind,
    document_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM hash_mapping WHERE owner = $1 AND document_hash = $2")
        .bind(owner)
        .bind(fingerprint.as_str())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO hash_mapping (owner, document_hash, hash_type, metadata_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (owner, document_hash)
        DO UPDATE SET hash_type = EXCLUDED.hash_type,
                      metadata_id = EXCLUDED.metadata_id,
                      created_at = NOW()
        "#,
    )
    .bind(owner)
    .bind(fingerprint.as_str())
    .bind(kind.as_str())
    .bind(document_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
