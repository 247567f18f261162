//! Reading progress keyed by fingerprint
//!
//! Progress is addressed by whatever fingerprint the client presented and has
//! no reference to a document, so rows may exist for fingerprints that never
//! resolve. Writes are upserts: the latest write for `(owner, fingerprint)`
//! wins.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use kosync_core::Fingerprint;
use serde::Serialize;
use sqlx::FromRow;

use super::{Backend, StorageError};

/// Stored reading position for one fingerprint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub owner: i64,
    pub fingerprint: Fingerprint,
    pub progress: Option<String>,
    /// Fraction in `[0, 1]`, stored exactly as the client sent it
    pub percentage: Option<f64>,
    pub device: Option<String>,
    pub device_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Percentage on the external `[0, 100]` scale
    pub fn percent(&self) -> Option<f64> {
        self.percentage.map(|p| p * 100.0)
    }
}

/// Fields a client writes on update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub progress: Option<String>,
    pub percentage: Option<f64>,
    pub device: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct ProgressRow {
    owner: i64,
    document_hash: String,
    progress: Option<String>,
    percentage: Option<f64>,
    device: Option<String>,
    device_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<ProgressRow> for ProgressRecord {
    fn from(row: ProgressRow) -> Self {
        Self {
            owner: row.owner,
            fingerprint: Fingerprint::from_client(row.document_hash),
            progress: row.progress,
            percentage: row.percentage,
            device: row.device,
            device_id: row.device_id,
            updated_at: row.updated_at,
        }
    }
}

/// Store for progress rows
#[derive(Clone, Debug)]
pub struct SyncProgressStore {
    backend: Backend,
}

impl SyncProgressStore {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Insert or overwrite the progress for `(owner, fingerprint)`.
    ///
    /// `updated_at` is set to now on both paths; the stored record is returned.
    pub async fn upsert(
        &self,
        owner: i64,
        fingerprint: &Fingerprint,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord, StorageError> {
        let now = Utc::now();

        let record = match &self.backend {
            Backend::Postgres(pool) => sqlx::query_as::<_, ProgressRow>(
                r#"
                INSERT INTO sync_progress
                    (owner, document_hash, progress, percentage, device, device_id, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (owner, document_hash)
                DO UPDATE SET progress = EXCLUDED.progress,
                              percentage = EXCLUDED.percentage,
                              device = EXCLUDED.device,
                              device_id = EXCLUDED.device_id,
                              updated_at = EXCLUDED.updated_at
                RETURNING owner, document_hash, progress, percentage, device, device_id, updated_at
                "#,
            )
            .bind(owner)
            .bind(fingerprint.as_str())
            .bind(&update.progress)
            .bind(update.percentage)
            .bind(&update.device)
            .bind(&update.device_id)
            .bind(now)
            .fetch_one(pool)
            .await?
            .into(),
            Backend::Memory(tables) => {
                let record = ProgressRecord {
                    owner,
                    fingerprint: fingerprint.clone(),
                    progress: update.progress,
                    percentage: update.percentage,
                    device: update.device,
                    device_id: update.device_id,
                    updated_at: now,
                };
                tables
                    .progress
                    .insert((owner, fingerprint.to_string()), record.clone());
                record
            }
        };

        tracing::debug!(owner, fingerprint = %fingerprint, "Stored progress");
        Ok(record)
    }

    pub async fn get(
        &self,
        owner: i64,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, ProgressRow>(
                r#"
                SELECT owner, document_hash, progress, percentage, device, device_id, updated_at
                FROM sync_progress
                WHERE owner = $1 AND document_hash = $2
                "#,
            )
            .bind(owner)
            .bind(fingerprint.as_str())
            .fetch_optional(pool)
            .await?
            .map(ProgressRecord::from)),
            Backend::Memory(tables) => Ok(tables
                .progress
                .get(&(owner, fingerprint.to_string()))
                .map(|r| r.value().clone())),
        }
    }

    /// The most recently updated row among `fingerprints`
    pub async fn most_recent_among(
        &self,
        owner: i64,
        fingerprints: &BTreeSet<Fingerprint>,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        if fingerprints.is_empty() {
            return Ok(None);
        }

        match &self.backend {
            Backend::Postgres(pool) => {
                let hashes: Vec<String> = fingerprints.iter().map(|f| f.to_string()).collect();
                Ok(sqlx::query_as::<_, ProgressRow>(
                    r#"
                    SELECT owner, document_hash, progress, percentage, device, device_id, updated_at
                    FROM sync_progress
                    WHERE owner = $1 AND document_hash = ANY($2)
                    ORDER BY updated_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(owner)
                .bind(hashes)
                .fetch_optional(pool)
                .await?
                .map(ProgressRecord::from))
            }
            Backend::Memory(tables) => Ok(fingerprints
                .iter()
                .filter_map(|f| tables.progress.get(&(owner, f.to_string())))
                .map(|r| r.value().clone())
                .max_by_key(|r| r.updated_at)),
        }
    }

    /// Remove progress rows for `fingerprints`. Returns rows removed.
    pub async fn delete_for_fingerprints(
        &self,
        owner: i64,
        fingerprints: &BTreeSet<Fingerprint>,
    ) -> Result<u64, StorageError> {
        if fingerprints.is_empty() {
            return Ok(0);
        }

        match &self.backend {
            Backend::Postgres(pool) => {
                let hashes: Vec<String> = fingerprints.iter().map(|f| f.to_string()).collect();
                let result = sqlx::query(
                    "DELETE FROM sync_progress WHERE owner = $1 AND document_hash = ANY($2)",
                )
                .bind(owner)
                .bind(hashes)
                .execute(pool)
                .await?;
                Ok(result.rows_affected())
            }
            Backend::Memory(tables) => Ok(fingerprints
                .iter()
                .filter(|f| tables.progress.remove(&(owner, f.to_string())).is_some())
                .count() as u64),
        }
    }
}
