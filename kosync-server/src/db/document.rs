//! Document records
//!
//! The persisted side of the library: one row per file registered for a
//! user, carrying the fingerprints computed for it when known.

use chrono::{DateTime, Utc};
use kosync_core::Fingerprint;
use serde::Serialize;
use sqlx::FromRow;

use super::{Backend, StorageError};

/// Document entity from database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub owner: i64,
    /// Location relative to the library root
    pub path: String,
    pub name: String,
    pub size: i64,
    pub content_hash: Option<String>,
    pub name_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn content_fingerprint(&self) -> Option<Fingerprint> {
        self.content_hash.clone().map(Fingerprint::from_client)
    }

    pub fn name_fingerprint(&self) -> Option<Fingerprint> {
        self.name_hash.clone().map(Fingerprint::from_client)
    }
}

/// DTO for registering a document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner: i64,
    pub path: String,
    pub name: String,
    pub size: i64,
}

const DOCUMENT_COLUMNS: &str =
    "id, owner, path, name, size, content_hash, name_hash, created_at, updated_at";

/// Repository for document records
#[derive(Clone, Debug)]
pub struct DocumentRepository {
    backend: Backend,
}

impl DocumentRepository {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Get a document owned by `owner`
    pub async fn get(&self, owner: i64, id: i64) -> Result<Option<Document>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, Document>(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner = $1 AND id = $2"
            ))
            .bind(owner)
            .bind(id)
            .fetch_optional(pool)
            .await?),
            Backend::Memory(tables) => Ok(tables
                .documents
                .get(&id)
                .filter(|d| d.owner == owner)
                .map(|d| d.value().clone())),
        }
    }

    /// Find a document by its library path
    pub async fn find_by_path(
        &self,
        owner: i64,
        path: &str,
    ) -> Result<Option<Document>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, Document>(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner = $1 AND path = $2"
            ))
            .bind(owner)
            .bind(path)
            .fetch_optional(pool)
            .await?),
            Backend::Memory(tables) => Ok(tables
                .documents
                .iter()
                .find(|d| d.owner == owner && d.path == path)
                .map(|d| d.value().clone())),
        }
    }

    /// List every document owned by `owner`, ordered by id
    pub async fn list_for_owner(&self, owner: i64) -> Result<Vec<Document>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, Document>(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner = $1 ORDER BY id"
            ))
            .bind(owner)
            .fetch_all(pool)
            .await?),
            Backend::Memory(tables) => {
                let mut docs: Vec<Document> = tables
                    .documents
                    .iter()
                    .filter(|d| d.owner == owner)
                    .map(|d| d.value().clone())
                    .collect();
                docs.sort_by_key(|d| d.id);
                Ok(docs)
            }
        }
    }

    /// Get-or-create the record for `(owner, path)`.
    ///
    /// An existing record keeps its id and fingerprints; name and size are
    /// refreshed from `input`.
    pub async fn ensure(&self, input: &NewDocument) -> Result<Document, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, Document>(&format!(
                r#"
                INSERT INTO documents (owner, path, name, size)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (owner, path)
                DO UPDATE SET name = EXCLUDED.name, size = EXCLUDED.size, updated_at = NOW()
                RETURNING {DOCUMENT_COLUMNS}
                "#
            ))
            .bind(input.owner)
            .bind(&input.path)
            .bind(&input.name)
            .bind(input.size)
            .fetch_one(pool)
            .await?),
            Backend::Memory(tables) => {
                let existing = tables
                    .documents
                    .iter()
                    .find(|d| d.owner == input.owner && d.path == input.path)
                    .map(|d| d.id);

                let now = Utc::now();
                let doc = match existing.and_then(|id| tables.documents.get_mut(&id)) {
                    Some(mut doc) => {
                        doc.name = input.name.clone();
                        doc.size = input.size;
                        doc.updated_at = now;
                        doc.value().clone()
                    }
                    None => {
                        let doc = Document {
                            id: tables.next_document_id(),
                            owner: input.owner,
                            path: input.path.clone(),
                            name: input.name.clone(),
                            size: input.size,
                            content_hash: None,
                            name_hash: None,
                            created_at: now,
                            updated_at: now,
                        };
                        tables.documents.insert(doc.id, doc.clone());
                        doc
                    }
                };
                Ok(doc)
            }
        }
    }

    /// Page through documents that still need fingerprints.
    ///
    /// Returns up to `limit` documents with `id > after_id`, ordered by id,
    /// optionally restricted to one owner. With `force`, every document
    /// qualifies.
    pub async fn needing_fingerprints(
        &self,
        owner: Option<i64>,
        force: bool,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Document>, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(sqlx::query_as::<_, Document>(&format!(
                r#"
                SELECT {DOCUMENT_COLUMNS}
                FROM documents
                WHERE id > $1
                  AND ($2::BIGINT IS NULL OR owner = $2)
                  AND ($3 OR content_hash IS NULL OR name_hash IS NULL)
                ORDER BY id
                LIMIT $4
                "#
            ))
            .bind(after_id)
            .bind(owner)
            .bind(force)
            .bind(limit)
            .fetch_all(pool)
            .await?),
            Backend::Memory(tables) => {
                let mut docs: Vec<Document> = tables
                    .documents
                    .iter()
                    .filter(|d| d.id > after_id)
                    .filter(|d| owner.is_none_or(|o| d.owner == o))
                    .filter(|d| force || d.content_hash.is_none() || d.name_hash.is_none())
                    .map(|d| d.value().clone())
                    .collect();
                docs.sort_by_key(|d| d.id);
                docs.truncate(limit.max(0) as usize);
                Ok(docs)
            }
        }
    }

    /// Record computed fingerprints. `None` leaves the stored value untouched.
    pub async fn set_fingerprints(
        &self,
        id: i64,
        content: Option<&Fingerprint>,
        name: Option<&Fingerprint>,
    ) -> Result<bool, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => Ok(set_fingerprints_query(pool, id, content, name).await?),
            Backend::Memory(tables) => match tables.documents.get_mut(&id) {
                Some(mut doc) => {
                    if let Some(fp) = content {
                        doc.content_hash = Some(fp.to_string());
                    }
                    if let Some(fp) = name {
                        doc.name_hash = Some(fp.to_string());
                    }
                    doc.updated_at = Utc::now();
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    /// Delete a document record. Mappings pointing at it go with it.
    pub async fn delete(&self, owner: i64, id: i64) -> Result<bool, StorageError> {
        match &self.backend {
            Backend::Postgres(pool) => {
                let result = sqlx::query("DELETE FROM documents WHERE owner = $1 AND id = $2")
                    .bind(owner)
                    .bind(id)
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            }
            Backend::Memory(tables) => {
                let removed = tables
                    .documents
                    .remove_if(&id, |_, d| d.owner == owner)
                    .is_some();
                if removed {
                    tables.mappings.retain(|_, m| m.document_id != id);
                }
                Ok(removed)
            }
        }
    }
}

/// `UPDATE` for [`DocumentRepository::set_fingerprints`], usable inside a transaction.
pub(crate) async fn set_fingerprints_query<'e, E>(
    executor: E,
    id: i64,
    content: Option<&Fingerprint>,
    name: Option<&Fingerprint>,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET content_hash = COALESCE($2, content_hash),
            name_hash = COALESCE($3, name_hash),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(content.map(Fingerprint::as_str))
    .bind(name.map(Fingerprint::as_str))
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
