//! Document deletion cascade and stale mapping pruning

use std::sync::Arc;

use serde::Serialize;

use crate::db::{Database, DocumentRepository, HashMappingStore, StorageError, SyncProgressStore};

/// What a deletion cascade removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub mappings_removed: u64,
    pub progress_removed: u64,
    pub document_removed: bool,
}

/// What a prune removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub documents_checked: u64,
    /// Documents without both fingerprints recorded, left untouched
    pub documents_skipped: u64,
    pub mappings_removed: u64,
}

#[derive(Debug, Clone)]
pub struct DocumentCleanup {
    documents: Arc<DocumentRepository>,
    mappings: Arc<HashMappingStore>,
    progress: Arc<SyncProgressStore>,
}

impl DocumentCleanup {
    pub fn new(db: &Database) -> Self {
        Self {
            documents: db.documents.clone(),
            mappings: db.mappings.clone(),
            progress: db.progress.clone(),
        }
    }

    /// Delete hook: drop the progress and mappings of a document, then its record.
    ///
    /// Progress is only removed for fingerprints that were mapped to the
    /// document; rows for fingerprints that never resolved stay behind.
    pub async fn on_document_deleted(
        &self,
        owner: i64,
        document_id: i64,
    ) -> Result<DeletionReport, StorageError> {
        let fingerprints = self.mappings.all_fingerprints_for(owner, document_id).await?;
        let progress_removed = self
            .progress
            .delete_for_fingerprints(owner, &fingerprints)
            .await?;
        let mappings_removed = self.mappings.delete_all_for(owner, document_id).await?;
        let document_removed = self.documents.delete(owner, document_id).await?;

        tracing::info!(
            owner,
            document_id,
            mappings_removed,
            progress_removed,
            document_removed,
            "Cleaned up deleted document"
        );

        Ok(DeletionReport {
            mappings_removed,
            progress_removed,
            document_removed,
        })
    }

    /// Remove mappings that no longer match their document's current fingerprints.
    ///
    /// Only documents with both fingerprints recorded are pruned; anything
    /// else has no reliable notion of "current". Progress rows are kept.
    pub async fn prune_stale_mappings(&self, owner: i64) -> Result<PruneReport, StorageError> {
        let mut report = PruneReport::default();

        for doc in self.documents.list_for_owner(owner).await? {
            let (Some(content), Some(name)) = (doc.content_fingerprint(), doc.name_fingerprint())
            else {
                report.documents_skipped += 1;
                continue;
            };
            report.documents_checked += 1;

            for mapping in self.mappings.mappings_for(owner, doc.id).await? {
                if mapping.fingerprint == content || mapping.fingerprint == name {
                    continue;
                }
                if self.mappings.delete(owner, &mapping.fingerprint).await? {
                    report.mappings_removed += 1;
                    tracing::debug!(
                        owner,
                        document_id = doc.id,
                        fingerprint = %mapping.fingerprint,
                        "Pruned stale mapping"
                    );
                }
            }
        }

        tracing::info!(
            owner,
            checked = report.documents_checked,
            skipped = report.documents_skipped,
            removed = report.mappings_removed,
            "Pruned stale mappings"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewDocument, ProgressUpdate};
    use kosync_core::{Fingerprint, FingerprintKind};

    fn fp(c: char) -> Fingerprint {
        Fingerprint::from_client(c.to_string().repeat(32))
    }

    async fn document(db: &Database, owner: i64, path: &str) -> i64 {
        db.documents
            .ensure(&NewDocument {
                owner,
                path: path.to_string(),
                name: path.to_string(),
                size: 1,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_deletion_cascades_to_mappings_and_progress() {
        let db = Database::in_memory();
        let cleanup = DocumentCleanup::new(&db);
        let doc = document(&db, 1, "alice/a.epub").await;
        let other = document(&db, 1, "alice/b.epub").await;

        db.mappings.upsert(1, &fp('a'), FingerprintKind::Content, doc).await.unwrap();
        db.mappings.upsert(1, &fp('b'), FingerprintKind::Name, doc).await.unwrap();
        db.mappings.upsert(1, &fp('c'), FingerprintKind::Content, other).await.unwrap();
        for f in ['a', 'c', 'z'] {
            db.progress.upsert(1, &fp(f), ProgressUpdate::default()).await.unwrap();
        }

        let report = cleanup.on_document_deleted(1, doc).await.unwrap();

        assert_eq!(
            report,
            DeletionReport {
                mappings_removed: 2,
                progress_removed: 1,
                document_removed: true,
            }
        );
        assert!(db.documents.get(1, doc).await.unwrap().is_none());
        assert!(db.progress.get(1, &fp('a')).await.unwrap().is_none());
        assert!(db.progress.get(1, &fp('c')).await.unwrap().is_some());
        assert!(db.progress.get(1, &fp('z')).await.unwrap().is_some());
        assert_eq!(db.mappings.lookup_document(1, &fp('c')).await.unwrap(), Some(other));
    }

    #[tokio::test]
    async fn test_prune_keeps_current_fingerprints_only() {
        let db = Database::in_memory();
        let cleanup = DocumentCleanup::new(&db);
        let doc = document(&db, 1, "alice/a.epub").await;
        db.documents
            .set_fingerprints(doc, Some(&fp('a')), Some(&fp('b')))
            .await
            .unwrap();

        db.mappings.upsert(1, &fp('a'), FingerprintKind::Content, doc).await.unwrap();
        db.mappings.upsert(1, &fp('b'), FingerprintKind::Name, doc).await.unwrap();
        db.mappings.upsert(1, &fp('o'), FingerprintKind::Content, doc).await.unwrap();
        db.progress.upsert(1, &fp('o'), ProgressUpdate::default()).await.unwrap();

        let report = cleanup.prune_stale_mappings(1).await.unwrap();

        assert_eq!(report.mappings_removed, 1);
        assert_eq!(report.documents_checked, 1);
        assert_eq!(
            db.mappings.all_fingerprints_for(1, doc).await.unwrap(),
            [fp('a'), fp('b')].into_iter().collect()
        );
        assert!(db.progress.get(1, &fp('o')).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prune_skips_documents_without_fingerprints() {
        let db = Database::in_memory();
        let cleanup = DocumentCleanup::new(&db);
        let doc = document(&db, 1, "alice/a.epub").await;
        db.mappings.upsert(1, &fp('a'), FingerprintKind::Content, doc).await.unwrap();

        let report = cleanup.prune_stale_mappings(1).await.unwrap();

        assert_eq!(report.documents_skipped, 1);
        assert_eq!(report.mappings_removed, 0);
        assert_eq!(db.mappings.count(1).await.unwrap(), 1);
    }
}
