//! Batch fingerprint backfill
//!
//! Brings a catalog that predates fingerprinting up to date: every document
//! missing a fingerprint gets it computed, stored on its record, and mapped.
//! Documents are processed in id order, one transaction per batch. The first
//! unexpected failure rolls back its batch and stops the run.

use std::io::SeekFrom;
use std::sync::Arc;

use kosync_core::{
    compute_content_fingerprint, compute_name_fingerprint, Fingerprint, FingerprintError,
    FingerprintKind,
};
use serde::Serialize;
use tokio::io::AsyncSeekExt;

use crate::db::{document, hash_mapping, Backend, Database, Document, StorageError};
use crate::library::{Library, LibraryError};

/// Default number of documents per batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Restrict the run to one user
    pub owner: Option<String>,
    /// Recompute fingerprints that are already recorded
    pub force: bool,
    pub batch_size: usize,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            owner: None,
            force: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Counters for a backfill run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Batches committed
    pub batches: u64,
}

/// Why a batch was abandoned
#[derive(Debug, thiserror::Error)]
pub enum BatchFailure {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("Unknown owner: {0}")]
    UnknownOwner(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A batch was rolled back; `report` counts everything up to the failure
    #[error("Backfill halted after {} committed batch(es): {source}", report.batches)]
    BatchFailed {
        report: BackfillReport,
        #[source]
        source: BatchFailure,
    },
}

/// Fingerprints computed for one document, not yet written
#[derive(Debug)]
struct PlannedUpdate {
    owner: i64,
    document_id: i64,
    content: Option<Fingerprint>,
    name: Option<Fingerprint>,
    /// A required kind could not be computed
    incomplete: bool,
}

impl PlannedUpdate {
    fn mappings(&self) -> impl Iterator<Item = (&Fingerprint, FingerprintKind)> {
        self.content
            .iter()
            .map(|fp| (fp, FingerprintKind::Content))
            .chain(self.name.iter().map(|fp| (fp, FingerprintKind::Name)))
    }
}

#[derive(Debug, Clone)]
pub struct BackfillProcess {
    db: Database,
    library: Arc<dyn Library>,
}

impl BackfillProcess {
    pub fn new(db: Database, library: Arc<dyn Library>) -> Self {
        Self { db, library }
    }

    pub async fn run(&self, options: BackfillOptions) -> Result<BackfillReport, BackfillError> {
        let owner = match &options.owner {
            Some(username) => Some(
                self.db
                    .users
                    .find_by_username(username)
                    .await?
                    .ok_or_else(|| BackfillError::UnknownOwner(username.clone()))?
                    .id,
            ),
            None => None,
        };
        let batch_size = options.batch_size.max(1);

        tracing::info!(
            owner = ?options.owner,
            force = options.force,
            batch_size,
            "Starting fingerprint backfill"
        );

        let mut report = BackfillReport::default();
        let mut after_id = 0;

        loop {
            let batch = self
                .db
                .documents
                .needing_fingerprints(owner, options.force, after_id, batch_size as i64)
                .await
                .map_err(|e| BackfillError::BatchFailed {
                    report,
                    source: e.into(),
                })?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;

            let mut planned = Vec::with_capacity(batch.len());
            for doc in &batch {
                report.processed += 1;
                match self.plan(doc, options.force).await {
                    Ok(Some(update)) => {
                        report.failed += u64::from(update.incomplete);
                        planned.push(update);
                    }
                    Ok(None) => report.failed += 1,
                    Err(source) => {
                        tracing::error!(
                            document_id = doc.id,
                            owner = doc.owner,
                            error = %source,
                            "Backfill batch aborted"
                        );
                        return Err(BackfillError::BatchFailed { report, source });
                    }
                }
            }

            if let Err(e) = self.apply(&planned).await {
                tracing::error!(after_id, error = %e, "Backfill batch rolled back");
                return Err(BackfillError::BatchFailed {
                    report,
                    source: e.into(),
                });
            }

            report.succeeded += planned.iter().filter(|u| !u.incomplete).count() as u64;
            report.batches += 1;
            tracing::info!(
                batch = report.batches,
                size = batch.len(),
                processed = report.processed,
                failed = report.failed,
                "Committed backfill batch"
            );
        }

        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            batches = report.batches,
            "Fingerprint backfill complete"
        );
        Ok(report)
    }

    /// Compute what a document is missing.
    ///
    /// A kind that cannot be computed is left out of the plan and marks it
    /// incomplete. `Ok(None)` means neither kind could be computed.
    async fn plan(
        &self,
        doc: &Document,
        force: bool,
    ) -> Result<Option<PlannedUpdate>, BatchFailure> {
        let mut incomplete = false;

        let name = if force || doc.name_hash.is_none() {
            match compute_name_fingerprint(&doc.name) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    tracing::warn!(document_id = doc.id, error = %e, "No name fingerprint");
                    incomplete = true;
                    None
                }
            }
        } else {
            None
        };

        let content = if force || doc.content_hash.is_none() {
            let content = self.content_fingerprint(doc).await?;
            incomplete |= content.is_none();
            content
        } else {
            None
        };

        if content.is_none() && name.is_none() {
            return Ok(None);
        }

        Ok(Some(PlannedUpdate {
            owner: doc.owner,
            document_id: doc.id,
            content,
            name,
            incomplete,
        }))
    }

    /// Content fingerprint of a record's file, `None` when it cannot be sampled
    async fn content_fingerprint(
        &self,
        doc: &Document,
    ) -> Result<Option<Fingerprint>, BatchFailure> {
        let mut source = match self.library.open_record(doc).await {
            Ok(source) => source,
            Err(LibraryError::Missing(locator)) => {
                tracing::warn!(
                    document_id = doc.id,
                    locator = %locator,
                    "No content fingerprint, file is gone"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let size = source.seek(SeekFrom::End(0)).await?;

        match compute_content_fingerprint(&mut *source, size).await {
            Ok(fp) => Ok(Some(fp)),
            Err(FingerprintError::Io(e)) => Err(e.into()),
            Err(e) => {
                tracing::warn!(document_id = doc.id, error = %e, "No content fingerprint");
                Ok(None)
            }
        }
    }

    /// Write a batch atomically
    async fn apply(&self, planned: &[PlannedUpdate]) -> Result<(), StorageError> {
        match self.db.backend() {
            Backend::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                for update in planned {
                    document::set_fingerprints_query(
                        &mut *tx,
                        update.document_id,
                        update.content.as_ref(),
                        update.name.as_ref(),
                    )
                    .await?;
                    for (fp, kind) in update.mappings() {
                        hash_mapping::upsert_query(
                            &mut tx,
                            update.owner,
                            fp,
                            kind,
                            update.document_id,
                        )
                        .await?;
                    }
                }
                tx.commit().await?;
            }
            // Everything was computed up front and memory writes cannot fail
            Backend::Memory(_) => {
                for update in planned {
                    self.db
                        .documents
                        .set_fingerprints(
                            update.document_id,
                            update.content.as_ref(),
                            update.name.as_ref(),
                        )
                        .await?;
                    for (fp, kind) in update.mappings() {
                        self.db
                            .mappings
                            .upsert(update.owner, fp, kind, update.document_id)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }
}
