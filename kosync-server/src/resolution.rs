//! Fingerprint resolution
//!
//! When a client presents a fingerprint the server has no mapping for, the
//! owner's library is rescanned and every candidate fingerprinted until one
//! matches. A match is persisted as a mapping so the scan happens once per
//! unknown fingerprint.

use std::sync::Arc;

use kosync_core::{
    compute_content_fingerprint, compute_name_fingerprint, Fingerprint, FingerprintKind,
};

use crate::db::{HashMappingStore, ProgressRecord, StorageError, SyncProgressStore, User};
use crate::library::{Library, LibraryEntry, LibraryError};

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

/// Resolves unknown fingerprints against a [`Library`]
#[derive(Debug, Clone)]
pub struct ResolutionEngine {
    library: Arc<dyn Library>,
    mappings: Arc<HashMappingStore>,
}

impl ResolutionEngine {
    pub fn new(library: Arc<dyn Library>, mappings: Arc<HashMappingStore>) -> Self {
        Self { library, mappings }
    }

    pub fn library(&self) -> &Arc<dyn Library> {
        &self.library
    }

    /// Find the document `fingerprint` belongs to by scanning `owner`'s library.
    ///
    /// The first candidate whose content or name fingerprint matches wins.
    /// Returns `Ok(None)` when nothing matches; no mapping is written then.
    pub async fn resolve(
        &self,
        owner: &User,
        fingerprint: &Fingerprint,
    ) -> Result<Option<i64>, ResolutionError> {
        let candidates = self.library.list_documents(owner).await?;
        tracing::debug!(
            owner = owner.id,
            fingerprint = %fingerprint,
            candidates = candidates.len(),
            "Resolving unknown fingerprint"
        );

        for entry in &candidates {
            let Some(kind) = self.matches(owner, entry, fingerprint).await else {
                continue;
            };

            let document_id = self.library.ensure_document_record(owner, entry).await?;

            // The mapping only saves a future scan
            if let Err(e) = self
                .mappings
                .upsert(owner.id, fingerprint, kind, document_id)
                .await
            {
                tracing::warn!(
                    owner = owner.id,
                    fingerprint = %fingerprint,
                    document_id,
                    error = %e,
                    "Failed to store resolved mapping"
                );
            }

            tracing::info!(
                owner = owner.id,
                fingerprint = %fingerprint,
                document_id,
                kind = %kind,
                locator = %entry.locator,
                "Resolved fingerprint"
            );
            return Ok(Some(document_id));
        }

        tracing::debug!(owner = owner.id, fingerprint = %fingerprint, "Fingerprint unresolved");
        Ok(None)
    }

    /// Which fingerprint of `entry`, if any, equals `target`
    async fn matches(
        &self,
        owner: &User,
        entry: &LibraryEntry,
        target: &Fingerprint,
    ) -> Option<FingerprintKind> {
        let content = match self.content_fingerprint(entry).await {
            Ok(fp) => Some(fp),
            Err(reason) => {
                tracing::debug!(
                    owner = owner.id,
                    locator = %entry.locator,
                    reason = %reason,
                    "Content fingerprint unavailable"
                );
                None
            }
        };
        let name = match compute_name_fingerprint(&entry.name) {
            Ok(fp) => Some(fp),
            Err(e) => {
                tracing::debug!(
                    owner = owner.id,
                    locator = %entry.locator,
                    error = %e,
                    "Name fingerprint unavailable"
                );
                None
            }
        };

        if content.as_ref() == Some(target) {
            Some(FingerprintKind::Content)
        } else if name.as_ref() == Some(target) {
            Some(FingerprintKind::Name)
        } else {
            None
        }
    }

    async fn content_fingerprint(&self, entry: &LibraryEntry) -> Result<Fingerprint, String> {
        let mut source = match self.library.open(entry).await {
            Ok(source) => source,
            Err(e @ LibraryError::Missing(_)) => return Err(e.to_string()),
            Err(e) => {
                tracing::warn!(locator = %entry.locator, error = %e, "Failed to open library document");
                return Err(e.to_string());
            }
        };
        compute_content_fingerprint(&mut *source, entry.size)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Progress of a document across every fingerprint mapped to it.
///
/// Whichever fingerprint advanced last wins.
pub async fn document_progress(
    mappings: &HashMappingStore,
    progress: &SyncProgressStore,
    owner: i64,
    document_id: i64,
) -> Result<Option<ProgressRecord>, StorageError> {
    let fingerprints = mappings.all_fingerprints_for(owner, document_id).await?;
    progress.most_recent_among(owner, &fingerprints).await
}
