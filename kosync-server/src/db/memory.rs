//! In-memory tables backing the memory storage backend
//!
//! Keys mirror the unique constraints of the PostgreSQL schema so both
//! backends agree on upsert and cascade behaviour.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

use super::document::Document;
use super::hash_mapping::HashMapping;
use super::sync_progress::ProgressRecord;
use super::user::User;

/// `(owner, fingerprint)` key shared by mappings and progress rows
pub(crate) type OwnerKey = (i64, String);

#[derive(Default)]
pub struct MemoryTables {
    /// Users keyed by username
    pub(crate) users: DashMap<String, User>,
    /// Documents keyed by id
    pub(crate) documents: DashMap<i64, Document>,
    pub(crate) mappings: DashMap<OwnerKey, HashMapping>,
    pub(crate) progress: DashMap<OwnerKey, ProgressRecord>,
    user_seq: AtomicI64,
    document_seq: AtomicI64,
}

impl MemoryTables {
    pub(crate) fn next_user_id(&self) -> i64 {
        self.user_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_document_id(&self) -> i64 {
        self.document_seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl std::fmt::Debug for MemoryTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTables")
            .field("users", &self.users.len())
            .field("documents", &self.documents.len())
            .field("mappings", &self.mappings.len())
            .field("progress", &self.progress.len())
            .finish()
    }
}
