//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use crate::db::{Database, HashMappingStore, SyncProgressStore, UserRepository};
use crate::library::Library;
use crate::resolution::ResolutionEngine;

/// Application state containing shared resources.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Sync users and their stored keys
    pub users: Arc<UserRepository>,
    /// Fingerprint to document mappings
    pub mappings: Arc<HashMappingStore>,
    /// Reading progress keyed by fingerprint
    pub progress: Arc<SyncProgressStore>,
    /// Resolves fingerprints the mapping store does not know
    pub resolver: Arc<ResolutionEngine>,
}

impl AppState {
    pub fn new(db: &Database, library: Arc<dyn Library>) -> Self {
        Self {
            users: db.users.clone(),
            mappings: db.mappings.clone(),
            progress: db.progress.clone(),
            resolver: Arc::new(ResolutionEngine::new(library, db.mappings.clone())),
        }
    }
}
