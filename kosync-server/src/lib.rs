//! KOSync Server Library - KOReader progress sync with fingerprint resolution
//!
//! This library exposes the server components for use in integration tests
//! and the administrative CLI. The main binary uses these same components.

pub mod auth;
pub mod backfill;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod library;
pub mod openapi;
pub mod protocol;
pub mod resolution;
pub mod routes;
pub mod state;

pub use auth::{hash_key, verify_key, KoreaderAuth};
pub use backfill::{BackfillError, BackfillOptions, BackfillProcess, BackfillReport};
pub use cleanup::{DeletionReport, DocumentCleanup, PruneReport};
pub use config::Config;
pub use db::{
    Database, Document, HashMapping, HashMappingStore, ProgressRecord, ProgressUpdate,
    StorageError, SyncProgressStore, User, UserRepository,
};
pub use error::ApiError;
pub use library::{FilesystemLibrary, Library, LibraryEntry, LibraryError, MemoryLibrary};
pub use openapi::ApiDoc;
pub use protocol::KOREADER_CONTENT_TYPE;
pub use resolution::{document_progress, ResolutionEngine, ResolutionError};
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
