//! Document library access
//!
//! The sync engine never walks storage itself. It asks a [`Library`] for the
//! documents a user owns and for their bytes, and asks it to register a
//! document record when resolution discovers a file that was never indexed.

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemLibrary;
pub use memory::MemoryLibrary;

use async_trait::async_trait;
use kosync_core::ByteSource;

use crate::db::{Document, StorageError, User};

/// Library errors
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// The document is listed or recorded but its bytes are gone
    #[error("Document not found in library: {0}")]
    Missing(String),

    /// Locator escapes the library root or is otherwise unusable
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("I/O error on {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LibraryError {
    /// Map an I/O error, keeping "not found" distinguishable
    pub fn io(locator: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::Missing(locator.to_string())
        } else {
            Self::Io {
                locator: locator.to_string(),
                source,
            }
        }
    }
}

/// A document as the library currently sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    /// Persisted record id, when the document has been registered
    pub id: Option<i64>,
    /// Current filename
    pub name: String,
    /// Library-relative location of the bytes
    pub locator: String,
    pub size: u64,
}

impl From<&Document> for LibraryEntry {
    fn from(doc: &Document) -> Self {
        Self {
            id: Some(doc.id),
            name: doc.name.clone(),
            locator: doc.path.clone(),
            size: u64::try_from(doc.size).unwrap_or(0),
        }
    }
}

/// Source of documents and their bytes.
#[async_trait]
pub trait Library: Send + Sync + std::fmt::Debug {
    /// Every document owned by `owner`. Order carries no meaning.
    async fn list_documents(&self, owner: &User) -> Result<Vec<LibraryEntry>, LibraryError>;

    /// Open the bytes behind `entry`
    async fn open(&self, entry: &LibraryEntry) -> Result<Box<dyn ByteSource>, LibraryError>;

    /// Get-or-create the persisted record for `entry`, returning its id
    async fn ensure_document_record(
        &self,
        owner: &User,
        entry: &LibraryEntry,
    ) -> Result<i64, LibraryError>;

    /// Open the bytes behind a persisted record
    async fn open_record(&self, record: &Document) -> Result<Box<dyn ByteSource>, LibraryError> {
        self.open(&LibraryEntry::from(record)).await
    }
}
