//! In-memory library for tests and demos
//!
//! Files live in a map keyed by locator (`<username>/<name>`). Records are
//! registered through the same [`DocumentRepository`] the filesystem library
//! uses.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use kosync_core::ByteSource;

use super::{Library, LibraryEntry, LibraryError};
use crate::db::{DocumentRepository, NewDocument, StorageError, User};

#[derive(Debug, Clone)]
pub struct MemoryLibrary {
    files: Arc<DashMap<String, Arc<[u8]>>>,
    documents: Arc<DocumentRepository>,
}

impl MemoryLibrary {
    pub fn new(documents: Arc<DocumentRepository>) -> Self {
        Self {
            files: Arc::new(DashMap::new()),
            documents,
        }
    }

    fn locator(owner: &User, name: &str) -> String {
        format!("{}/{}", owner.username, name)
    }

    /// Store a file without registering a record for it
    pub fn put(&self, owner: &User, name: &str, bytes: impl Into<Arc<[u8]>>) -> String {
        let locator = Self::locator(owner, name);
        self.files.insert(locator.clone(), bytes.into());
        locator
    }

    /// Store a file and register its record, returning the document id
    pub async fn add(
        &self,
        owner: &User,
        name: &str,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<i64, StorageError> {
        let bytes = bytes.into();
        let size = bytes.len() as i64;
        let locator = self.put(owner, name, bytes);
        let doc = self
            .documents
            .ensure(&NewDocument {
                owner: owner.id,
                path: locator,
                name: name.to_string(),
                size,
            })
            .await?;
        Ok(doc.id)
    }

    /// Replace the bytes behind an existing locator
    pub fn replace(&self, locator: &str, bytes: impl Into<Arc<[u8]>>) -> bool {
        match self.files.get_mut(locator) {
            Some(mut file) => {
                *file = bytes.into();
                true
            }
            None => false,
        }
    }

    /// Drop a file. Its record, if any, is left alone.
    pub fn remove(&self, locator: &str) -> bool {
        self.files.remove(locator).is_some()
    }
}

#[async_trait]
impl Library for MemoryLibrary {
    async fn list_documents(&self, owner: &User) -> Result<Vec<LibraryEntry>, LibraryError> {
        let prefix = format!("{}/", owner.username);
        let records = self.documents.list_for_owner(owner.id).await?;

        let mut entries: Vec<LibraryEntry> = self
            .files
            .iter()
            .filter(|f| f.key().starts_with(&prefix))
            .map(|f| {
                let locator = f.key().clone();
                let name = locator[prefix.len()..].to_string();
                LibraryEntry {
                    id: records.iter().find(|d| d.path == locator).map(|d| d.id),
                    name,
                    size: f.value().len() as u64,
                    locator,
                }
            })
            .collect();

        entries.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(entries)
    }

    async fn open(&self, entry: &LibraryEntry) -> Result<Box<dyn ByteSource>, LibraryError> {
        let bytes = self
            .files
            .get(&entry.locator)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| LibraryError::Missing(entry.locator.clone()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn ensure_document_record(
        &self,
        owner: &User,
        entry: &LibraryEntry,
    ) -> Result<i64, LibraryError> {
        let doc = self
            .documents
            .ensure(&NewDocument {
                owner: owner.id,
                path: entry.locator.clone(),
                name: entry.name.clone(),
                size: i64::try_from(entry.size).unwrap_or(i64::MAX),
            })
            .await?;
        Ok(doc.id)
    }
}
