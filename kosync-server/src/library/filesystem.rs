//! Filesystem-backed library
//!
//! Each user's documents are the regular files below `<root>/<username>/`.
//! Locators are paths relative to `root` with `/` separators, so they match
//! the `path` column of persisted document records.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kosync_core::ByteSource;
use walkdir::{DirEntry, WalkDir};

use super::{Library, LibraryEntry, LibraryError};
use crate::db::{DocumentRepository, NewDocument, User};

#[derive(Debug, Clone)]
pub struct FilesystemLibrary {
    root: PathBuf,
    documents: Arc<DocumentRepository>,
}

impl FilesystemLibrary {
    pub fn new(root: impl Into<PathBuf>, documents: Arc<DocumentRepository>) -> Self {
        Self {
            root: root.into(),
            documents,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a locator below the root, refusing anything that could escape it
    fn resolve(&self, locator: &str) -> Result<PathBuf, LibraryError> {
        let relative = Path::new(locator);
        let safe = !locator.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(LibraryError::InvalidLocator(locator.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Walk `<root>/<username>` and collect every regular, non-hidden file
    fn scan(root: &Path, username: &str) -> Vec<LibraryEntry> {
        let user_dir = root.join(username);
        if !user_dir.is_dir() {
            return Vec::new();
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&user_dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable library entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(locator) = locator_for(root, entry.path()) else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 path");
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

            entries.push(LibraryEntry {
                id: None,
                name,
                locator,
                size,
            });
        }
        entries
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn locator_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

#[async_trait]
impl Library for FilesystemLibrary {
    async fn list_documents(&self, owner: &User) -> Result<Vec<LibraryEntry>, LibraryError> {
        let root = self.root.clone();
        let username = owner.username.clone();
        let mut entries = tokio::task::spawn_blocking(move || Self::scan(&root, &username))
            .await
            .map_err(|e| LibraryError::Io {
                locator: owner.username.clone(),
                source: std::io::Error::other(e),
            })?;

        // Attach ids of files already registered
        let known: HashMap<String, i64> = self
            .documents
            .list_for_owner(owner.id)
            .await?
            .into_iter()
            .map(|d| (d.path, d.id))
            .collect();
        for entry in &mut entries {
            entry.id = known.get(&entry.locator).copied();
        }

        entries.sort_by(|a, b| a.locator.cmp(&b.locator));
        tracing::debug!(owner = owner.id, count = entries.len(), "Listed library documents");
        Ok(entries)
    }

    async fn open(&self, entry: &LibraryEntry) -> Result<Box<dyn ByteSource>, LibraryError> {
        let path = self.resolve(&entry.locator)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| LibraryError::io(&entry.locator, e))?;
        Ok(Box::new(file))
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
