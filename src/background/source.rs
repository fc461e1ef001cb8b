use std::{collections::HashMap, fs, time::UNIX_EPOCH};

use parking_lot::RwLock;

use crate::{
    duchain::duchain::DocumentId,
    errors::errors::{Error, ErrorImpl},
    types::types::Revision,
    Position,
};

/// Where document text comes from.
pub trait DocumentSource: Send + Sync {
    fn contents(&self, document: &DocumentId) -> Result<String, Error>;

    /// Modification revision, `None` when the document does not exist.
    fn revision(&self, document: &DocumentId) -> Option<Revision>;

    fn exists(&self, document: &DocumentId) -> bool {
        self.revision(document).is_some()
    }
}

/// Reads documents from disk; the revision is the modification time.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemSource;

impl DocumentSource for FileSystemSource {
    fn contents(&self, document: &DocumentId) -> Result<String, Error> {
        fs::read_to_string(document.path()).map_err(|error| {
            let internal_error = match error.kind() {
                std::io::ErrorKind::NotFound => ErrorImpl::DocumentNotFound {
                    document: document.to_string(),
                },
                _ => ErrorImpl::DocumentUnreadable {
                    document: document.to_string(),
                    message: error.to_string(),
                },
            };
            Error::new(internal_error, Position::null())
        })
    }

    fn revision(&self, document: &DocumentId) -> Option<Revision> {
        let metadata = fs::metadata(document.path()).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let modified = metadata.modified().ok()?;
        let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
        // Keep zero free for documents that were never read.
        Some((nanos as Revision).max(1))
    }
}

/// Documents held in memory; every update bumps the revision.
#[derive(Debug, Default)]
pub struct InMemorySource {
    documents: RwLock<HashMap<DocumentId, (String, Revision)>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        InMemorySource::default()
    }

    /// Stores `contents` and returns the new revision.
    pub fn set(&self, document: &DocumentId, contents: impl Into<String>) -> Revision {
        let mut documents = self.documents.write();
        let revision = documents.get(document).map_or(1, |(_, revision)| revision + 1);
        documents.insert(document.clone(), (contents.into(), revision));
        revision
    }

    pub fn remove(&self, document: &DocumentId) {
        self.documents.write().remove(document);
    }
}

impl DocumentSource for InMemorySource {
    fn contents(&self, document: &DocumentId) -> Result<String, Error> {
        self.documents
            .read()
            .get(document)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| {
                Error::new(
                    ErrorImpl::DocumentNotFound {
                        document: document.to_string(),
                    },
                    Position::null(),
                )
            })
    }

    fn revision(&self, document: &DocumentId) -> Option<Revision> {
        self.documents.read().get(document).map(|(_, revision)| *revision)
    }
}
