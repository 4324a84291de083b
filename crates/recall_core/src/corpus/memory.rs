use super::{CorpusError, CorpusResult, DocumentCorpus};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct MemoryDocument {
    text: String,
    modified_at: i64,
}

/// Shared in-memory corpus. Clones are handles to the same documents, so a
/// test can keep editing documents a coordinator already owns.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    documents: Arc<RwLock<BTreeMap<String, MemoryDocument>>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a document.
    pub fn write(&self, path: impl Into<String>, text: impl Into<String>, modified_at: i64) {
        self.write_guard().insert(
            path.into(),
            MemoryDocument {
                text: text.into(),
                modified_at,
            },
        );
    }

    /// Returns true when a document was removed.
    pub fn remove(&self, path: &str) -> bool {
        self.write_guard().remove(path).is_some()
    }

    /// Moves a document, keeping its text and modification time.
    pub fn rename(&self, old_path: &str, new_path: impl Into<String>) -> CorpusResult<()> {
        let mut documents = self.write_guard();
        let document = documents
            .remove(old_path)
            .ok_or_else(|| CorpusError::NotFound(old_path.to_string()))?;
        documents.insert(new_path.into(), document);
        Ok(())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, BTreeMap<String, MemoryDocument>> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, BTreeMap<String, MemoryDocument>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_document<T>(
        &self,
        path: &str,
        read: impl FnOnce(&MemoryDocument) -> T,
    ) -> CorpusResult<T> {
        self.read_guard()
            .get(path)
            .map(read)
            .ok_or_else(|| CorpusError::NotFound(path.to_string()))
    }
}

impl DocumentCorpus for MemoryCorpus {
    fn list_documents(&self) -> CorpusResult<Vec<String>> {
        Ok(self.read_guard().keys().cloned().collect())
    }

    fn read_document(&self, path: &str) -> CorpusResult<String> {
        self.with_document(path, |document| document.text.clone())
    }

    fn modified_at(&self, path: &str) -> CorpusResult<i64> {
        self.with_document(path, |document| document.modified_at)
    }
}
