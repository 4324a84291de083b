//! Document corpus capability consumed by discovery and content sync.
//!
//! # Responsibility
//! - Abstract the document storage layer: listing, reading, modification
//!   time and tags of markdown documents.
//! - Provide an in-memory corpus for embedding and tests, and a filesystem
//!   corpus rooted at one directory.
//!
//! # Invariants
//! - Paths are corpus-relative and `/`-separated.
//! - `list_documents` is sorted, so discovery order is stable.
//! - An unreadable part of the corpus is reported, never mistaken for a
//!   deleted one.

mod fs;
mod memory;
pub mod tags;

pub use fs::FsCorpus;
pub use memory::MemoryCorpus;

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CorpusResult<T> = Result<T, CorpusError>;

/// Failure reading from the corpus.
#[derive(Debug)]
pub enum CorpusError {
    /// Document does not exist (or vanished between listing and reading).
    NotFound(String),
    /// Path escapes the corpus root or is not valid UTF-8.
    InvalidPath(String),
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl Display for CorpusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "document not found: {path}"),
            Self::InvalidPath(path) => write!(f, "invalid document path: {path}"),
            Self::Io { path, source } => write!(f, "cannot read document `{path}`: {source}"),
        }
    }
}

impl Error for CorpusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::NotFound(_) | Self::InvalidPath(_) => None,
        }
    }
}

/// Listing that carries the parts of the corpus it could not read.
#[derive(Debug, Default)]
pub struct DocumentListing {
    /// Readable markdown document paths, sorted.
    pub documents: Vec<String>,
    /// Corpus-relative files or directories that could not be listed.
    pub unreadable: Vec<(String, CorpusError)>,
}

/// Read-only view of the documents decks are built from.
pub trait DocumentCorpus: Send + Sync {
    /// All markdown document paths, sorted. Fails if any part of the corpus
    /// cannot be listed.
    fn list_documents(&self) -> CorpusResult<Vec<String>>;

    /// Lists documents, reporting unreadable entries instead of failing.
    /// Only a corpus that cannot be listed at all is an error.
    fn scan_documents(&self) -> CorpusResult<DocumentListing> {
        Ok(DocumentListing {
            documents: self.list_documents()?,
            unreadable: Vec::new(),
        })
    }

    fn read_document(&self, path: &str) -> CorpusResult<String>;
    /// Modification time in epoch milliseconds.
    fn modified_at(&self, path: &str) -> CorpusResult<i64>;

    /// Inline and front-matter tags without the leading `#`.
    fn document_tags(&self, path: &str) -> CorpusResult<Vec<String>> {
        Ok(tags::extract_tags(&self.read_document(path)?))
    }
}
