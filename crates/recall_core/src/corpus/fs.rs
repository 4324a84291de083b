use super::{CorpusError, CorpusResult, DocumentCorpus, DocumentListing};
use chrono::{DateTime, Utc};
use log::warn;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const MARKDOWN_EXTENSION: &str = "md";

/// Markdown files below one root directory. Hidden entries are skipped.
#[derive(Debug, Clone)]
pub struct FsCorpus {
    root: PathBuf,
}

impl FsCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> CorpusResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(CorpusError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Corpus-relative `/`-joined form of `path`; `None` for the root itself,
    /// paths outside it and non-UTF-8 names.
    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        (!parts.is_empty()).then(|| parts.join("/"))
    }
}

fn io_error(path: &str, source: std::io::Error) -> CorpusError {
    if source.kind() == std::io::ErrorKind::NotFound {
        CorpusError::NotFound(path.to_string())
    } else {
        CorpusError::Io {
            path: path.to_string(),
            source,
        }
    }
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
    })
}

impl DocumentCorpus for FsCorpus {
    fn list_documents(&self) -> CorpusResult<Vec<String>> {
        let mut listing = self.scan_documents()?;
        match listing.unreadable.pop() {
            Some((_, err)) => Err(err),
            None => Ok(listing.documents),
        }
    }

    fn scan_documents(&self) -> CorpusResult<DocumentListing> {
        let mut listing = DocumentListing::default();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let relative = err.path().and_then(|path| self.relative(path));
                    let Some(relative) = relative.filter(|_| err.depth() > 0) else {
                        return Err(CorpusError::Io {
                            path: self.root.display().to_string(),
                            source: err.into(),
                        });
                    };
                    if is_hidden(Path::new(&relative)) {
                        continue;
                    }
                    warn!(
                        "event=corpus_unreadable module=corpus status=warn path={} error={}",
                        relative, err
                    );
                    listing.unreadable.push((
                        relative.clone(),
                        CorpusError::Io {
                            path: relative,
                            source: err.into(),
                        },
                    ));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MARKDOWN_EXTENSION) {
                continue;
            }
            let Some(relative) = self.relative(path) else {
                warn!(
                    "event=corpus_skip module=corpus status=warn reason=non_utf8_path path={}",
                    path.display()
                );
                continue;
            };
            if is_hidden(Path::new(&relative)) {
                continue;
            }
            listing.documents.push(relative);
        }
        listing.documents.sort();
        listing.unreadable.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(listing)
    }

    fn read_document(&self, path: &str) -> CorpusResult<String> {
        let full = self.resolve(path)?;
        std::fs::read_to_string(full).map_err(|err| io_error(path, err))
    }

    fn modified_at(&self, path: &str) -> CorpusResult<i64> {
        let full = self.resolve(path)?;
        let modified = std::fs::metadata(full)
            .and_then(|metadata| metadata.modified())
            .map_err(|err| io_error(path, err))?;
        Ok(DateTime::<Utc>::from(modified).timestamp_millis())
    }
}
