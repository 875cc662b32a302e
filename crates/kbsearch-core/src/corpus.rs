//! Where documents come from. The chunker only sees the [`Corpus`] trait; the
//! filesystem walker is the production implementation.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::Document;

pub trait Corpus: Send + Sync {
    /// All document paths, `/`-separated and sorted. Fails when the corpus itself is unreachable.
    fn list(&self) -> Result<Vec<String>>;
    /// Read one document. Failures here are per-file and recoverable.
    fn load(&self, path: &str) -> Result<Document>;
}

pub struct FsCorpus {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsCorpus {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_ascii_lowercase()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl Corpus for FsCorpus {
    fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(Error::Configuration(format!(
                "corpus root {} does not exist or is not a directory",
                self.root.display()
            )));
        }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if !self.accepts(path) {
                continue;
            }
            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
            files.push(parts.join("/"));
        }
        files.sort();
        Ok(files)
    }

    /// `path` is relative to the corpus root, as returned by [`Corpus::list`].
    fn load(&self, path: &str) -> Result<Document> {
        let full = self.root.join(path);
        let meta = fs::metadata(&full).map_err(|e| Error::ingestion(path, e))?;
        let bytes = fs::read(&full).map_err(|e| Error::ingestion(path, e))?;
        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).to_string(),
        };
        let mtime = meta.modified().ok().map(DateTime::<Utc>::from);
        Ok(Document { path: path.to_string(), content, mtime, size: meta.len() })
    }
}
