//! File access seam for the resource graph.
//!
//! Archive (zip) readers, user-directory overrides and path resolution live
//! outside the engine; the graph only needs "give me this member of this
//! source as a string". [`DirectoryFiles`] is the plain-filesystem provider
//! used by the app; [`MemoryFiles`] backs tests.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{file} not found in {src}")]
    NotFound { src: String, file: String },
    #[error("io error reading {0}: {1}")]
    Io(String, String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("{0}")]
    Unsupported(&'static str),
}

/// Resolves mod sources (directories or archives) to file contents.
pub trait FileProvider: Send + Sync {
    /// Read `file` out of `source`.
    fn as_string(&self, source: &str, file: &str) -> Result<String, FileError>;

    fn exists(&self, source: &str, file: &str) -> bool {
        self.as_string(source, file).is_ok()
    }

    /// Pack a directory into an archive; only archive-backed providers
    /// support this.
    fn compress(&self, _dir: &str) -> Result<(), FileError> {
        Err(FileError::Unsupported("no archive backend installed"))
    }

    /// Unpack an archive into a directory.
    fn uncompress(&self, _archive: &str) -> Result<(), FileError> {
        Err(FileError::Unsupported("no archive backend installed"))
    }
}

/// Plain directory provider. Roots are searched in order, so a per-user
/// override directory placed first shadows the app directory; a file not
/// found in one root falls through to the next.
pub struct DirectoryFiles {
    pub roots: Vec<PathBuf>,
}

impl DirectoryFiles {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        DirectoryFiles { roots }
    }

    /// Single-root provider anchored at the working directory.
    pub fn working_directory() -> Self {
        DirectoryFiles {
            roots: vec![PathBuf::from(".")],
        }
    }
}

impl FileProvider for DirectoryFiles {
    fn as_string(&self, source: &str, file: &str) -> Result<String, FileError> {
        for root in &self.roots {
            let path = root.join(source).join(file);
            if path.is_file() {
                return std::fs::read_to_string(&path)
                    .map_err(|e| FileError::Io(path.display().to_string(), e.to_string()));
            }
        }
        Err(FileError::NotFound {
            src: source.to_owned(),
            file: file.to_owned(),
        })
    }

    fn exists(&self, source: &str, file: &str) -> bool {
        self.roots.iter().any(|r| r.join(source).join(file).is_file())
    }
}

/// In-memory provider for tests and generated content.
#[derive(Default)]
pub struct MemoryFiles {
    files: RwLock<FxHashMap<(String, String), String>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source: &str, file: &str, text: impl Into<String>) {
        self.files
            .write()
            .insert((source.to_owned(), file.to_owned()), text.into());
    }
}

impl FileProvider for MemoryFiles {
    fn as_string(&self, source: &str, file: &str) -> Result<String, FileError> {
        self.files
            .read()
            .get(&(source.to_owned(), file.to_owned()))
            .cloned()
            .ok_or_else(|| FileError::NotFound {
                src: source.to_owned(),
                file: file.to_owned(),
            })
    }
}

/// Shared provider handle used by the data manager.
pub type FileProviderHandle = Arc<dyn FileProvider>;
