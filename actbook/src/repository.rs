//! Repository access for manuscript sources
//!
//! A [`Repository`] lists directories and downloads files by slash-separated
//! path. The tree fetcher and the metadata loader only talk to this trait, so
//! a GitHub repository and a local book directory are handled the same way.

use std::path::PathBuf;
use thiserror::Error;

mod github;
mod local;

pub use github::{GitHubRepository, RepoRef};
pub use local::LocalRepository;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// A directory entry in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    /// File or directory name
    pub name: String,
    /// Full path from the repository root
    pub path: String,
    pub kind: EntryKind,
}

impl RepoEntry {
    /// Lowercase extension of the entry name, if any
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
    }

    /// Entry name without its extension
    pub fn stem(&self) -> &str {
        std::path::Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.name)
    }
}

/// Read access to a tree of files
pub trait Repository {
    /// List the entries of a directory, in the repository's listing order
    fn list_directory(&self, path: &str) -> Result<Vec<RepoEntry>, RepositoryError>;

    /// Download the raw bytes of a file
    fn download_file(&self, path: &str) -> Result<Vec<u8>, RepositoryError>;
}

/// Errors reported by repository implementations
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The HTTP request could not be completed
    #[error("HTTP request for {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with something other than the expected content
    #[error("Unexpected response for {path}: {message}")]
    UnexpectedResponse { path: String, message: String },

    /// Local filesystem error
    #[error("IO error at {path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepositoryError {
    /// Whether the error means the path simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

/// Join two slash-separated repository paths
///
/// An empty `dir` yields `name` unchanged.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Last segment of a slash-separated path
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}
