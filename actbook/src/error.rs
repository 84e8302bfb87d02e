//! Errors of the book generation pipeline

use crate::book_model::StructureError;
use crate::config::ConfigError;
use crate::render::RenderError;
use crate::repository::RepositoryError;
use thiserror::Error;

/// Errors that abort loading or generating a book
#[derive(Error, Debug)]
pub enum BookError {
    /// A local or remote input path does not exist
    #[error("Input not found: {0}")]
    InputNotFound(String),

    /// Malformed heading nesting in the manuscript
    #[error("Structural error: {0}")]
    Structure(#[from] StructureError),

    /// A required remote file could not be transferred
    #[error("Transfer of {path} failed: {source}")]
    RemoteTransfer {
        path: String,
        #[source]
        source: RepositoryError,
    },

    /// The render target rejected a command or could not produce the output
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// The manuscript has no act headings
    #[error("Nothing to render: the manuscript contains no acts")]
    EmptyDocument,

    /// `generate` was called before anything was loaded
    #[error("No book loaded")]
    NothingLoaded,

    #[error("Invalid repository URL: {0}")]
    InvalidRepositoryUrl(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BookError {
    /// Wrap a repository error for a required resource
    ///
    /// A missing path becomes [`BookError::InputNotFound`].
    pub fn from_repository(path: &str, source: RepositoryError) -> Self {
        if source.is_not_found() {
            BookError::InputNotFound(path.to_string())
        } else {
            BookError::RemoteTransfer {
                path: path.to_string(),
                source,
            }
        }
    }
}
