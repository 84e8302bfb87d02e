//! actbook - PDF books from Markdown acts and chapters
//!
//! A book is a markdown manuscript with one `#` title, `##` act headings and
//! `###` chapter headings, or a directory of `N. Akt` folders holding
//! `N. Kapitel.md` files, locally or in a GitHub repository.
//!
//! ```text
//! load (file | string | directory | GitHub)
//!   -> book_model::parse -> Manuscript (structured or flat)
//!   -> Assembler -> RenderTarget (Typst) -> PDF
//! ```

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod assembler;
pub mod book_model;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod images;
pub mod markup;
pub mod metadata;
pub mod render;
pub mod repository;
pub mod session;
pub mod typography;
pub mod typst_target;

pub use assembler::Assembler;
pub use book_model::{parse, BookInfo, DocumentTree, Manuscript, StructureError};
pub use config::{ConfigError, RenderConfig, CONFIG_FILE_NAME};
pub use error::BookError;
pub use metadata::BookMetadata;
pub use render::{CommandLog, RenderCommand, RenderError, RenderTarget};
pub use repository::{GitHubRepository, LocalRepository, RepoRef, Repository, RepositoryError};
pub use session::{BookSession, GenerationReport, SessionOptions};
pub use typst_target::TypstTarget;
