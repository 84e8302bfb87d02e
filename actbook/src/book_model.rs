//! Book model for the parsing stage
//!
//! This module defines the act/chapter hierarchy rebuilt from a flat
//! markdown manuscript, the line grammar that drives it, and the numbering
//! conventions shared with directory discovery.

// Submodules
mod error;
mod line;
mod numbering;
mod parser;
mod tree;

// Re-export public types
pub use error::StructureError;
pub use line::{Line, LineScanner, AUTHOR_MARKER};
pub use numbering::{act_directory_number, chapter_file_number, title_number_of};
pub use parser::parse;
pub(crate) use parser::seal_content;
pub use tree::{act_number, Act, ActTitle, BookInfo, Chapter, DocumentTree};

/// A loaded book, with the assembly mode decided once at load time
#[derive(Debug, Clone, PartialEq)]
pub enum Manuscript {
    /// At least one act has chapters: assemble from the tree
    Structured(DocumentTree),

    /// Acts without any chapters: assemble directly from the flat stream
    Flat {
        /// Front matter
        info: BookInfo,
        /// The original markdown stream
        stream: String,
    },
}

impl Manuscript {
    /// Choose the assembly mode for a parsed tree and its source stream
    pub fn from_tree(tree: DocumentTree, stream: String) -> Self {
        if tree.has_chapters() {
            Manuscript::Structured(tree)
        } else {
            Manuscript::Flat {
                info: tree.info,
                stream,
            }
        }
    }

    /// Front matter of the book
    pub fn info(&self) -> &BookInfo {
        match self {
            Manuscript::Structured(tree) => &tree.info,
            Manuscript::Flat { info, .. } => info,
        }
    }

    /// Mutable front matter of the book
    pub fn info_mut(&mut self) -> &mut BookInfo {
        match self {
            Manuscript::Structured(tree) => &mut tree.info,
            Manuscript::Flat { info, .. } => info,
        }
    }
}
