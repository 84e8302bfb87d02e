//! Render targets
//!
//! The assembler drives a paginated document through the [`RenderTarget`]
//! trait. [`crate::typst_target::TypstTarget`] produces a PDF;
//! [`CommandLog`] records the command sequence.

use std::path::Path;
use thiserror::Error;

/// Errors reported by render targets
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Typst compilation failed: {0}")]
    Compilation(String),

    #[error("Font loading error: {0}")]
    Font(String),

    #[error("Image error: {0}")]
    Image(String),
}

/// A paginated document being built
pub trait RenderTarget {
    /// Set document title and author
    fn set_document_info(&mut self, title: &str, author: &str) -> Result<(), RenderError>;

    /// Start a new page
    fn add_page(&mut self) -> Result<(), RenderError>;

    /// Register a bookmark at the current position; level 0 is top level
    fn bookmark(&mut self, title: &str, level: usize) -> Result<(), RenderError>;

    /// Reserve the table of contents at the current position
    fn reserve_toc(&mut self, title: &str) -> Result<(), RenderError>;

    /// Write a block of Typst markup
    fn write_markup(&mut self, markup: &str) -> Result<(), RenderError>;

    /// Produce the final artifact at `output`
    fn finish(&mut self, output: &Path) -> Result<(), RenderError>;
}

/// A single call into a render target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    DocumentInfo { title: String, author: String },
    AddPage,
    Bookmark { title: String, level: usize },
    TableOfContents { title: String },
    Markup(String),
}

/// Render target that records every command
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    pub commands: Vec<RenderCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages started
    pub fn page_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, RenderCommand::AddPage))
            .count()
    }

    /// Bookmarks in order, with their levels
    pub fn bookmarks(&self) -> Vec<(&str, usize)> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RenderCommand::Bookmark { title, level } => Some((title.as_str(), *level)),
                _ => None,
            })
            .collect()
    }
}

impl RenderTarget for CommandLog {
    fn set_document_info(&mut self, title: &str, author: &str) -> Result<(), RenderError> {
        self.commands.push(RenderCommand::DocumentInfo {
            title: title.to_string(),
            author: author.to_string(),
        });
        Ok(())
    }

    fn add_page(&mut self) -> Result<(), RenderError> {
        self.commands.push(RenderCommand::AddPage);
        Ok(())
    }

    fn bookmark(&mut self, title: &str, level: usize) -> Result<(), RenderError> {
        self.commands.push(RenderCommand::Bookmark {
            title: title.to_string(),
            level,
        });
        Ok(())
    }

    fn reserve_toc(&mut self, title: &str) -> Result<(), RenderError> {
        self.commands.push(RenderCommand::TableOfContents {
            title: title.to_string(),
        });
        Ok(())
    }

    fn write_markup(&mut self, markup: &str) -> Result<(), RenderError> {
        self.commands.push(RenderCommand::Markup(markup.to_string()));
        Ok(())
    }

    fn finish(&mut self, _output: &Path) -> Result<(), RenderError> {
        Ok(())
    }
}
