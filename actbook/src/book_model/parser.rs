//! Structure parser
//!
//! Rebuilds the act/chapter hierarchy from a flat, heading-delimited markdown
//! stream in a single forward pass.

use super::error::StructureError;
use super::line::{Line, LineScanner};
use super::tree::{Chapter, DocumentTree};

/// Parser state for building a [`DocumentTree`]
struct TreeBuilder {
    /// Tree being built
    tree: DocumentTree,

    /// Index of the open act in `tree.acts`
    current_act: Option<usize>,

    /// Title of the open chapter within the open act
    current_chapter: Option<String>,

    /// Body lines of the open chapter
    buffer: String,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            tree: DocumentTree::default(),
            current_act: None,
            current_chapter: None,
            buffer: String::new(),
        }
    }

    fn process(&mut self, line_number: usize, line: Line<'_>) -> Result<(), StructureError> {
        match line {
            Line::Title(title) => {
                if self.tree.info.title.is_empty() {
                    self.tree.info.title = title.to_string();
                }
            }
            Line::Author(author) => {
                if self.tree.info.author.is_empty() {
                    self.tree.info.author = author.to_string();
                }
            }
            Line::Act(title) => {
                self.seal_chapter();
                self.current_act = Some(self.tree.open_act(title));
                self.current_chapter = None;
            }
            Line::Chapter(title) => {
                self.seal_chapter();
                let act = self
                    .current_act
                    .ok_or_else(|| StructureError::ChapterWithoutAct {
                        chapter: title.to_string(),
                        line: line_number,
                    })?;
                self.tree.acts[act].upsert_chapter(Chapter {
                    title: title.to_string(),
                    content: String::new(),
                });
                self.current_chapter = Some(title.to_string());
            }
            Line::Body(text) => {
                if self.current_act.is_some() && self.current_chapter.is_some() {
                    self.buffer.push_str(text);
                    self.buffer.push('\n');
                }
            }
        }
        Ok(())
    }

    /// Move the buffered body into the open chapter
    fn seal_chapter(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let (Some(act), Some(title)) = (self.current_act, self.current_chapter.take()) else {
            return;
        };

        if let Some(chapter) = self.tree.acts[act]
            .chapters
            .iter_mut()
            .find(|chapter| chapter.title == title)
        {
            chapter.content = seal_content(&buffer);
        }
    }

    fn finish(mut self) -> DocumentTree {
        self.seal_chapter();
        self.tree
    }
}

/// Trim leading and trailing blank lines from a chapter body
pub(crate) fn seal_content(buffer: &str) -> String {
    buffer.trim().to_string()
}

/// Parse a flat markdown stream into a document tree
///
/// # Parameters
/// * `markdown` - Manuscript with `#` title, optional `**Autor:**` line,
///   `##` act headings and `###` chapter headings
///
/// # Returns
/// * `Ok(DocumentTree)` - Parsed tree; `acts` is empty when no act heading was found
/// * `Err(StructureError)` - A chapter heading appeared before any act heading
pub fn parse(markdown: &str) -> Result<DocumentTree, StructureError> {
    let mut builder = TreeBuilder::new();

    for (line_number, line) in LineScanner::new(markdown) {
        builder.process(line_number, line)?;
    }

    let tree = builder.finish();
    log::debug!(
        "Parsed '{}' with {} acts and {} chapters",
        tree.info.title,
        tree.acts.len(),
        tree.chapter_count()
    );
    Ok(tree)
}
