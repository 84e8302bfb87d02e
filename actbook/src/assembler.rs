//! Document assembly
//!
//! Walks a [`Manuscript`] and drives a [`RenderTarget`]: document info, cover,
//! title page, table of contents, then one page per act and per chapter.
//!
//! Structured manuscripts are walked as a tree. Flat manuscripts are rescanned
//! line by line with the parser's [`LineScanner`] and emitted as headings are
//! seen. Both paths share the act and chapter emitters, so the same input
//! yields the same command sequence either way.

use crate::book_model::{
    act_number, seal_content, BookInfo, DocumentTree, Line, LineScanner, Manuscript,
    StructureError,
};
use crate::config::RenderConfig;
use crate::error::BookError;
use crate::images::{first_decodable, ImageResolver, ACT_IMAGE_BOX};
use crate::markup::{self, escape_string, escape_text};
use crate::render::RenderTarget;
use crate::typography;
use std::path::PathBuf;

/// Title of the table of contents
pub const TOC_TITLE: &str = "Inhaltsverzeichnis";

/// Issues render commands for a manuscript
pub struct Assembler<'a> {
    config: &'a RenderConfig,
    images: &'a ImageResolver,
}

impl<'a> Assembler<'a> {
    pub fn new(config: &'a RenderConfig, images: &'a ImageResolver) -> Self {
        Self { config, images }
    }

    /// Emit the whole book into `target`
    ///
    /// Fails only when the render target fails or a flat stream turns out to
    /// be malformed.
    pub fn assemble(
        &self,
        manuscript: &Manuscript,
        target: &mut dyn RenderTarget,
    ) -> Result<(), BookError> {
        match manuscript {
            Manuscript::Structured(tree) => {
                log::info!("Assembling {} acts from the document tree", tree.acts.len());
                self.emit_prologue(&tree.info, target)?;
                self.assemble_tree(tree, target)
            }
            Manuscript::Flat { info, stream } => {
                log::info!("Assembling directly from the markdown stream");
                self.emit_prologue(info, target)?;
                self.assemble_stream(info, stream, target)
            }
        }
    }

    fn assemble_tree(
        &self,
        tree: &DocumentTree,
        target: &mut dyn RenderTarget,
    ) -> Result<(), BookError> {
        for (index, act) in tree.acts.iter().enumerate() {
            self.emit_act(&tree.info, &act.title, index as u32 + 1, target)?;
            for chapter in &act.chapters {
                self.emit_chapter(&chapter.title, &chapter.content, target)?;
            }
        }
        Ok(())
    }

    fn assemble_stream(
        &self,
        info: &BookInfo,
        stream: &str,
        target: &mut dyn RenderTarget,
    ) -> Result<(), BookError> {
        let mut act_position = 0u32;
        let mut chapter: Option<&str> = None;
        let mut buffer = String::new();

        for (line_number, line) in LineScanner::new(stream) {
            match line {
                Line::Title(_) | Line::Author(_) => {}
                Line::Act(title) => {
                    if let Some(open) = chapter.take() {
                        self.emit_chapter(open, &seal_content(&buffer), target)?;
                    }
                    buffer.clear();
                    act_position += 1;
                    self.emit_act(info, title, act_position, target)?;
                }
                Line::Chapter(title) => {
                    if let Some(open) = chapter.take() {
                        self.emit_chapter(open, &seal_content(&buffer), target)?;
                    }
                    buffer.clear();
                    if act_position == 0 {
                        return Err(StructureError::ChapterWithoutAct {
                            chapter: title.to_string(),
                            line: line_number,
                        }
                        .into());
                    }
                    chapter = Some(title);
                }
                Line::Body(text) => {
                    if chapter.is_some() {
                        buffer.push_str(text);
                        buffer.push('\n');
                    }
                }
            }
        }

        if let Some(open) = chapter {
            self.emit_chapter(open, &seal_content(&buffer), target)?;
        }
        Ok(())
    }

    /// Document info, cover, title page and table of contents
    fn emit_prologue(&self, info: &BookInfo, target: &mut dyn RenderTarget) -> Result<(), BookError> {
        target.set_document_info(&info.title, &info.author)?;

        if let Some(cover) = self.cover_markup(info) {
            target.add_page()?;
            target.write_markup(&cover)?;
        }

        target.add_page()?;
        target.write_markup(&title_page_markup(info))?;

        if self.config.auto_toc {
            target.add_page()?;
            target.reserve_toc(TOC_TITLE)?;
        }
        Ok(())
    }

    fn cover_markup(&self, info: &BookInfo) -> Option<String> {
        if info.cover_image.is_empty() {
            return None;
        }

        let declared = PathBuf::from(&info.cover_image);
        let candidates = vec![declared.clone(), self.images.base_dir().join(&declared)];
        match first_decodable(candidates) {
            Some(cover) => Some(format!(
                "#align(center + horizon)[#image(\"{}\", width: 100%, height: 100%, fit: \"contain\")]",
                escape_string(&cover.path.to_string_lossy())
            )),
            None => {
                log::warn!("Cover image not found: {}", info.cover_image);
                None
            }
        }
    }

    /// Act page: bookmark, title and optional act image
    fn emit_act(
        &self,
        info: &BookInfo,
        heading: &str,
        position: u32,
        target: &mut dyn RenderTarget,
    ) -> Result<(), BookError> {
        target.add_page()?;

        let number = act_number(heading, position);
        let display = info.display_act_title(heading, number);
        log::debug!("Act {}: {}", number, display);
        target.bookmark(&display, 0)?;

        let mut markup = format!(
            "#v(4em)\n#align(center)[#text(size: 26pt, weight: \"bold\")[{}]]\n",
            escape_text(&display)
        );
        if let Some(image) = self.images.find_act_image(number) {
            markup.push_str(&format!(
                "#v(2cm)\n#align(center)[{}]\n",
                image.typst_call(ACT_IMAGE_BOX)
            ));
        }
        target.write_markup(&markup)?;
        Ok(())
    }

    /// Chapter page: bookmark, heading and converted body
    fn emit_chapter(
        &self,
        title: &str,
        content: &str,
        target: &mut dyn RenderTarget,
    ) -> Result<(), BookError> {
        target.add_page()?;
        target.bookmark(title, 1)?;

        let body = markup::to_typst(content);
        let body = typography::improve(&body);
        let body = self.images.rewrite_inline_images(&body);

        target.write_markup(&format!(
            "#text(size: 18pt, weight: \"bold\")[{}]\n#v(1em)\n",
            escape_text(title)
        ))?;
        target.write_markup(&body)?;
        Ok(())
    }
}

fn title_page_markup(info: &BookInfo) -> String {
    let mut markup = format!(
        "#v(30%)\n#align(center)[#text(size: 24pt, weight: \"bold\")[{}]]\n",
        escape_text(&info.title)
    );
    if !info.author.is_empty() {
        markup.push_str(&format!(
            "#v(2cm)\n#align(center)[#text(size: 14pt)[{}]]\n",
            escape_text(&info.author)
        ));
    }
    markup
}
