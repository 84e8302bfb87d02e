//! Typst-based PDF render target
//!
//! Render commands are accumulated as Typst source. [`TypstTarget::finish`]
//! compiles the source with the Typst compiler and writes the PDF.
//! Bookmarks are hidden headings, so they show up both in the PDF outline and
//! in the table of contents.

use crate::config::RenderConfig;
use crate::markup::{escape_string, escape_text, replace_calls, unescape_string};
use crate::render::{RenderError, RenderTarget};
use chrono::Datelike;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use typst::diag::{FileError, FileResult, SourceDiagnostic};
use typst::foundations::{Bytes, Datetime};
use typst::syntax::{FileId, Source, VirtualPath};
use typst::text::{Font, FontBook};
use typst::utils::LazyHash;
use typst::{Library, World};
use typst_kit::fonts::{FontSearcher, FontSlot};

/// Fonts tried after the configured one
const FALLBACK_FONTS: [&str; 2] = ["DejaVu Serif", "Libertinus Serif"];

/// Static library instance (created once, reused)
static LIBRARY: OnceLock<LazyHash<Library>> = OnceLock::new();

fn get_library() -> &'static LazyHash<Library> {
    LIBRARY.get_or_init(|| LazyHash::new(Library::builder().build()))
}

fn image_call() -> &'static Regex {
    static IMAGE_CALL: OnceLock<Regex> = OnceLock::new();
    IMAGE_CALL.get_or_init(|| {
        Regex::new(r#"#image\("((?:[^"\\]|\\.)*)"(?:"(?:[^"\\]|\\.)*"|[^()"])*\)"#)
            .expect("valid image call pattern")
    })
}

/// Render target producing a PDF through Typst
pub struct TypstTarget {
    /// Page and text setup derived from the render configuration
    preamble: String,

    /// `#set document(...)` rule, once document info is known
    document_info: String,

    /// Accumulated document body
    body: String,

    /// Image files referenced by the body
    files: HashMap<FileId, Bytes>,

    /// Extra directories searched for fonts
    font_dirs: Vec<PathBuf>,
}

impl TypstTarget {
    /// Create a target for the given configuration
    ///
    /// # Parameters
    /// * `config` - Final render configuration
    /// * `language` - Book language code (e.g. `de`), used for hyphenation
    /// * `font_dirs` - Additional font directories besides the system fonts
    pub fn new(config: &RenderConfig, language: &str, font_dirs: Vec<PathBuf>) -> Self {
        Self {
            preamble: generate_preamble(config, language),
            document_info: String::new(),
            body: String::new(),
            files: HashMap::new(),
            font_dirs,
        }
    }

    /// Complete Typst source of the document so far
    pub fn source(&self) -> String {
        format!("{}{}\n{}", self.document_info, self.preamble, self.body)
    }

    /// Load the images referenced by `markup` and replace unreadable ones
    fn register_images(&mut self, markup: &str) -> String {
        let files = &mut self.files;
        replace_calls(markup, image_call(), |caps: &Captures| {
            let declared = unescape_string(&caps[1]);
            match std::fs::read(&declared) {
                Ok(data) => {
                    let id = FileId::new(None, VirtualPath::new(&declared));
                    files.insert(id, Bytes::new(data));
                    caps[0].to_string()
                }
                Err(e) => {
                    log::warn!("Image {} could not be read: {}", declared, e);
                    format!("#emph[Bild nicht gefunden: {}]", escape_text(&declared))
                }
            }
        })
    }

    fn load_fonts(&self) -> Result<(FontBook, Vec<FontSlot>), RenderError> {
        let fonts = FontSearcher::new()
            .include_system_fonts(true)
            .search_with(&self.font_dirs);

        if fonts.fonts.is_empty() {
            return Err(RenderError::Font("No fonts could be loaded".to_string()));
        }
        log::debug!("Found {} fonts", fonts.fonts.len());

        Ok((fonts.book, fonts.fonts))
    }
}

impl RenderTarget for TypstTarget {
    fn set_document_info(&mut self, title: &str, author: &str) -> Result<(), RenderError> {
        self.document_info = format!(
            "#set document(title: \"{}\", author: \"{}\")\n",
            escape_string(title),
            escape_string(author)
        );
        Ok(())
    }

    fn add_page(&mut self) -> Result<(), RenderError> {
        self.body.push_str("#pagebreak(weak: true)\n");
        Ok(())
    }

    fn bookmark(&mut self, title: &str, level: usize) -> Result<(), RenderError> {
        self.body.push_str(&format!(
            "#place(hide(heading(level: {}, bookmarked: true, outlined: true)[{}]))\n",
            level + 1,
            escape_text(title)
        ));
        Ok(())
    }

    fn reserve_toc(&mut self, title: &str) -> Result<(), RenderError> {
        self.body.push_str(&format!(
            "#outline(title: [{}], depth: 2)\n",
            escape_text(title)
        ));
        Ok(())
    }

    fn write_markup(&mut self, markup: &str) -> Result<(), RenderError> {
        let markup = self.register_images(markup);
        self.body.push_str(&markup);
        self.body.push_str("\n\n");
        Ok(())
    }

    fn finish(&mut self, output: &Path) -> Result<(), RenderError> {
        let (book, fonts) = self.load_fonts()?;
        let world = BookWorld {
            main_source: Source::new(
                FileId::new(None, VirtualPath::new("main.typ")),
                self.source(),
            ),
            font_book: LazyHash::new(book),
            fonts,
            files: std::mem::take(&mut self.files),
        };

        let result = typst::compile(&world);
        for warning in &result.warnings {
            log::debug!("Typst warning: {}", warning.message);
        }

        let document = result.output.map_err(|errors| {
            let error_msgs: Vec<String> = errors
                .iter()
                .map(|e| format!("{}: {}", format_error_location(e, &world), e.message))
                .collect();
            RenderError::Compilation(error_msgs.join("\n"))
        })?;

        let pdf_bytes = typst_pdf::pdf(&document, &typst_pdf::PdfOptions::default())
            .map_err(|e| RenderError::Compilation(format!("PDF export failed: {:?}", e)))?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, pdf_bytes)?;

        log::info!("Wrote {}", output.display());
        Ok(())
    }
}

/// Typst page and text setup
fn generate_preamble(config: &RenderConfig, language: &str) -> String {
    let fonts = std::iter::once(config.default_font.as_str())
        .chain(FALLBACK_FONTS)
        .map(|font| format!("\"{}\"", escape_string(font)))
        .collect::<Vec<_>>()
        .join(", ");

    let lang = match language_code(language) {
        Some(code) => format!(", lang: \"{}\"", code),
        None => String::new(),
    };

    format!(
        r#"#set page(
  paper: "{paper}",
  margin: (left: {left}mm, right: {right}mm, top: {top}mm, bottom: {bottom}mm),
  header-ascent: {header}mm,
  footer-descent: {footer}mm,
  numbering: "1",
)
#set text(font: ({fonts}), size: {size}pt{lang}, hyphenate: {hyphenate})
#set par(justify: true)
#set heading(numbering: none)
#show heading: it => block(above: 1.4em, below: 0.6em, sticky: true)[#it]
"#,
        paper = escape_string(&config.paper()),
        left = config.margin_left,
        right = config.margin_right,
        top = config.margin_top,
        bottom = config.margin_bottom,
        header = config.margin_header,
        footer = config.margin_footer,
        fonts = fonts,
        size = config.default_font_size,
        lang = lang,
        hyphenate = config.hyphenate,
    )
}

/// ISO 639 code from a language tag such as `de` or `de-AT`
fn language_code(language: &str) -> Option<String> {
    let code = language
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_lowercase()) {
        Some(code)
    } else {
        None
    }
}

/// The World the Typst compiler sees: one main source, fonts and images
struct BookWorld {
    main_source: Source,
    font_book: LazyHash<FontBook>,
    fonts: Vec<FontSlot>,
    files: HashMap<FileId, Bytes>,
}

impl World for BookWorld {
    fn library(&self) -> &LazyHash<Library> {
        get_library()
    }

    fn book(&self) -> &LazyHash<FontBook> {
        &self.font_book
    }

    fn main(&self) -> FileId {
        self.main_source.id()
    }

    fn source(&self, id: FileId) -> FileResult<Source> {
        if id == self.main_source.id() {
            Ok(self.main_source.clone())
        } else {
            Err(FileError::NotFound(id.vpath().as_rootless_path().into()))
        }
    }

    fn file(&self, id: FileId) -> FileResult<Bytes> {
        self.files
            .get(&id)
            .cloned()
            .ok_or_else(|| FileError::NotFound(id.vpath().as_rooted_path().into()))
    }

    fn font(&self, index: usize) -> Option<Font> {
        self.fonts.get(index)?.get()
    }

    fn today(&self, offset: Option<i64>) -> Option<Datetime> {
        let date = match offset {
            Some(hours) => (chrono::Utc::now() + chrono::Duration::hours(hours)).date_naive(),
            None => chrono::Local::now().date_naive(),
        };
        Datetime::from_ymd(date.year(), date.month() as u8, date.day() as u8)
    }
}

/// Format error location from a Typst source diagnostic
fn format_error_location(error: &SourceDiagnostic, world: &BookWorld) -> String {
    let Some(id) = error.span.id() else {
        return "unknown".to_string();
    };

    let Ok(source) = World::source(world, id) else {
        return id.vpath().as_rootless_path().display().to_string();
    };

    let Some(range) = source.range(error.span) else {
        return id.vpath().as_rootless_path().display().to_string();
    };

    let line = source.byte_to_line(range.start).unwrap_or(0) + 1;
    let col = source.byte_to_column(range.start).unwrap_or(0) + 1;
    format!(
        "{}:{}:{}",
        id.vpath().as_rootless_path().display(),
        line,
        col
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target() -> TypstTarget {
        TypstTarget::new(&RenderConfig::default(), "de", Vec::new())
    }

    #[test]
    fn test_preamble_follows_config() {
        let config = RenderConfig {
            format: "A5".to_string(),
            margin_left: 15.0,
            default_font: "Garamond".to_string(),
            default_font_size: 10.5,
            hyphenate: false,
            ..RenderConfig::default()
        };

        let preamble = generate_preamble(&config, "de-AT");

        assert!(preamble.contains("paper: \"a5\""));
        assert!(preamble.contains("margin: (left: 15mm, right: 20mm, top: 20mm, bottom: 20mm)"));
        assert!(preamble.contains("header-ascent: 5mm"));
        assert!(preamble.contains(
            "#set text(font: (\"Garamond\", \"DejaVu Serif\", \"Libertinus Serif\"), size: 10.5pt, lang: \"de\", hyphenate: false)"
        ));
    }

    #[test]
    fn test_invalid_language_is_omitted() {
        assert_eq!(language_code("Deutsch"), None);
        assert_eq!(language_code("en_US").as_deref(), Some("en"));
        assert!(!generate_preamble(&RenderConfig::default(), "").contains("lang:"));
    }

    #[test]
    fn test_commands_build_source() {
        let mut target = target();
        target.set_document_info("Das \"Buch\"", "A").unwrap();
        target.add_page().unwrap();
        target.reserve_toc("Inhaltsverzeichnis").unwrap();
        target.bookmark("1. Akt", 0).unwrap();
        target.write_markup("Text").unwrap();

        let source = target.source();

        assert!(source.starts_with("#set document(title: \"Das \\\"Buch\\\"\", author: \"A\")\n"));
        assert!(source.contains("#pagebreak(weak: true)\n#outline(title: [Inhaltsverzeichnis], depth: 2)\n"));
        assert!(source.contains("#place(hide(heading(level: 1, bookmarked: true, outlined: true)[1\\. Akt]))\n"));
        assert!(source.ends_with("Text\n\n"));
    }

    #[test]
    fn test_readable_images_are_registered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bild.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        let declared = escape_string(&path.to_string_lossy());

        let mut target = target();
        let markup = format!("#image(\"{}\", width: 3pt, height: 3pt)", declared);
        target.write_markup(&markup).unwrap();

        assert_eq!(target.files.len(), 1);
        assert!(target.source().contains(&markup));
    }

    #[test]
    fn test_missing_images_become_placeholders() {
        let mut target = target();
        target
            .write_markup("Vor #image(\"fehlt/bild.png\", alt: \"x\") nach")
            .unwrap();

        assert!(target
            .source()
            .contains("Vor #emph[Bild nicht gefunden: fehlt/bild.png] nach"));
        assert!(target.files.is_empty());
    }

    #[test]
    fn test_image_calls_in_raw_blocks_are_kept() {
        let mut target = target();
        let markup = "```\n#image(\"fehlt/bild.png\")\n```";
        target.write_markup(markup).unwrap();

        assert!(target.source().contains(markup));
        assert!(target.files.is_empty());
    }
}
