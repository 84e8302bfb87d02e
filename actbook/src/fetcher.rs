//! Manuscript assembly from a directory tree
//!
//! A book directory holds one `N. Akt` directory per act; each act directory
//! holds `N. Kapitel ....md` chapter files and any images they use. Act
//! images are named `AktN.png` (or `.jpg`, `.jpeg`) and live in the act
//! directory or next to the act directories.
//!
//! [`TreeFetcher`] walks such a tree through a [`Repository`], copies images
//! into the staging directory and concatenates the chapters into one flat
//! markdown stream for the parser.

use crate::book_model::{act_directory_number, chapter_file_number, BookInfo, AUTHOR_MARKER};
use crate::error::BookError;
use crate::repository::{join_path, EntryKind, RepoEntry, Repository};
use itertools::Itertools;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Extensions probed for act images, in order
const ACT_IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Extensions of images copied along with the chapters
const INLINE_IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Walks a book directory tree and produces a flat manuscript
pub struct TreeFetcher<'a> {
    repository: &'a dyn Repository,
    staging_dir: PathBuf,
}

impl<'a> TreeFetcher<'a> {
    pub fn new(repository: &'a dyn Repository, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            repository,
            staging_dir: staging_dir.into(),
        }
    }

    /// Build the manuscript for the book under `base_path`
    ///
    /// # Parameters
    /// * `base_path` - Directory holding the act directories (empty for the root)
    /// * `info` - Front matter written at the top of the stream
    ///
    /// # Returns
    /// * `Ok(String)` - Flat markdown stream
    /// * `Err(BookError)` - The base or an act directory could not be listed,
    ///   or a chapter could not be downloaded
    pub fn fetch(&self, base_path: &str, info: &BookInfo) -> Result<String, BookError> {
        fs::create_dir_all(&self.staging_dir)?;

        let mut stream = String::new();
        if !info.title.is_empty() {
            stream.push_str(&format!("# {}\n", info.title));
        }
        if !info.author.is_empty() {
            stream.push_str(&format!("{}{}\n\n", AUTHOR_MARKER, info.author));
        }

        let acts = self.act_directories(base_path)?;
        log::info!("Found {} act directories under '{}'", acts.len(), base_path);

        for (number, act) in &acts {
            self.stage_act_image(base_path, act, *number);
        }

        for (_, act) in &acts {
            stream.push_str(&format!("\n## {}\n", act.name));
            self.fetch_act(act, &mut stream)?;
        }

        Ok(stream)
    }

    /// Act directories under `base_path`, ordered by act number
    fn act_directories(&self, base_path: &str) -> Result<Vec<(u32, RepoEntry)>, BookError> {
        let entries = self
            .repository
            .list_directory(base_path)
            .map_err(|e| BookError::from_repository(base_path, e))?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Dir)
            .filter_map(|entry| act_directory_number(&entry.name).map(|n| (n, entry)))
            .sorted_by_key(|(number, _)| *number)
            .collect())
    }

    /// Copy the first act image found into the staging directory
    ///
    /// Missing images are not an error.
    fn stage_act_image(&self, base_path: &str, act: &RepoEntry, number: u32) {
        for extension in ACT_IMAGE_EXTENSIONS {
            let name = format!("Akt{}.{}", number, extension);
            let candidates = [join_path(&act.path, &name), join_path(base_path, &name)];

            for candidate in candidates {
                match self.repository.download_file(&candidate) {
                    Ok(bytes) => {
                        match write_staged(&self.staging_dir.join(&name), &bytes) {
                            Ok(()) => log::info!("Staged act image {}", candidate),
                            Err(e) => log::warn!("Could not stage {}: {}", candidate, e),
                        }
                        return;
                    }
                    Err(e) => log::debug!("No act image at {}: {}", candidate, e),
                }
            }
        }
    }

    /// Append the chapters of one act to the stream
    fn fetch_act(&self, act: &RepoEntry, stream: &mut String) -> Result<(), BookError> {
        let entries = self
            .repository
            .list_directory(&act.path)
            .map_err(|e| BookError::from_repository(&act.path, e))?;

        let files = entries.iter().filter(|entry| entry.kind == EntryKind::File);

        for image in files
            .clone()
            .filter(|entry| has_extension(entry, &INLINE_IMAGE_EXTENSIONS))
        {
            self.stage_inline_image(image);
        }

        let chapters = files
            .filter(|entry| has_extension(entry, &["md"]))
            .sorted_by_key(|entry| chapter_file_number(&entry.name).unwrap_or(0));

        for chapter in chapters {
            let bytes = self.repository.download_file(&chapter.path).map_err(|e| {
                BookError::RemoteTransfer {
                    path: chapter.path.clone(),
                    source: e,
                }
            })?;
            let content = String::from_utf8_lossy(&bytes);
            let content = rewrite_image_paths(&content, &self.staging_dir.join(&act.path));

            log::debug!("Chapter {} ({} bytes)", chapter.path, bytes.len());
            stream.push_str(&format!("### {}\n{}\n", chapter.stem(), content));
        }

        Ok(())
    }

    fn stage_inline_image(&self, image: &RepoEntry) {
        let target = self.staging_dir.join(&image.path);
        let staged = self
            .repository
            .download_file(&image.path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| write_staged(&target, &bytes).map_err(|e| e.to_string()));

        match staged {
            Ok(()) => log::debug!("Staged image {}", image.path),
            Err(e) => log::warn!("Could not stage image {}: {}", image.path, e),
        }
    }
}

fn has_extension(entry: &RepoEntry, extensions: &[&str]) -> bool {
    entry
        .extension()
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

/// Write a staged file, creating its directory and replacing an older copy
fn write_staged(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}

/// Point relative markdown image references into `dir`
///
/// References starting with `http` are left alone. Destinations containing
/// whitespace are written in angle brackets so they stay valid markdown.
pub fn rewrite_image_paths(markdown: &str, dir: &Path) -> String {
    static MARKDOWN_IMAGE: OnceLock<Regex> = OnceLock::new();
    let pattern = MARKDOWN_IMAGE.get_or_init(|| {
        Regex::new(r"!\[(.*?)\]\(([^)]+)\)").expect("valid markdown image pattern")
    });

    pattern
        .replace_all(markdown, |caps: &Captures| {
            let (path, title) = split_destination(caps[2].trim());
            if path.starts_with("http") {
                return caps[0].to_string();
            }

            let rewritten = dir.join(path).to_string_lossy().into_owned();
            let destination = if rewritten.contains(char::is_whitespace) {
                format!("<{}>", rewritten)
            } else {
                rewritten
            };
            let title = if title.is_empty() {
                String::new()
            } else {
                format!(" {}", title)
            };

            format!("![{}]({}{})", &caps[1], destination, title)
        })
        .into_owned()
}

/// Split a link destination into path and optional title
fn split_destination(destination: &str) -> (&str, &str) {
    if let Some(inner) = destination.strip_prefix('<') {
        if let Some(end) = inner.find('>') {
            return (&inner[..end], inner[end + 1..].trim());
        }
    }
    match destination.find(char::is_whitespace) {
        Some(index) => (&destination[..index], destination[index..].trim()),
        None => (destination, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_model::parse;
    use crate::repository::RepositoryError;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    /// Repository backed by a map of file paths, listed in lexical order
    #[derive(Default)]
    struct MemoryRepository {
        files: BTreeMap<String, Vec<u8>>,
        broken: BTreeSet<String>,
    }

    impl MemoryRepository {
        fn with(mut self, path: &str, content: &[u8]) -> Self {
            self.files.insert(path.to_string(), content.to_vec());
            self
        }

        fn broken(mut self, path: &str) -> Self {
            self.broken.insert(path.to_string());
            self.with(path, b"")
        }
    }

    impl Repository for MemoryRepository {
        fn list_directory(&self, path: &str) -> Result<Vec<RepoEntry>, RepositoryError> {
            let prefix = if path.is_empty() {
                String::new()
            } else {
                format!("{}/", path)
            };

            let mut entries: Vec<RepoEntry> = Vec::new();
            for file in self.files.keys() {
                let Some(rest) = file.strip_prefix(&prefix) else {
                    continue;
                };
                let (name, kind) = match rest.split_once('/') {
                    Some((dir, _)) => (dir, EntryKind::Dir),
                    None => (rest, EntryKind::File),
                };
                if !entries.iter().any(|e| e.name == name) {
                    entries.push(RepoEntry {
                        name: name.to_string(),
                        path: join_path(path, name),
                        kind,
                    });
                }
            }

            if entries.is_empty() {
                Err(RepositoryError::NotFound(path.to_string()))
            } else {
                Ok(entries)
            }
        }

        fn download_file(&self, path: &str) -> Result<Vec<u8>, RepositoryError> {
            if self.broken.contains(path) {
                return Err(RepositoryError::UnexpectedResponse {
                    path: path.to_string(),
                    message: "HTTP 500".to_string(),
                });
            }
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(path.to_string()))
        }
    }

    fn book_repository() -> MemoryRepository {
        MemoryRepository::default()
            .with("Buch/meta.json", b"{}")
            .with("Buch/Akt2.jpg", b"jpg")
            .with("Buch/Anhang/1. Kapitel.md", b"Nicht Teil des Buches")
            .with("Buch/1. Akt/Akt1.png", b"png")
            .with("Buch/1. Akt/2. Kapitel.md", b"Zwei")
            .with("Buch/1. Akt/1. Kapitel.md", b"Eins")
            .with("Buch/1. Akt/notizen.txt", b"x")
            .with("Buch/10. Akt/1. Kapitel.md", b"Zehn")
            .with("Buch/2. Akt/1. Kapitel - Ende.md", b"Schluss ![Karte](karte.png)")
            .with("Buch/2. Akt/karte.png", b"png")
    }

    fn info() -> BookInfo {
        BookInfo {
            title: "Die Reise".to_string(),
            author: "A".to_string(),
            ..BookInfo::default()
        }
    }

    #[test]
    fn test_fetch_builds_ordered_stream() {
        let staging = TempDir::new().unwrap();
        let repository = book_repository();

        let stream = TreeFetcher::new(&repository, staging.path())
            .fetch("Buch", &info())
            .unwrap();

        let expected = format!(
            "# Die Reise\n**Autor:** A\n\n\
             \n## 1. Akt\n### 1. Kapitel\nEins\n### 2. Kapitel\nZwei\n\
             \n## 2. Akt\n### 1. Kapitel - Ende\nSchluss ![Karte](<{}/Buch/2. Akt/karte.png>)\n\
             \n## 10. Akt\n### 1. Kapitel\nZehn\n",
            staging.path().display()
        );
        assert_eq!(stream, expected);
    }

    #[test]
    fn test_fetched_stream_parses() {
        let staging = TempDir::new().unwrap();
        let repository = book_repository();

        let stream = TreeFetcher::new(&repository, staging.path())
            .fetch("Buch", &info())
            .unwrap();
        let tree = parse(&stream).unwrap();

        assert_eq!(tree.info.title, "Die Reise");
        let acts: Vec<&str> = tree.acts.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(acts, vec!["1. Akt", "2. Akt", "10. Akt"]);
        assert_eq!(tree.acts[0].chapters[1].content, "Zwei");
    }

    #[test]
    fn test_images_are_staged() {
        let staging = TempDir::new().unwrap();
        let repository = book_repository();

        TreeFetcher::new(&repository, staging.path())
            .fetch("Buch", &info())
            .unwrap();

        assert_eq!(fs::read(staging.path().join("Akt1.png")).unwrap(), b"png");
        assert_eq!(fs::read(staging.path().join("Akt2.jpg")).unwrap(), b"jpg");
        assert!(!staging.path().join("Akt10.png").exists());
        assert!(staging.path().join("Buch/2. Akt/karte.png").exists());
        assert!(!staging.path().join("Buch/1. Akt/notizen.txt").exists());
    }

    #[test]
    fn test_equal_chapter_numbers_keep_listing_order() {
        let staging = TempDir::new().unwrap();
        let repository = MemoryRepository::default()
            .with("1. Akt/Epilog.md", b"E")
            .with("1. Akt/Anfang.md", b"A")
            .with("1. Akt/1. Kapitel.md", b"K");

        let stream = TreeFetcher::new(&repository, staging.path())
            .fetch("", &BookInfo::default())
            .unwrap();

        let headings: Vec<&str> = stream.lines().filter(|l| l.starts_with("### ")).collect();
        assert_eq!(headings, vec!["### Anfang", "### Epilog", "### 1. Kapitel"]);
    }

    #[test]
    fn test_failed_chapter_download_aborts() {
        let staging = TempDir::new().unwrap();
        let repository = book_repository().broken("Buch/1. Akt/2. Kapitel.md");

        let result = TreeFetcher::new(&repository, staging.path()).fetch("Buch", &info());

        match result {
            Err(BookError::RemoteTransfer { path, .. }) => {
                assert_eq!(path, "Buch/1. Akt/2. Kapitel.md")
            }
            other => panic!("expected transfer error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_base_path() {
        let staging = TempDir::new().unwrap();
        let repository = book_repository();

        let result = TreeFetcher::new(&repository, staging.path()).fetch("Fehlt", &info());

        assert!(matches!(result, Err(BookError::InputNotFound(path)) if path == "Fehlt"));
    }

    #[test]
    fn test_rewrite_image_paths() {
        let dir = Path::new("/tmp/staging/Buch/1. Akt");
        let markdown = "![Karte](karte.png) ![Web](https://example.org/a.png) ![T](<b c.png> \"Titel\")";

        let rewritten = rewrite_image_paths(markdown, dir);

        assert_eq!(
            rewritten,
            "![Karte](</tmp/staging/Buch/1. Akt/karte.png>) ![Web](https://example.org/a.png) \
             ![T](</tmp/staging/Buch/1. Akt/b c.png> \"Titel\")"
        );
    }

    #[test]
    fn test_rewrite_without_whitespace_needs_no_brackets() {
        let rewritten = rewrite_image_paths("![](bild.png)", Path::new("/s/akt"));
        assert_eq!(rewritten, "![](/s/akt/bild.png)");
    }
}
