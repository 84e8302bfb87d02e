//! Book hierarchy: acts containing chapters

use super::numbering::title_number_of;
use serde::{Deserialize, Deserializer, Serialize};

/// Custom display title for an act, keyed by act number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActTitle {
    /// Act number, matched against the number parsed from the act heading
    #[serde(deserialize_with = "number_or_string")]
    pub number: u32,

    /// Title shown after `"{number}. Akt: "`
    pub title: String,
}

/// Accept `2` as well as `"2"` for act numbers in hand-written sidecars
fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Front matter of a book
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookInfo {
    pub title: String,
    pub author: String,
    pub language: String,
    pub description: String,
    pub publisher: String,
    pub date: String,
    /// Path to a cover image; empty when there is no cover
    pub cover_image: String,
    /// Custom act titles from metadata, independent of the parsed act headings
    pub act_titles: Vec<ActTitle>,
}

impl BookInfo {
    /// Title to display for an act with the given heading and number
    ///
    /// A matching custom title yields `"{n}. Akt: {title}"`; otherwise the raw
    /// heading is returned unchanged.
    pub fn display_act_title(&self, heading: &str, number: u32) -> String {
        self.act_titles
            .iter()
            .find(|custom| custom.number == number)
            .map(|custom| format!("{}. Akt: {}", number, custom.title))
            .unwrap_or_else(|| heading.to_string())
    }
}

/// A leaf content unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// Raw markdown body, trimmed once the chapter is sealed
    pub content: String,
}

/// A top-level section of the book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Act {
    /// Raw heading text, e.g. `"1. Akt"`
    pub title: String,
    /// Chapters in document order, unique by title
    pub chapters: Vec<Chapter>,
}

impl Act {
    /// Create an act with no chapters
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            chapters: Vec::new(),
        }
    }

    /// Number of this act: the integer in its title, else its 1-based position
    pub fn numeric_index(&self, position: u32) -> u32 {
        act_number(&self.title, position)
    }

    /// Insert a chapter, replacing an earlier chapter with the same title in place
    pub(crate) fn upsert_chapter(&mut self, chapter: Chapter) {
        match self.chapters.iter_mut().find(|c| c.title == chapter.title) {
            Some(existing) => {
                log::warn!(
                    "Duplicate chapter '{}' in act '{}'; later content replaces earlier",
                    chapter.title,
                    self.title
                );
                *existing = chapter;
            }
            None => self.chapters.push(chapter),
        }
    }
}

/// Number of an act with the given heading at the given 1-based position
pub fn act_number(heading: &str, position: u32) -> u32 {
    title_number_of(heading).unwrap_or(position)
}

/// The parsed book
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTree {
    pub info: BookInfo,
    /// Acts in document order, unique by title
    pub acts: Vec<Act>,
}

impl DocumentTree {
    /// Whether any act has at least one chapter
    pub fn has_chapters(&self) -> bool {
        self.acts.iter().any(|act| !act.chapters.is_empty())
    }

    /// Total number of chapters across all acts
    pub fn chapter_count(&self) -> usize {
        self.acts.iter().map(|act| act.chapters.len()).sum()
    }

    /// Look up an act by its heading
    pub fn act(&self, title: &str) -> Option<&Act> {
        self.acts.iter().find(|act| act.title == title)
    }

    /// Open an act, replacing an earlier act with the same title in place
    ///
    /// Returns the index of the (re)opened act.
    pub(crate) fn open_act(&mut self, title: &str) -> usize {
        if let Some(index) = self.acts.iter().position(|act| act.title == title) {
            log::warn!("Duplicate act '{}'; earlier chapters are discarded", title);
            self.acts[index] = Act::new(title);
            index
        } else {
            self.acts.push(Act::new(title));
            self.acts.len() - 1
        }
    }
}
