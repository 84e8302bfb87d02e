//! Book metadata from JSON sidecar files
//!
//! A book directory may carry one sidecar next to its manuscript. The first
//! of [`SIDECAR_NAMES`] that holds a non-empty JSON object wins; unreadable or
//! malformed candidates are skipped.
//!
//! ## Layering
//!
//! Front matter is resolved per field, later layers winning:
//!
//! ```text
//! defaults (directory name, "de", today) <- parsed manuscript <- sidecar
//! ```
//!
//! Render settings in the sidecar (`format`, `font`, margins, ...) are layered
//! over the render configuration by [`crate::config::RenderConfig::merged`].

use crate::book_model::{ActTitle, BookInfo};
use crate::repository::{join_path, Repository};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sidecar file names, in lookup order
pub const SIDECAR_NAMES: [&str; 4] = ["metadata.json", "meta.json", "book.json", "config.json"];

/// Default book language
pub const DEFAULT_LANGUAGE: &str = "de";

/// Contents of a metadata sidecar; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    pub cover_image: Option<String>,
    pub format: Option<String>,
    pub font: Option<String>,
    pub font_size: Option<f64>,
    pub margin_left: Option<f64>,
    pub margin_right: Option<f64>,
    pub margin_top: Option<f64>,
    pub margin_bottom: Option<f64>,
    pub hyphenate: Option<bool>,
    /// Custom act titles
    pub acts: Option<Vec<ActTitle>>,
}

impl BookMetadata {
    /// Parse sidecar JSON
    ///
    /// Returns `None` for invalid JSON, for anything but an object, and for
    /// an empty object, so that the next candidate file is tried. Keys are
    /// read one by one: a key with an unusable value is skipped with a
    /// warning and the others are kept. Numbers and booleans may be given as
    /// strings, and act entries that do not convert are dropped individually.
    pub fn from_json(text: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Ignoring metadata sidecar with invalid JSON: {}", e);
                return None;
            }
        };

        let object = match value {
            Value::Object(object) if !object.is_empty() => object,
            _ => return None,
        };

        let mut metadata = BookMetadata::default();
        for (key, value) in &object {
            if value.is_null() {
                continue;
            }

            let accepted = match key.as_str() {
                "title" => set(&mut metadata.title, string_value(value)),
                "author" => set(&mut metadata.author, string_value(value)),
                "language" => set(&mut metadata.language, string_value(value)),
                "description" => set(&mut metadata.description, string_value(value)),
                "publisher" => set(&mut metadata.publisher, string_value(value)),
                "date" => set(&mut metadata.date, string_value(value)),
                "cover_image" => set(&mut metadata.cover_image, string_value(value)),
                "format" => set(&mut metadata.format, string_value(value)),
                "font" => set(&mut metadata.font, string_value(value)),
                "font_size" => set(&mut metadata.font_size, number_value(value)),
                "margin_left" => set(&mut metadata.margin_left, number_value(value)),
                "margin_right" => set(&mut metadata.margin_right, number_value(value)),
                "margin_top" => set(&mut metadata.margin_top, number_value(value)),
                "margin_bottom" => set(&mut metadata.margin_bottom, number_value(value)),
                "hyphenate" => set(&mut metadata.hyphenate, bool_value(value)),
                "acts" => set(&mut metadata.acts, act_titles(value)),
                _ => {
                    log::debug!("Unknown metadata key '{}'", key);
                    true
                }
            };

            if !accepted {
                log::warn!("Ignoring metadata key '{}' with unusable value {}", key, value);
            }
        }

        Some(metadata)
    }

    /// Override front matter fields that are present in this sidecar
    pub fn apply_to(&self, info: &mut BookInfo) {
        let fields = [
            (&self.title, &mut info.title),
            (&self.author, &mut info.author),
            (&self.language, &mut info.language),
            (&self.description, &mut info.description),
            (&self.publisher, &mut info.publisher),
            (&self.date, &mut info.date),
            (&self.cover_image, &mut info.cover_image),
        ];
        for (value, target) in fields {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        if let Some(acts) = &self.acts {
            info.act_titles = acts.clone();
        }
    }
}

fn set<T>(field: &mut Option<T>, value: Option<T>) -> bool {
    let accepted = value.is_some();
    if accepted {
        *field = value;
    }
    accepted
}

fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Custom act titles; entries without a usable number or title are dropped
fn act_titles(value: &Value) -> Option<Vec<ActTitle>> {
    let entries = value.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| match ActTitle::deserialize(entry) {
                Ok(act) => Some(act),
                Err(e) => {
                    log::warn!("Ignoring act title {}: {}", entry, e);
                    None
                }
            })
            .collect(),
    )
}

/// Look for a sidecar in `dir` of a repository
///
/// Lookup failures are never errors: a missing or broken sidecar is simply
/// absent.
pub fn load_sidecar(repository: &dyn Repository, dir: &str) -> Option<BookMetadata> {
    for name in SIDECAR_NAMES {
        let path = join_path(dir, name);
        match repository.download_file(&path) {
            Ok(bytes) => {
                if let Some(metadata) = BookMetadata::from_json(&String::from_utf8_lossy(&bytes)) {
                    log::info!("Loaded metadata from {}", path);
                    return Some(metadata);
                }
            }
            Err(e) => log::debug!("No metadata at {}: {}", path, e),
        }
    }
    None
}

/// Fill empty front matter fields with defaults
///
/// # Parameters
/// * `info` - Front matter as parsed from the manuscript
/// * `fallback_title` - Title used when the manuscript has none (usually the
///   book directory or repository name)
pub fn fill_defaults(info: &mut BookInfo, fallback_title: &str) {
    if info.title.is_empty() {
        info.title = fallback_title.to_string();
    }
    if info.language.is_empty() {
        info.language = DEFAULT_LANGUAGE.to_string();
    }
    if info.date.is_empty() {
        info.date = chrono::Local::now().format("%Y-%m-%d").to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::LocalRepository;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_sidecar() {
        let json = r#"{
            "title": "Chroniken",
            "author": "M. Muster",
            "format": "A5",
            "font_size": 10,
            "hyphenate": false,
            "acts": [{"number": 1, "title": "Schatten"}, {"number": 2, "title": "Licht"}]
        }"#;

        let metadata = BookMetadata::from_json(json).unwrap();

        assert_eq!(metadata.title.as_deref(), Some("Chroniken"));
        assert_eq!(metadata.font_size, Some(10.0));
        assert_eq!(metadata.hyphenate, Some(false));
        let acts = metadata.acts.unwrap();
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[1].title, "Licht");
    }

    #[test]
    fn test_invalid_or_empty_json_is_ignored() {
        assert!(BookMetadata::from_json("{not json").is_none());
        assert!(BookMetadata::from_json("{}").is_none());
        assert!(BookMetadata::from_json("[1, 2]").is_none());
    }

    #[test]
    fn test_bad_key_keeps_the_others() {
        let json = r#"{
            "title": "Chroniken",
            "author": "M. Muster",
            "font_size": "12",
            "margin_left": "breit",
            "hyphenate": 1,
            "acts": [{"number": 1, "title": "Schatten"}, {"number": 2}, {"number": "3", "title": "Licht"}]
        }"#;

        let metadata = BookMetadata::from_json(json).unwrap();

        assert_eq!(metadata.title.as_deref(), Some("Chroniken"));
        assert_eq!(metadata.author.as_deref(), Some("M. Muster"));
        assert_eq!(metadata.font_size, Some(12.0));
        assert_eq!(metadata.margin_left, None);
        assert_eq!(metadata.hyphenate, Some(true));
        let acts = metadata.acts.unwrap();
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[0].title, "Schatten");
        assert_eq!(acts[1].number, 3);
    }

    #[test]
    fn test_apply_overrides_present_fields_only() {
        let mut info = BookInfo {
            title: "Aus dem Text".to_string(),
            author: "Autorin".to_string(),
            ..BookInfo::default()
        };
        let metadata = BookMetadata {
            title: Some("Aus der Datei".to_string()),
            acts: Some(vec![ActTitle {
                number: 1,
                title: "Anfang".to_string(),
            }]),
            ..BookMetadata::default()
        };

        metadata.apply_to(&mut info);

        assert_eq!(info.title, "Aus der Datei");
        assert_eq!(info.author, "Autorin");
        assert_eq!(info.act_titles.len(), 1);
    }

    #[test]
    fn test_fill_defaults() {
        let mut info = BookInfo::default();
        fill_defaults(&mut info, "MeinBuch");

        assert_eq!(info.title, "MeinBuch");
        assert_eq!(info.language, "de");
        assert_eq!(info.date.len(), 10);
    }

    #[test]
    fn test_fill_defaults_keeps_parsed_title() {
        let mut info = BookInfo {
            title: "Geparst".to_string(),
            ..BookInfo::default()
        };
        fill_defaults(&mut info, "Verzeichnis");
        assert_eq!(info.title, "Geparst");
    }

    #[test]
    fn test_first_valid_sidecar_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("metadata.json"), "{ broken").unwrap();
        fs::write(dir.path().join("meta.json"), r#"{"title": "Meta"}"#).unwrap();
        fs::write(dir.path().join("book.json"), r#"{"title": "Book"}"#).unwrap();

        let repository = LocalRepository::new(dir.path());
        let metadata = load_sidecar(&repository, "").unwrap();

        assert_eq!(metadata.title.as_deref(), Some("Meta"));
    }

    #[test]
    fn test_missing_sidecar_is_absent() {
        let dir = TempDir::new().unwrap();
        let repository = LocalRepository::new(dir.path());
        assert!(load_sidecar(&repository, "").is_none());
        assert!(load_sidecar(&repository, "no/such/dir").is_none());
    }
}
