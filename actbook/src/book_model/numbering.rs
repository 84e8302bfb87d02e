//! Numeric prefixes in act titles, act directories and chapter files

use regex::Regex;
use std::sync::OnceLock;

static TITLE_NUMBER: OnceLock<Regex> = OnceLock::new();
static ACT_DIRECTORY: OnceLock<Regex> = OnceLock::new();
static CHAPTER_FILE: OnceLock<Regex> = OnceLock::new();

fn title_number() -> &'static Regex {
    TITLE_NUMBER.get_or_init(|| Regex::new(r"(\d+)\.").expect("valid title number pattern"))
}

fn act_directory() -> &'static Regex {
    ACT_DIRECTORY.get_or_init(|| Regex::new(r"(\d+)\. Akt$").expect("valid act directory pattern"))
}

fn chapter_file() -> &'static Regex {
    CHAPTER_FILE.get_or_init(|| Regex::new(r"(\d+)\. Kapitel").expect("valid chapter file pattern"))
}

fn first_capture(regex: &Regex, text: &str) -> Option<u32> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// Extract the act number from a heading such as `"2. Akt"`
///
/// The first integer followed by a dot wins, wherever it appears in the title.
pub fn title_number_of(title: &str) -> Option<u32> {
    first_capture(title_number(), title)
}

/// Extract `N` from a directory named `"N. Akt"`
///
/// Returns `None` for names that do not follow the convention; such
/// directories are not acts.
pub fn act_directory_number(name: &str) -> Option<u32> {
    first_capture(act_directory(), name)
}

/// Extract `N` from a chapter file named `"N. Kapitel ..."`
pub fn chapter_file_number(name: &str) -> Option<u32> {
    first_capture(chapter_file(), name)
}
