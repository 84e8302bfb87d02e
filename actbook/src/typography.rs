//! Punctuation substitutions for chapter text
//!
//! Runs on Typst markup, so function calls with their string arguments and
//! raw text are left alone; only the text between them is rewritten.
//! Content blocks of calls are text again.

use crate::markup::verbatim_spans;
use regex::Regex;
use std::sync::OnceLock;

fn spaced_hyphen() -> &'static Regex {
    static SPACED_HYPHEN: OnceLock<Regex> = OnceLock::new();
    SPACED_HYPHEN.get_or_init(|| Regex::new(r"(\s)-(\s)").expect("valid dash pattern"))
}

fn list_marker() -> &'static Regex {
    static LIST_MARKER: OnceLock<Regex> = OnceLock::new();
    LIST_MARKER.get_or_init(|| Regex::new(r"^\s*- ").expect("valid list marker pattern"))
}

/// Apply German typographic punctuation to markup
///
/// - `"text"` becomes `„text“`; quotes pair up across calls in between, and
///   an unpaired last quote is kept
/// - a hyphen between whitespace becomes an en dash, except a list marker
/// - `'` becomes `´`
pub fn improve(markup: &str) -> String {
    let spans = verbatim_spans(markup);

    let protected_quotes: usize = spans
        .iter()
        .map(|(_, span)| markup[span.clone()].matches('"').count())
        .sum();
    let text_quotes = markup.matches('"').count() - protected_quotes;
    let mut quotes = QuotePairs {
        remaining: text_quotes - text_quotes % 2,
        open: true,
    };

    let mut result = String::with_capacity(markup.len());
    let mut last = 0;
    for (_, span) in &spans {
        let text = &markup[last..span.start];
        result.push_str(&improve_text(text, starts_line(markup, last), &mut quotes));
        result.push_str(&markup[span.clone()]);
        last = span.end;
    }
    result.push_str(&improve_text(&markup[last..], starts_line(markup, last), &mut quotes));
    result
}

fn starts_line(markup: &str, at: usize) -> bool {
    at == 0 || markup[..at].ends_with('\n')
}

/// Alternating opening and closing quotes for the paired straight quotes
struct QuotePairs {
    remaining: usize,
    open: bool,
}

impl QuotePairs {
    fn replace(&mut self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        for c in text.chars() {
            if c == '"' && self.remaining > 0 {
                result.push(if self.open { '„' } else { '“' });
                self.open = !self.open;
                self.remaining -= 1;
            } else {
                result.push(c);
            }
        }
        result
    }
}

fn improve_text(text: &str, starts_at_line_start: bool, quotes: &mut QuotePairs) -> String {
    if text.is_empty() {
        return String::new();
    }

    let quoted = quotes.replace(text);

    let dashed = quoted
        .split('\n')
        .enumerate()
        .map(|(index, line)| {
            let marker_len = if index > 0 || starts_at_line_start {
                list_marker().find(line).map(|m| m.end()).unwrap_or(0)
            } else {
                0
            };
            let (marker, rest) = line.split_at(marker_len);
            format!("{}{}", marker, spaced_hyphen().replace_all(rest, "$1–$2"))
        })
        .collect::<Vec<_>>()
        .join("\n");

    dashed.replace('\'', "´")
}
