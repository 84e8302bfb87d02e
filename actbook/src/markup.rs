//! Markdown to Typst markup conversion
//!
//! Chapter bodies are converted event by event with pulldown-cmark. Container
//! elements (list items, block quotes, headings, table cells, image alt text)
//! collect their content in a buffer of their own and are written to the
//! enclosing buffer once they end, so nested content can be indented or
//! wrapped as a whole.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::OnceLock;

/// Convert a markdown fragment to Typst markup
pub fn to_typst(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SUPERSCRIPT
        | Options::ENABLE_SUBSCRIPT;

    let mut writer = TypstWriter::new();
    for event in Parser::new_ext(markdown, options) {
        writer.process_event(event);
    }
    writer.finish()
}

/// Numbering state of an open list
struct ListState {
    /// Next number for ordered lists, `None` for bullet lists
    next_number: Option<u64>,
}

/// Open fenced or indented code block
struct CodeBlock {
    language: String,
    code: String,
}

/// Event sink producing Typst markup
struct TypstWriter {
    /// Output of the top level
    root: String,

    /// Buffers of open container elements, innermost last
    stack: Vec<String>,

    lists: Vec<ListState>,

    code_block: Option<CodeBlock>,

    /// Depth of open image tags; text inside is alt text
    image_depth: usize,

    /// Destination of each open image
    image_urls: Vec<String>,

    table_columns: usize,
    in_table_head: bool,
}

impl TypstWriter {
    fn new() -> Self {
        Self {
            root: String::new(),
            stack: Vec::new(),
            lists: Vec::new(),
            code_block: None,
            image_depth: 0,
            image_urls: Vec::new(),
            table_columns: 0,
            in_table_head: false,
        }
    }

    fn out(&mut self) -> &mut String {
        match self.stack.last_mut() {
            Some(buffer) => buffer,
            None => &mut self.root,
        }
    }

    fn push_buffer(&mut self) {
        self.stack.push(String::new());
    }

    fn pop_buffer(&mut self) -> String {
        self.stack.pop().unwrap_or_default()
    }

    fn write(&mut self, text: &str) {
        self.out().push_str(text);
    }

    /// Make sure the next output starts on a fresh line
    fn ensure_line_start(&mut self) {
        let out = self.out();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }

    fn process_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag_end) => self.end_tag(tag_end),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.inline_code(&code),
            Event::SoftBreak => self.write_plain(" "),
            Event::HardBreak => self.write_plain("\\\n"),
            Event::Rule => {
                self.ensure_line_start();
                self.write("#line(length: 100%)\n\n");
            }
            Event::TaskListMarker(checked) => {
                self.write(if checked { "\\[x\\] " } else { "\\[ \\] " });
            }
            Event::Html(_) | Event::InlineHtml(_) => {}
            Event::FootnoteReference(_) => {}
            Event::InlineMath(math) | Event::DisplayMath(math) => self.text(&math),
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.ensure_line_start(),
            Tag::Heading { .. } | Tag::BlockQuote(_) | Tag::Item | Tag::TableCell => {
                self.push_buffer()
            }
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code_block = Some(CodeBlock {
                    language,
                    code: String::new(),
                });
            }
            Tag::List(start) => {
                self.ensure_line_start();
                self.lists.push(ListState { next_number: start });
            }
            Tag::Table(alignments) => {
                self.ensure_line_start();
                self.table_columns = alignments.len();
                self.push_buffer();
            }
            Tag::TableHead => self.in_table_head = true,
            Tag::Emphasis => self.write("#emph["),
            Tag::Strong => self.write("#strong["),
            Tag::Strikethrough => self.write("#strike["),
            Tag::Superscript => self.write("#super["),
            Tag::Subscript => self.write("#sub["),
            Tag::Link { dest_url, .. } => {
                let call = format!("#link(\"{}\")[", escape_string(&dest_url));
                self.write(&call);
            }
            Tag::Image { dest_url, .. } => {
                self.image_depth += 1;
                self.image_urls.push(dest_url.to_string());
                self.push_buffer();
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag_end: TagEnd) {
        match tag_end {
            TagEnd::Paragraph => self.write("\n\n"),
            TagEnd::Heading(level) => {
                let content = self.pop_buffer();
                self.ensure_line_start();
                let heading = format!(
                    "#heading(level: {}, outlined: false, bookmarked: false)[{}]\n\n",
                    heading_depth(level),
                    content.trim()
                );
                self.write(&heading);
            }
            TagEnd::BlockQuote(_) => {
                let content = self.pop_buffer();
                self.ensure_line_start();
                let quote = format!("#quote(block: true)[{}]\n\n", content.trim());
                self.write(&quote);
            }
            TagEnd::CodeBlock => {
                if let Some(block) = self.code_block.take() {
                    self.ensure_line_start();
                    let raw = raw_block(&block.language, &block.code);
                    self.write(&raw);
                }
            }
            TagEnd::List(_) => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.write("\n");
                }
            }
            TagEnd::Item => {
                let content = self.pop_buffer();
                let marker = match self.lists.last_mut() {
                    Some(ListState {
                        next_number: Some(n),
                    }) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "- ".to_string(),
                };
                let item = format!("{}{}\n", marker, indent_continuation(content.trim()));
                self.write(&item);
            }
            TagEnd::Table => {
                let cells = self.pop_buffer();
                let table = format!("#table(\n  columns: {},\n{})\n\n", self.table_columns, cells);
                self.write(&table);
            }
            TagEnd::TableHead => self.in_table_head = false,
            TagEnd::TableCell => {
                let content = self.pop_buffer();
                let cell = if self.in_table_head {
                    format!("  [#strong[{}]],\n", content.trim())
                } else {
                    format!("  [{}],\n", content.trim())
                };
                self.write(&cell);
            }
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Superscript
            | TagEnd::Subscript
            | TagEnd::Link => self.write("]"),
            TagEnd::Image => {
                let alt = self.pop_buffer();
                self.image_depth = self.image_depth.saturating_sub(1);
                let url = self.image_urls.pop().unwrap_or_default();
                let call = if alt.trim().is_empty() {
                    format!("#image(\"{}\")", escape_string(&url))
                } else {
                    format!(
                        "#image(\"{}\", alt: \"{}\")",
                        escape_string(&url),
                        escape_string(alt.trim())
                    )
                };
                self.write(&call);
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(block) = self.code_block.as_mut() {
            block.code.push_str(text);
        } else if self.image_depth > 0 {
            self.write(text);
        } else {
            let at_line_start = {
                let out = self.out();
                out.is_empty() || out.ends_with('\n')
            };
            let escaped = if at_line_start {
                escape_text(text)
            } else {
                escape_inline(text)
            };
            self.write(&escaped);
        }
    }

    /// Write text that needs no escaping (breaks)
    fn write_plain(&mut self, text: &str) {
        if self.image_depth > 0 {
            self.write(" ");
        } else {
            self.write(text);
        }
    }

    fn inline_code(&mut self, code: &str) {
        if self.image_depth > 0 {
            self.write(code);
        } else if code.contains('`') {
            let raw = format!("#raw(\"{}\")", escape_string(code));
            self.write(&raw);
        } else {
            let raw = format!("`{}`", code);
            self.write(&raw);
        }
    }

    fn finish(self) -> String {
        self.root.trim_end().to_string()
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    level as usize
}

/// Typst raw block with a fence longer than any backtick run in the code
fn raw_block(language: &str, code: &str) -> String {
    let longest_run = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);
    let code = code.strip_suffix('\n').unwrap_or(code);
    format!("{}{}\n{}\n{}\n\n", fence, language, code, fence)
}

/// Indent every line after the first so it continues a list item
fn indent_continuation(content: &str) -> String {
    let mut lines = content.split('\n');
    let mut result = lines.next().unwrap_or("").to_string();
    for line in lines {
        result.push('\n');
        if !line.is_empty() {
            result.push_str("  ");
            result.push_str(line);
        }
    }
    result
}

/// Escape text that starts a line of Typst markup
///
/// Besides the inline special characters, a leading `=`, `-`, `+`, `/` or
/// `N.` would start a heading, list or term and is escaped as well.
pub fn escape_text(text: &str) -> String {
    static ORDERED_MARKER: OnceLock<Regex> = OnceLock::new();
    let ordered = ORDERED_MARKER
        .get_or_init(|| Regex::new(r"^(\s*\d+)\.").expect("valid list marker pattern"));

    let escaped = escape_inline(text);
    let trimmed = escaped.trim_start();
    let indent = &escaped[..escaped.len() - trimmed.len()];

    if trimmed.starts_with(['=', '-', '+', '/']) {
        format!("{}\\{}", indent, trimmed)
    } else {
        ordered.replace(&escaped, "$1\\.").into_owned()
    }
}

/// Escape special characters of Typst markup inside a line
pub fn escape_inline(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' | '#' | '$' | '*' | '_' | '@' | '<' | '>' | '[' | ']' | '`' | '~' => {
                result.push('\\');
                result.push(c);
            }
            '/' if matches!(chars.peek(), Some('/') | Some('*')) => {
                result.push_str("\\/");
            }
            _ => result.push(c),
        }
    }
    result
}

/// Escape text for a Typst string literal
pub fn escape_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Undo [`escape_string`]
pub fn unescape_string(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Part of generated markup that text rewrites must leave alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbatim {
    /// Backtick-delimited raw text
    Raw,
    /// Function name and argument list; content blocks are not included
    Call,
}

/// Raw text and function call spans of Typst markup, in document order
///
/// Content blocks (`[...]`) of calls hold markup again and are scanned
/// recursively, so a call with content blocks yields one [`Verbatim::Call`]
/// span per code part around them.
pub fn verbatim_spans(markup: &str) -> Vec<(Verbatim, Range<usize>)> {
    let mut scanner = SpanScanner {
        bytes: markup.as_bytes(),
        pos: 0,
        spans: Vec::new(),
    };
    scanner.markup(false);
    scanner.spans
}

/// Replace the matches of `pattern` that start a function call
///
/// Matches inside raw text, string arguments or the middle of another call
/// are left as they are.
pub fn replace_calls<F>(markup: &str, pattern: &Regex, mut replace: F) -> String
where
    F: FnMut(&Captures) -> String,
{
    let call_starts: Vec<usize> = verbatim_spans(markup)
        .into_iter()
        .filter(|(kind, _)| *kind == Verbatim::Call)
        .map(|(_, span)| span.start)
        .collect();

    let mut result = String::with_capacity(markup.len());
    let mut last = 0;
    for caps in pattern.captures_iter(markup) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if call_starts.binary_search(&whole.start()).is_err() {
            continue;
        }
        result.push_str(&markup[last..whole.start()]);
        result.push_str(&replace(&caps));
        last = whole.end();
    }
    result.push_str(&markup[last..]);
    result
}

struct SpanScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    spans: Vec<(Verbatim, Range<usize>)>,
}

impl SpanScanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Scan markup; inside a content block, stop at its closing bracket
    fn markup(&mut self, in_block: bool) {
        let mut depth = 0usize;
        while let Some(byte) = self.peek() {
            match byte {
                b'\\' => self.pos = (self.pos + 2).min(self.bytes.len()),
                b'`' => self.raw(),
                b'#' if self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_alphabetic) => {
                    self.call()
                }
                b'[' => {
                    depth += 1;
                    self.pos += 1;
                }
                b']' if depth > 0 => {
                    depth -= 1;
                    self.pos += 1;
                }
                b']' if in_block => return,
                _ => self.pos += 1,
            }
        }
    }

    /// Raw text closes at the next backtick run of the same length
    fn raw(&mut self) {
        let start = self.pos;
        let fence = self.backtick_run();
        self.pos += fence;

        if fence != 2 {
            loop {
                match self.peek() {
                    None => break,
                    Some(b'`') => {
                        let run = self.backtick_run();
                        self.pos += run;
                        if run == fence {
                            break;
                        }
                    }
                    Some(_) => self.pos += 1,
                }
            }
        }
        self.spans.push((Verbatim::Raw, start..self.pos));
    }

    fn backtick_run(&self) -> usize {
        self.bytes[self.pos..]
            .iter()
            .take_while(|&&b| b == b'`')
            .count()
    }

    fn call(&mut self) {
        let mut start = self.pos;
        self.pos += 1;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
        {
            self.pos += 1;
        }
        if self.peek() != Some(b'(') {
            self.spans.push((Verbatim::Call, start..self.pos));
            return;
        }

        let mut depth = 0usize;
        while let Some(byte) = self.peek() {
            match byte {
                b'"' => self.string(),
                b'(' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    self.pos += 1;
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                b'[' => {
                    self.spans.push((Verbatim::Call, start..self.pos));
                    self.pos += 1;
                    self.markup(true);
                    self.pos = (self.pos + 1).min(self.bytes.len());
                    start = self.pos;
                }
                _ => self.pos += 1,
            }
        }
        self.spans.push((Verbatim::Call, start..self.pos));
    }

    fn string(&mut self) {
        self.pos += 1;
        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'\\' => self.pos = (self.pos + 1).min(self.bytes.len()),
                b'"' => return,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_soft_breaks() {
        // Arrange: Two paragraphs, the first spread over two lines
        let markdown = "Erste Zeile\nzweite Zeile.\n\nNeuer Absatz.";

        // Act
        let markup = to_typst(markdown);

        // Assert: Soft breaks become spaces, paragraphs stay separated
        assert_eq!(markup, "Erste Zeile zweite Zeile.\n\nNeuer Absatz.");
    }

    #[test]
    fn test_inline_formatting() {
        let markup = to_typst("Ein *kursives*, **fettes** und ~~gestrichenes~~ Wort.");
        assert_eq!(
            markup,
            "Ein #emph[kursives], #strong[fettes] und #strike[gestrichenes] Wort."
        );
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let markup = to_typst("Preis: 5 $ für #1 @ a < b > c siehe https://example.org");
        assert_eq!(
            markup,
            "Preis: 5 \\$ für \\#1 \\@ a \\< b \\> c siehe https:\\//example.org"
        );
    }

    #[test]
    fn test_line_start_markers_are_escaped() {
        assert_eq!(escape_text("= kein Titel"), "\\= kein Titel");
        assert_eq!(escape_text("+ keine Liste"), "\\+ keine Liste");
        assert_eq!(escape_text("12. Mai"), "12\\. Mai");
        assert_eq!(escape_text("Mitte = Mitte"), "Mitte = Mitte");
    }

    #[test]
    fn test_image_with_alt_text() {
        // Arrange: Image with spaces in the path
        let markdown = "![Die Karte](<1. Akt/karte 1.png>)";

        // Act
        let markup = to_typst(markdown);

        // Assert: Path and alt text are string literals
        assert_eq!(markup, "#image(\"1. Akt/karte 1.png\", alt: \"Die Karte\")");
    }

    #[test]
    fn test_image_without_alt_text() {
        assert_eq!(to_typst("![](bild.png)"), "#image(\"bild.png\")");
    }

    #[test]
    fn test_link() {
        assert_eq!(
            to_typst("[Quelle](https://example.org/a_b)"),
            "#link(\"https://example.org/a_b\")[Quelle]"
        );
    }

    #[test]
    fn test_nested_lists() {
        // Arrange: Bullet list with a nested ordered list
        let markdown = "- eins\n  1. a\n  2. b\n- zwei\n\nDanach.";

        // Act
        let markup = to_typst(markdown);

        // Assert: Nested items are indented under their parent
        assert_eq!(markup, "- eins\n  1. a\n  2. b\n- zwei\n\nDanach.");
    }

    #[test]
    fn test_ordered_list_keeps_start_number() {
        assert_eq!(to_typst("3. drei\n4. vier"), "3. drei\n4. vier");
    }

    #[test]
    fn test_task_list() {
        assert_eq!(to_typst("- [x] erledigt\n- [ ] offen"), "- \\[x\\] erledigt\n- \\[ \\] offen");
    }

    #[test]
    fn test_code_is_not_escaped() {
        let markup = to_typst("Nutze `a*b`.\n\n```rust\nlet x = \"#y\";\n```");
        assert_eq!(markup, "Nutze `a*b`.\n\n```rust\nlet x = \"#y\";\n```");
    }

    #[test]
    fn test_block_quote_and_heading() {
        let markup = to_typst("#### Szene\n\n> Ein Zitat\n\n---");
        assert_eq!(
            markup,
            "#heading(level: 4, outlined: false, bookmarked: false)[Szene]\n\n\
             #quote(block: true)[Ein Zitat]\n\n\
             #line(length: 100%)"
        );
    }

    #[test]
    fn test_table() {
        let markup = to_typst("| A | B |\n|---|---|\n| 1 | 2 |");
        assert_eq!(
            markup,
            "#table(\n  columns: 2,\n  [#strong[A]],\n  [#strong[B]],\n  [1],\n  [2],\n)"
        );
    }

    #[test]
    fn test_hard_break() {
        assert_eq!(to_typst("Zeile eins  \nZeile zwei"), "Zeile eins\\\nZeile zwei");
    }

    #[test]
    fn test_raw_html_is_skipped() {
        assert_eq!(to_typst("Text <br> mehr"), "Text  mehr");
    }

    #[test]
    fn test_string_escaping_roundtrip() {
        let raw = r#"C:\bilder\"a".png"#;
        assert_eq!(unescape_string(&escape_string(raw)), raw);
    }

    #[test]
    fn test_verbatim_spans() {
        let markup = "Text #image(\"a.png\") und `x` dann\n```\n#image(\"b.png\")\n```\n";
        let spans = verbatim_spans(markup);

        let kinds: Vec<(Verbatim, &str)> = spans
            .iter()
            .map(|(kind, span)| (*kind, &markup[span.clone()]))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (Verbatim::Call, "#image(\"a.png\")"),
                (Verbatim::Raw, "`x`"),
                (Verbatim::Raw, "```\n#image(\"b.png\")\n```"),
            ]
        );
    }

    #[test]
    fn test_content_blocks_are_scanned() {
        let markup = "#table(columns: 2, [#image(\"a.png\")], [\\#image])";
        let spans = verbatim_spans(markup);

        let image = markup.find("#image").unwrap();
        assert!(spans
            .iter()
            .any(|(kind, span)| *kind == Verbatim::Call && span.start == image));
        assert_eq!(spans[0], (Verbatim::Call, 0..19));
    }

    #[test]
    fn test_replace_calls_skips_raw_text() {
        let pattern = Regex::new(r#"#image\("([^"]*)""#).unwrap();
        let markup = "#align(center)[#image(\"a.png\")]\n````\n#image(\"b.png\") ```\n````";

        let replaced = replace_calls(markup, &pattern, |caps| format!("#image(\"x/{}\"", &caps[1]));

        assert_eq!(
            replaced,
            "#align(center)[#image(\"x/a.png\")]\n````\n#image(\"b.png\") ```\n````"
        );
    }
}
