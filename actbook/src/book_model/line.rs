//! Line-classification grammar shared by the parser and the fallback assembler

/// Marker that introduces the author line in the front matter
pub const AUTHOR_MARKER: &str = "**Autor:** ";

/// Classification of a single manuscript line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `# Title` (book title)
    Title(&'a str),
    /// `**Autor:** Name`, only recognised until an author has been found
    Author(&'a str),
    /// `## Act` heading
    Act(&'a str),
    /// `### Chapter` heading
    Chapter(&'a str),
    /// Anything else, verbatim
    Body(&'a str),
}

/// Iterator over classified lines with 1-based line numbers
///
/// The scanner is stateful: once a non-empty author has been yielded, later
/// author lines are reported as [`Line::Body`].
pub struct LineScanner<'a> {
    lines: std::iter::Enumerate<std::str::Split<'a, char>>,
    author_found: bool,
}

impl<'a> LineScanner<'a> {
    /// Create a scanner over `text`, split on `\n`
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.split('\n').enumerate(),
            author_found: false,
        }
    }

    fn classify(&mut self, line: &'a str) -> Line<'a> {
        if let Some(title) = heading_text(line, "# ") {
            return Line::Title(title);
        }

        if !self.author_found {
            if let Some(author) = heading_text(line, AUTHOR_MARKER) {
                if !author.is_empty() {
                    self.author_found = true;
                }
                return Line::Author(author);
            }
        }

        if let Some(act) = heading_text(line, "## ") {
            return Line::Act(act);
        }

        if let Some(chapter) = heading_text(line, "### ") {
            return Line::Chapter(chapter);
        }

        Line::Body(line)
    }
}

impl<'a> Iterator for LineScanner<'a> {
    type Item = (usize, Line<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let (index, line) = self.lines.next()?;
        Some((index + 1, self.classify(line)))
    }
}

/// Strip `prefix` and return the trimmed remainder, if anything follows it
fn heading_text<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
        .map(str::trim)
}
