/// Core domain types for evlink mappings, tokens, and paragraph segments.
use std::collections::HashMap;
use std::ops::AddAssign;

/// Code-to-link lookup table built once from the spreadsheet.
/// Keys are codes without brackets, compared case-sensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMapping {
    /// Entries keyed by bare code (e.g. `1.2-001`).
    entries: HashMap<String, MappingEntry>,
}

impl CodeMapping {
    /// Look up the entry for a bare code.
    pub fn get(&self, code: &str) -> Option<&MappingEntry> {
        return self.entries.get(code);
    }

    /// Insert or replace the entry for a code. Later inserts win.
    pub fn insert(&mut self, code: String, entry: MappingEntry) {
        self.entries.insert(code, entry);
        return;
    }

    /// True when no code has been loaded.
    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        return self.entries.len();
    }
}

impl FromIterator<(String, MappingEntry)> for CodeMapping {
    fn from_iter<I: IntoIterator<Item = (String, MappingEntry)>>(iter: I) -> Self {
        return Self { entries: iter.into_iter().collect() };
    }
}

/// Target of a code: the hyperlink URL and an optional screen tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Text shown when hovering the link, from the summary column.
    pub tooltip: Option<String>,
    /// External hyperlink target.
    pub url: String,
}

#[cfg(test)]
impl MappingEntry {
    /// Entry without a tooltip.
    pub fn link(url: impl Into<String>) -> Self {
        return Self { tooltip: None, url: url.into() };
    }
}

/// Running totals of matched and hyperlinked tokens. `found >= linked` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Counts {
    /// Tokens matched by the code pattern, resolved or not.
    pub found: usize,
    /// Tokens turned into hyperlinks.
    pub linked: usize,
}

impl Counts {
    /// Number of matched tokens left as plain text.
    pub const fn unlinked(self) -> usize {
        return self.found.saturating_sub(self.linked);
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.found = self.found.saturating_add(rhs.found);
        self.linked = self.linked.saturating_add(rhs.linked);
    }
}

/// Font attributes carried from a paragraph's first run onto rebuilt plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStyle {
    /// Font family, from `w:rFonts/@w:ascii`.
    pub font_name: Option<String>,
    /// Font size in half-points, from `w:sz/@w:val`.
    pub font_size: Option<String>,
}

impl RunStyle {
    /// True when neither attribute is set.
    pub const fn is_empty(&self) -> bool {
        return self.font_name.is_none() && self.font_size.is_none();
    }
}

/// One unit of rebuilt paragraph content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A hyperlink wrapping the original bracketed token.
    Hyperlink {
        /// Visible text, identical to the token's raw text.
        display: String,
        /// Screen tip, if the mapping carries one.
        tooltip: Option<String>,
        /// External target.
        url: String,
    },
    /// Text copied verbatim from the original paragraph.
    Plain(String),
}

impl Segment {
    /// The visible text of this segment.
    pub fn display_text(&self) -> &str {
        return match self {
            Segment::Hyperlink { display, .. } => display,
            Segment::Plain(text) => text,
        };
    }
}

/// A bracketed code matched in flattened paragraph text.
/// Offsets are byte positions into the text that was scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Code without brackets, e.g. `1.2-001`.
    pub code: String,
    /// Byte offset one past the closing bracket.
    pub end: usize,
    /// Matched text including brackets, e.g. `[1.2-001]`.
    pub raw: String,
    /// Byte offset of the opening bracket.
    pub start: usize,
}
