//! Progress events emitted while loading mappings and walking documents.
//!
//! The core never prints. It reports through a [`ProgressSink`], and the
//! command layer decides whether events become log records, a report, or
//! nothing at all.

use std::fmt;

use crate::types::Counts;

/// Where a paragraph sits in the document, 1-based throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A top-level body paragraph.
    Body {
        /// Position among body paragraphs.
        paragraph: usize,
    },
    /// A paragraph inside a table cell.
    Cell {
        /// Position of the cell within its row.
        cell: usize,
        /// Position of the paragraph within the cell.
        paragraph: usize,
        /// Position of the row within the table.
        row: usize,
        /// Table number in visiting order, nested tables included.
        table: usize,
    },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match *self {
            Location::Body { paragraph } => write!(f, "paragraph {paragraph}"),
            Location::Cell { cell, paragraph, row, table } => {
                write!(f, "table {table}, row {row}, cell {cell}, paragraph {paragraph}")
            },
        };
    }
}

/// One structured progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<'a> {
    /// A paragraph containing at least one code was rewritten.
    ParagraphProcessed {
        /// Tokens found and linked in this paragraph.
        counts: Counts,
        /// Paragraph position.
        location: Location,
    },
    /// A spreadsheet row produced a mapping entry.
    RowLoaded {
        /// Cleaned code.
        code: &'a str,
        /// Spreadsheet row number (header is row 1).
        row: usize,
    },
    /// The walker started on a table.
    TableEntered {
        /// Nesting depth, 0 for top-level tables.
        depth: usize,
        /// Table number in visiting order.
        index: usize,
    },
    /// A code token was matched in a paragraph.
    TokenMatched {
        /// Code without brackets.
        code: &'a str,
        /// Whether the token became a hyperlink.
        linked: bool,
        /// Paragraph position.
        location: Location,
    },
}

/// Receiver for progress events.
pub trait ProgressSink {
    /// Handle one event. Must not fail; sinks swallow their own errors.
    fn event(&mut self, event: &Progress<'_>);
}

/// Sink that discards everything.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[cfg(test)]
impl ProgressSink for NullSink {
    fn event(&mut self, _event: &Progress<'_>) {}
}

/// Default sink: forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&mut self, event: &Progress<'_>) {
        match *event {
            Progress::ParagraphProcessed { counts, location } => {
                tracing::debug!(%location, found = counts.found, linked = counts.linked, "paragraph processed");
            },
            Progress::RowLoaded { code, row } => tracing::trace!(row, code, "row loaded"),
            Progress::TableEntered { depth, index } => tracing::info!(table = index, depth, "processing table"),
            Progress::TokenMatched { code, linked, location } => {
                if !linked {
                    tracing::debug!(%location, code, "code has no link");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_render_for_humans() {
        assert_eq!(Location::Body { paragraph: 3 }.to_string(), "paragraph 3");
        let cell = Location::Cell { cell: 2, paragraph: 1, row: 4, table: 1 };
        assert_eq!(cell.to_string(), "table 1, row 4, cell 2, paragraph 1");
    }
}
