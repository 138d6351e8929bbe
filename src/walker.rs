//! Document walker: applies the rewriter to every paragraph of a document.
//!
//! Body paragraphs are visited first, in document order. Tables follow: row
//! by row, cell by cell, the cell's paragraphs and then any nested tables,
//! depth-first.

use std::path::Path;

use crate::docx::DocxPackage;
use crate::error::Error;
use crate::events::{Location, Progress, ProgressSink};
use crate::rewriter::{self, HyperlinkRegistry};
use crate::types::{CodeMapping, Counts};
use crate::xml::Element;

/// Walk state shared across the body and every table.
struct Walker<'a> {
    /// Running totals.
    counts: Counts,
    /// Relationship registry for new hyperlinks.
    links: &'a mut dyn HyperlinkRegistry,
    /// Code lookup table.
    mapping: &'a CodeMapping,
    /// Event receiver.
    sink: &'a mut dyn ProgressSink,
    /// Tables entered so far, nested ones included.
    tables: usize,
}

impl Walker<'_> {
    /// Rewrite body paragraphs, then walk top-level tables.
    fn body(&mut self, body: &mut Element) {
        for (i, paragraph) in body.elements_mut().filter(|e| return e.name == "w:p").enumerate() {
            self.paragraph(paragraph, Location::Body { paragraph: i.saturating_add(1) });
        }
        for table in body.elements_mut().filter(|e| return e.name == "w:tbl") {
            self.table(table, 0);
        }
        return;
    }

    /// Rewrite one paragraph and report what happened.
    fn paragraph(&mut self, paragraph: &mut Element, location: Location) {
        let Some(plan) = rewriter::rewrite_paragraph(paragraph, self.mapping, &mut *self.links) else {
            return;
        };
        for outcome in &plan.outcomes {
            self.sink.event(&Progress::TokenMatched { code: &outcome.code, linked: outcome.linked, location });
        }
        self.sink.event(&Progress::ParagraphProcessed { counts: plan.counts, location });
        self.counts += plan.counts;
        return;
    }

    /// Walk one table and the tables nested in its cells.
    fn table(&mut self, table: &mut Element, depth: usize) {
        self.tables = self.tables.saturating_add(1);
        let index = self.tables;
        self.sink.event(&Progress::TableEntered { depth, index });

        for (r, row) in table.elements_mut().filter(|e| return e.name == "w:tr").enumerate() {
            for (c, cell) in row.elements_mut().filter(|e| return e.name == "w:tc").enumerate() {
                for (p, paragraph) in cell.elements_mut().filter(|e| return e.name == "w:p").enumerate() {
                    let location = Location::Cell {
                        cell: c.saturating_add(1),
                        paragraph: p.saturating_add(1),
                        row: r.saturating_add(1),
                        table: index,
                    };
                    self.paragraph(paragraph, location);
                }
                for nested in cell.elements_mut().filter(|e| return e.name == "w:tbl") {
                    self.table(nested, depth.saturating_add(1));
                }
            }
        }
        return;
    }
}

/// Link every code in `input` and save the result to `output`.
///
/// The input is read completely before the output is opened, so both may be
/// the same path.
///
/// # Errors
///
/// Returns any error from [`DocxPackage::open`] or [`DocxPackage::save`],
/// including `Error::OutputLocked` when the destination is held open.
pub fn process_document(
    input: &Path,
    output: &Path,
    mapping: &CodeMapping,
    sink: &mut dyn ProgressSink,
) -> Result<Counts, Error> {
    let mut package = DocxPackage::open(input)?;
    let counts = walk_package(&mut package, mapping, sink);
    package.save(output)?;
    tracing::info!(
        found = counts.found,
        linked = counts.linked,
        output = %output.display(),
        "document processed"
    );
    return Ok(counts);
}

/// Dry run of [`process_document`]: walk the document, write nothing.
///
/// # Errors
///
/// Returns any error from [`DocxPackage::open`].
pub fn scan_document(input: &Path, mapping: &CodeMapping, sink: &mut dyn ProgressSink) -> Result<Counts, Error> {
    let mut package = DocxPackage::open(input)?;
    return Ok(walk_package(&mut package, mapping, sink));
}

/// Rewrite an opened package in memory.
pub fn walk_package(package: &mut DocxPackage, mapping: &CodeMapping, sink: &mut dyn ProgressSink) -> Counts {
    let Some((body, links)) = package.body_and_links() else {
        return Counts::default();
    };
    let mut walker = Walker { counts: Counts::default(), links, mapping, sink, tables: 0 };
    walker.body(body);
    return walker.counts;
}
