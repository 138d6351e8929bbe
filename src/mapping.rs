//! Mapping loader: spreadsheet rows to a code -> link lookup table.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;
use crate::events::{Progress, ProgressSink};
use crate::sheet::{self, Table};
use crate::types::{CodeMapping, MappingEntry};

/// Header keywords tried, in order, when no code column is configured.
const CODE_HINTS: [&str; 3] = ["mã", "code", "evidence code"];

/// Header keywords tried, in order, when no link column is configured.
const LINK_HINTS: [&str; 2] = ["link", "url"];

/// Header keywords tried, in order, when no summary column is configured.
const SUMMARY_HINTS: [&str; 4] = ["evidence summary", "summary", "mô tả", "mo ta"];

/// Names of the spreadsheet columns that feed the mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ColumnSelection {
    /// Column holding the codes.
    pub code: String,
    /// Column holding the URLs.
    pub link: String,
    /// Column holding tooltip text, if any.
    pub summary: Option<String>,
}

/// Case-insensitive header name -> column position.
/// When two headers share a name, the rightmost one wins.
struct HeaderIndex {
    /// Lowercased, trimmed header names.
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Build the index from a header row.
    fn new(headers: &[String]) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, h)| return (h.trim().to_lowercase(), i))
            .collect();
        return Self { positions };
    }

    /// Position of a column, matched case-insensitively after trimming.
    fn position(&self, name: &str) -> Option<usize> {
        return self.positions.get(&name.trim().to_lowercase()).copied();
    }
}

/// Pick likely code/link/summary columns from a header row.
///
/// Each hint is tried in order against every header (case-insensitive
/// substring). Without a hit the code column falls back to the first header,
/// the link column to the second (or first), and the summary to none.
pub fn guess_columns(headers: &[String]) -> ColumnSelection {
    let first = headers.first().cloned().unwrap_or_default();
    let code = pick_header(headers, &CODE_HINTS).unwrap_or_else(|| return first.clone());
    let link = pick_header(headers, &LINK_HINTS)
        .or_else(|| return headers.get(1).cloned())
        .unwrap_or(first);
    let summary = pick_header(headers, &SUMMARY_HINTS);
    return ColumnSelection { code, link, summary };
}

/// Read a spreadsheet and build the code mapping.
/// Returns the mapping together with the header row.
///
/// # Errors
///
/// Returns `Error::ColumnNotFound` if the code or link column is missing,
/// or any error from [`sheet::open`].
pub fn load_mapping(
    path: &Path,
    columns: &ColumnSelection,
    sink: &mut dyn ProgressSink,
) -> Result<(CodeMapping, Vec<String>), Error> {
    let table = sheet::open(path)?;
    let mapping = mapping_from_table(&table, path, columns, sink)?;
    tracing::info!(codes = mapping.len(), path = %path.display(), "loaded mapping");
    return Ok((mapping, table.headers()));
}

/// Build the mapping from an already-read table. `path` is only used in errors.
///
/// Rows with an empty code or link are skipped. A configured summary column
/// that is absent from the header row is ignored with a warning.
///
/// # Errors
///
/// Returns `Error::ColumnNotFound` if the code or link column is missing.
pub fn mapping_from_table(
    table: &Table,
    path: &Path,
    columns: &ColumnSelection,
    sink: &mut dyn ProgressSink,
) -> Result<CodeMapping, Error> {
    let headers = table.headers();
    let index = HeaderIndex::new(&headers);
    let require = |column: &str| {
        return index.position(column).ok_or_else(|| {
            return Error::ColumnNotFound {
                column: column.to_string(),
                headers: headers.clone(),
                path: path.to_path_buf(),
            };
        });
    };

    let code_col = require(&columns.code)?;
    let link_col = require(&columns.link)?;
    let summary_col = columns.summary.as_deref().and_then(|name| {
        let position = index.position(name);
        if position.is_none() {
            tracing::warn!(column = name, "summary column not found, tooltips disabled");
        }
        return position;
    });

    let mut mapping = CodeMapping::default();
    // Data starts on spreadsheet row 2.
    for (row_number, row) in (2_usize..).zip(table.data_rows()) {
        let code = clean_code(cell_text(row, code_col));
        let url = cell_text(row, link_col).trim();
        if code.is_empty() || url.is_empty() {
            continue;
        }

        let tooltip = summary_col
            .map(|col| return cell_text(row, col).trim())
            .filter(|tip| return !tip.is_empty())
            .map(str::to_string);

        sink.event(&Progress::RowLoaded { code, row: row_number });
        mapping.insert(code.to_string(), MappingEntry { tooltip, url: url.to_string() });
    }

    return Ok(mapping);
}

/// Text of a cell, empty when the row is short or the cell is blank.
fn cell_text(row: &[Option<String>], col: usize) -> &str {
    return row.get(col).and_then(Option::as_deref).unwrap_or("");
}

/// Strip surrounding brackets and whitespace: ` [1.2-001] ` -> `1.2-001`.
fn clean_code(raw: &str) -> &str {
    return raw.trim_matches(|c: char| return c == '[' || c == ']' || c.is_whitespace());
}

/// First header containing one of the hints, trying hints in priority order.
fn pick_header(headers: &[String], hints: &[&str]) -> Option<String> {
    for hint in hints {
        let hint = hint.to_lowercase();
        if let Some(found) = headers.iter().find(|h| return h.to_lowercase().contains(&hint)) {
            return Some(found.clone());
        }
    }
    return None;
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;
    use crate::events::NullSink;

    /// Build a table from a header row and data rows.
    fn table(headers: &[&str], rows: &[&[Option<&str>]]) -> Table {
        let mut all = vec![headers.iter().map(|h| return Some((*h).to_string())).collect::<Vec<_>>()];
        for row in rows {
            all.push(row.iter().map(|c| return c.map(str::to_string)).collect());
        }
        return Table { rows: all };
    }

    fn columns(code: &str, link: &str, summary: Option<&str>) -> ColumnSelection {
        return ColumnSelection {
            code: code.to_string(),
            link: link.to_string(),
            summary: summary.map(str::to_string),
        };
    }

    /// Sink that remembers which rows were loaded.
    #[derive(Default)]
    struct Rows(Vec<usize>);

    impl ProgressSink for Rows {
        fn event(&mut self, event: &Progress<'_>) {
            if let Progress::RowLoaded { row, .. } = *event {
                self.0.push(row);
            }
        }
    }

    #[test]
    fn strips_brackets_and_skips_rows_without_code() {
        let t = table(
            &["Code", "Link", "Summary"],
            &[&[Some("[1.2-001]"), Some("http://x/1"), None], &[Some(""), Some("http://x/2"), Some("s")]],
        );
        let mapping = mapping_from_table(&t, Path::new("m.xlsx"), &columns("Code", "Link", Some("Summary")), &mut NullSink)
            .unwrap();

        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("1.2-001"), Some(&MappingEntry::link("http://x/1")));
    }

    #[test]
    fn last_duplicate_wins() {
        let t = table(&["Code", "Link"], &[&[Some("[2.1-003]"), Some("urlA")], &[Some("[2.1-003]"), Some("urlB")]]);
        let mapping = mapping_from_table(&t, Path::new("m.csv"), &columns("Code", "Link", None), &mut NullSink).unwrap();
        assert_eq!(mapping.get("2.1-003").map(|e| return e.url.as_str()), Some("urlB"));
    }

    #[test]
    fn columns_match_case_insensitively_after_trimming() {
        let t = table(&[" EVIDENCE CODE ", "url"], &[&[Some("3.1-001"), Some(" http://x ")]]);
        let mapping = mapping_from_table(&t, Path::new("m.csv"), &columns("evidence code", " URL", None), &mut NullSink)
            .unwrap();
        assert_eq!(mapping.get("3.1-001").map(|e| return e.url.as_str()), Some("http://x"));
    }

    #[test]
    fn missing_mandatory_column_names_it() {
        let t = table(&["Code", "Link"], &[]);
        let err = mapping_from_table(&t, Path::new("m.csv"), &columns("Code", "Href", None), &mut NullSink).unwrap_err();
        match err {
            Error::ColumnNotFound { column, headers, .. } => {
                assert_eq!(column, "Href");
                assert_eq!(headers, vec!["Code".to_string(), "Link".to_string()]);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_summary_column_disables_tooltips() {
        let t = table(&["Code", "Link"], &[&[Some("1.1-001"), Some("http://x")]]);
        let mapping = mapping_from_table(&t, Path::new("m.csv"), &columns("Code", "Link", Some("Notes")), &mut NullSink)
            .unwrap();
        assert_eq!(mapping.get("1.1-001").and_then(|e| return e.tooltip.clone()), None);
    }

    #[test]
    fn summary_becomes_trimmed_tooltip_and_empty_summary_is_none() {
        let t = table(
            &["Code", "Link", "Summary"],
            &[&[Some("1.1-001"), Some("u1"), Some("  Minutes  ")], &[Some("1.1-002"), Some("u2"), Some("   ")]],
        );
        let mapping = mapping_from_table(&t, Path::new("m.csv"), &columns("Code", "Link", Some("summary")), &mut NullSink)
            .unwrap();
        assert_eq!(mapping.get("1.1-001").and_then(|e| return e.tooltip.as_deref()), Some("Minutes"));
        assert_eq!(mapping.get("1.1-002").and_then(|e| return e.tooltip.as_deref()), None);
    }

    #[test]
    fn short_rows_and_empty_links_are_skipped() {
        let t = table(&["Code", "Link"], &[&[Some("1.1-001")], &[Some("1.1-002"), Some("  ")], &[Some("1.1-003"), Some("u")]]);
        let mut rows = Rows::default();
        let mapping = mapping_from_table(&t, Path::new("m.csv"), &columns("Code", "Link", None), &mut rows).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(rows.0, vec![4]);
    }

    #[test]
    fn clean_code_handles_spaces_inside_brackets() {
        assert_eq!(clean_code(" [ 1.2-001 ] "), "1.2-001");
        assert_eq!(clean_code("[[1.2-001]]"), "1.2-001");
        assert_eq!(clean_code("[]"), "");
    }

    #[test]
    fn guesses_columns_from_header_keywords() {
        let headers: Vec<String> = ["STT", "Mã minh chứng", "Evidence Summary", "URL"].iter().map(|s| return (*s).to_string()).collect();
        let guess = guess_columns(&headers);
        assert_eq!(guess.code, "Mã minh chứng");
        assert_eq!(guess.link, "URL");
        assert_eq!(guess.summary.as_deref(), Some("Evidence Summary"));
    }

    #[test]
    fn guess_falls_back_to_positions() {
        let headers: Vec<String> = ["A", "B"].iter().map(|s| return (*s).to_string()).collect();
        let guess = guess_columns(&headers);
        assert_eq!(guess.code, "A");
        assert_eq!(guess.link, "B");
        assert_eq!(guess.summary, None);

        let single = vec!["Only".to_string()];
        assert_eq!(guess_columns(&single).link, "Only");
    }
}
