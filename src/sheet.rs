//! Spreadsheet reader: the header row and data rows of an XLSX or CSV file.
//!
//! XLSX workbooks are read straight from their zip parts: the workbook picks
//! the active sheet, its relationship part locates the worksheet, and shared
//! strings are resolved by index. Only cached cell values are read; formulas
//! are never evaluated.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use zip::ZipArchive;

use crate::archive;
use crate::error::Error;
use crate::xml::{Element, XmlDocument};

/// Worksheet used when the workbook relationships cannot be resolved.
const FALLBACK_SHEET: &str = "xl/worksheets/sheet1.xml";

/// A rectangular-ish grid of cell values. Row 0 is spreadsheet row 1.
/// `None` marks an empty cell; rows may have different lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Rows in sheet order, gaps filled with empty rows.
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Rows after the header row.
    pub fn data_rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        return self.rows.iter().skip(1).map(Vec::as_slice);
    }

    /// Header row with each cell trimmed; empty cells become empty strings.
    pub fn headers(&self) -> Vec<String> {
        let Some(first) = self.rows.first() else {
            return Vec::new();
        };
        return first
            .iter()
            .map(|cell| return cell.as_deref().map(str::trim).unwrap_or_default().to_string())
            .collect();
    }

    /// Place a value at a zero-based (row, column), growing the grid as needed.
    fn set(&mut self, row: usize, col: usize, value: Option<String>) {
        if self.rows.len() <= row {
            self.rows.resize_with(row.saturating_add(1), Vec::new);
        }
        let Some(cells) = self.rows.get_mut(row) else { return };
        if cells.len() <= col {
            cells.resize(col.saturating_add(1), None);
        }
        if let Some(slot) = cells.get_mut(col) {
            *slot = value;
        }
        return;
    }
}

/// Read a spreadsheet, choosing the reader by file extension.
/// The file is read completely and closed before returning.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the path does not exist,
/// `Error::UnsupportedTable` for unknown extensions,
/// or `Error::SheetRead`/`Error::Csv` if the contents cannot be read.
pub fn open(path: &Path) -> Result<Table, Error> {
    if !path.exists() {
        return Err(Error::FileNotFound { path: path.to_path_buf() });
    }

    let ext = path
        .extension()
        .and_then(|e| return e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => read_csv(path)?,
        "xlsm" | "xlsx" => read_xlsx(path)?,
        _ => return Err(Error::UnsupportedTable { ext, path: path.to_path_buf() }),
    };

    tracing::debug!(path = %path.display(), rows = table.rows.len(), "read spreadsheet");
    return Ok(table);
}

/// Header row (row 1) of a spreadsheet, trimmed. Empty cells read as "".
///
/// # Errors
///
/// Same as [`open`].
pub fn read_headers(path: &Path) -> Result<Vec<String>, Error> {
    return Ok(open(path)?.headers());
}

/// Convert the letter prefix of a cell reference (`AB12`) to a zero-based column.
fn column_index(reference: &str) -> Option<usize> {
    let mut index: usize = 0;
    let mut seen = false;
    for c in reference.chars().take_while(char::is_ascii_alphabetic) {
        let digit = u32::from(c.to_ascii_uppercase()).checked_sub(u32::from('A'))?.checked_add(1)?;
        index = index.checked_mul(26)?.checked_add(usize::try_from(digit).ok()?)?;
        seen = true;
    }
    if !seen {
        return None;
    }
    return index.checked_sub(1);
}

/// Render a numeric cell the way a spreadsheet shows integral values.
fn format_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(value) = trimmed.parse::<f64>() else {
        return trimmed.to_string();
    };
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    return trimmed.to_string();
}

/// Index of the active worksheet from `bookViews/workbookView/@activeTab`.
fn active_tab(workbook: &Element) -> usize {
    return workbook
        .child_local("bookViews")
        .and_then(|views| return views.child_local("workbookView"))
        .and_then(|view| return view.attr("activeTab"))
        .and_then(|tab| return tab.parse().ok())
        .unwrap_or(0);
}

/// Parse `xl/sharedStrings.xml` into an index-addressable list.
///
/// # Errors
///
/// Returns `Error::MalformedXml` if the part cannot be parsed.
fn parse_shared_strings(bytes: &[u8]) -> Result<Vec<String>, Error> {
    let doc = XmlDocument::parse("xl/sharedStrings.xml", bytes)?;
    return Ok(doc.root.elements().filter(|e| return e.is("si")).map(rich_text).collect());
}

/// Parse a worksheet part into a table of display values.
///
/// # Errors
///
/// Returns `Error::MalformedXml` if the part cannot be parsed.
fn parse_worksheet(part: &str, bytes: &[u8], shared: &[String]) -> Result<Table, Error> {
    let doc = XmlDocument::parse(part, bytes)?;
    let mut table = Table::default();
    let Some(sheet_data) = doc.root.child_local("sheetData") else {
        return Ok(table);
    };

    let mut next_row: usize = 0;
    for row in sheet_data.elements().filter(|e| return e.is("row")) {
        let row_index = row
            .attr("r")
            .and_then(|r| return r.parse::<usize>().ok())
            .and_then(|r| return r.checked_sub(1))
            .unwrap_or(next_row);
        next_row = row_index.saturating_add(1);

        let mut next_col: usize = 0;
        for cell in row.elements().filter(|e| return e.is("c")) {
            let col_index = cell.attr("r").and_then(column_index).unwrap_or(next_col);
            next_col = col_index.saturating_add(1);
            table.set(row_index, col_index, cell_value(cell, shared));
        }
        if table.rows.len() <= row_index {
            table.set(row_index, 0, None);
        }
    }

    return Ok(table);
}

/// Cached display value of one `<c>` cell.
fn cell_value(cell: &Element, shared: &[String]) -> Option<String> {
    let kind = cell.attr("t").unwrap_or("n");
    if kind == "inlineStr" {
        return cell.child_local("is").map(rich_text);
    }

    let raw = cell.child_local("v").map(Element::text_content)?;
    return match kind {
        "b" => Some(if raw.trim() == "1" { "True" } else { "False" }.to_string()),
        "e" | "str" => Some(raw),
        "s" => raw.trim().parse::<usize>().ok().and_then(|i| return shared.get(i).cloned()),
        _ => Some(format_number(&raw)),
    };
}

/// Read a comma-separated file. Every field is a value; nothing is empty-as-None.
///
/// # Errors
///
/// Returns `Error::Csv` if the file is not valid CSV.
fn read_csv(path: &Path) -> Result<Table, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut table = Table::default();
    for record in reader.records() {
        let record = record?;
        table.rows.push(record.iter().map(|field| return Some(field.to_string())).collect());
    }
    return Ok(table);
}

/// Text of a string item (`<si>` or `<is>`): plain `<t>` or rich `<r><t>` runs.
/// Phonetic hints (`<rPh>`) are not part of the value.
fn rich_text(item: &Element) -> String {
    let mut out = String::new();
    for child in item.elements() {
        if child.is("t") {
            out.push_str(&child.text_content());
        } else if child.is("r")
            && let Some(t) = child.child_local("t")
        {
            out.push_str(&t.text_content());
        }
    }
    return out;
}

/// Locate the active worksheet's part name.
///
/// # Errors
///
/// Returns `Error::MalformedXml` if the workbook or its relationships are malformed.
fn resolve_sheet_part(workbook_xml: Option<&[u8]>, rels_xml: Option<&[u8]>) -> Result<String, Error> {
    let Some(workbook_xml) = workbook_xml else {
        return Ok(FALLBACK_SHEET.to_string());
    };
    let workbook = XmlDocument::parse("xl/workbook.xml", workbook_xml)?;
    let sheet_ids: Vec<&str> = workbook
        .root
        .child_local("sheets")
        .map(|sheets| {
            return sheets
                .elements()
                .filter(|e| return e.is("sheet"))
                .filter_map(|e| return e.attr_local("id"))
                .collect();
        })
        .unwrap_or_default();

    let tab = active_tab(&workbook.root);
    let Some(rel_id) = sheet_ids.get(tab).or_else(|| return sheet_ids.first()) else {
        return Ok(FALLBACK_SHEET.to_string());
    };
    let Some(rels_xml) = rels_xml else {
        return Ok(FALLBACK_SHEET.to_string());
    };

    let rels = XmlDocument::parse("xl/_rels/workbook.xml.rels", rels_xml)?;
    let targets: HashMap<&str, &str> = rels
        .root
        .elements()
        .filter_map(|r| return Some((r.attr("Id")?, r.attr("Target")?)))
        .collect();

    return Ok(match targets.get(rel_id) {
        Some(target) => match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{target}"),
        },
        None => FALLBACK_SHEET.to_string(),
    });
}

/// Read the active worksheet of an XLSX workbook.
///
/// # Errors
///
/// Returns `Error::SheetRead` if the file is not a workbook or lacks the sheet,
/// or `Error::MalformedXml` if a part cannot be parsed.
fn read_xlsx(path: &Path) -> Result<Table, Error> {
    let sheet_error = |reason: String| return Error::SheetRead { path: path.to_path_buf(), reason };

    let file = File::open(path)?;
    let mut zip = ZipArchive::new(file).map_err(|e| return sheet_error(e.to_string()))?;

    let workbook = archive::read_entry(&mut zip, "xl/workbook.xml")?;
    let rels = archive::read_entry(&mut zip, "xl/_rels/workbook.xml.rels")?;
    let sheet_part = resolve_sheet_part(workbook.as_deref(), rels.as_deref())?;

    let shared = match archive::read_entry(&mut zip, "xl/sharedStrings.xml")? {
        Some(bytes) => parse_shared_strings(&bytes)?,
        None => Vec::new(),
    };

    let Some(sheet) = archive::read_entry(&mut zip, &sheet_part)? else {
        return Err(sheet_error(format!("worksheet {sheet_part} not found")));
    };
    return parse_worksheet(&sheet_part, &sheet, &shared);
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
#[allow(clippy::indexing_slicing, reason = "tests")]
mod tests {
    use std::io::Write as _;

    use super::*;

    const WORKBOOK: &str = r#"<workbook xmlns="s" xmlns:r="r"><bookViews><workbookView activeTab="1"/></bookViews><sheets><sheet name="A" sheetId="1" r:id="rId1"/><sheet name="B" sheetId="2" r:id="rId2"/></sheets></workbook>"#;
    const RELS: &str = r#"<Relationships xmlns="p"><Relationship Id="rId1" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Target="/xl/worksheets/data.xml"/></Relationships>"#;

    #[test]
    fn column_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("C7"), Some(2));
        assert_eq!(column_index("Z3"), Some(25));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("ab2"), Some(27));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn integral_numbers_lose_trailing_fraction() {
        assert_eq!(format_number("3"), "3");
        assert_eq!(format_number("3.0"), "3");
        assert_eq!(format_number("1.5"), "1.5");
        assert_eq!(format_number("abc"), "abc");
    }

    #[test]
    fn active_sheet_resolved_through_relationships() {
        let part = resolve_sheet_part(Some(WORKBOOK.as_bytes()), Some(RELS.as_bytes())).unwrap();
        assert_eq!(part, "xl/worksheets/data.xml");
    }

    #[test]
    fn missing_workbook_falls_back_to_first_sheet() {
        assert_eq!(resolve_sheet_part(None, None).unwrap(), FALLBACK_SHEET);
    }

    #[test]
    fn shared_strings_include_rich_runs_but_not_phonetics() {
        let xml = r#"<sst xmlns="s"><si><t>Code</t></si><si><r><t>Li</t></r><r><t>nk</t></r><rPh><t>x</t></rPh></si></sst>"#;
        let strings = parse_shared_strings(xml.as_bytes()).unwrap();
        assert_eq!(strings, vec!["Code".to_string(), "Link".to_string()]);
    }

    #[test]
    fn worksheet_cells_are_placed_by_reference() {
        let shared = vec!["Code".to_string(), "Link".to_string()];
        let xml = concat!(
            r#"<worksheet xmlns="s"><sheetData>"#,
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row>"#,
            r#"<row r="3"><c r="A3" t="inlineStr"><is><t>[1.2-001]</t></is></c><c r="B3"><v>7</v></c><c r="C3" t="str"><v>http://x</v></c></row>"#,
            r#"</sheetData></worksheet>"#,
        );
        let table = parse_worksheet("sheet", xml.as_bytes(), &shared).unwrap();

        assert_eq!(table.headers(), vec!["Code".to_string(), String::new(), "Link".to_string()]);
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows[1].is_empty());
        assert_eq!(
            table.rows[2],
            vec![Some("[1.2-001]".to_string()), Some("7".to_string()), Some("http://x".to_string())]
        );
        assert_eq!(table.data_rows().count(), 2);
    }

    #[test]
    fn boolean_and_empty_cells() {
        let xml = r#"<worksheet><sheetData><row><c t="b"><v>1</v></c><c/></row></sheetData></worksheet>"#;
        let table = parse_worksheet("sheet", xml.as_bytes(), &[]).unwrap();
        assert_eq!(table.rows[0], vec![Some("True".to_string()), None]);
    }

    #[test]
    fn reads_csv_rows_including_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, " Code ,Link").unwrap();
        writeln!(file, "[1.2-001],http://x/1").unwrap();
        writeln!(file, "[1.2-002]").unwrap();
        drop(file);

        let table = open(&path).unwrap();
        assert_eq!(table.headers(), vec!["Code".to_string(), "Link".to_string()]);
        assert_eq!(table.data_rows().count(), 2);
        assert_eq!(table.rows[2], vec![Some("[1.2-002]".to_string())]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.ods");
        File::create(&path).unwrap();
        assert!(matches!(open(&path), Err(Error::UnsupportedTable { .. })));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.xlsx");
        assert!(matches!(open(&path), Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn non_zip_xlsx_is_a_sheet_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(open(&path), Err(Error::SheetRead { .. })));
    }
}
