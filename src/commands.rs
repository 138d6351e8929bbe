//! CLI commands for evlink: run, check, headers, info.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use crate::config::{self, ColumnNames, RunConfig};
use crate::error;
use crate::events::{Progress, ProgressSink, TracingSink};
use crate::mapping::{self, ColumnSelection};
use crate::sheet;
use crate::types::{CodeMapping, Counts};
use crate::walker;

/// Inputs shared by `run` and `check`, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct LinkArgs {
    /// Column names from flags; unset ones come from the config or a guess.
    pub columns: ColumnNames,
    /// Document to process.
    pub doc: PathBuf,
    /// Explicit output path.
    pub output: Option<PathBuf>,
    /// Mapping spreadsheet.
    pub table: PathBuf,
}

/// Sink that records every matched token and forwards events to `tracing`.
#[derive(Default)]
struct Checklist {
    /// Matched tokens in visiting order.
    tokens: Vec<TokenLine>,
}

/// `check` result for JSON output.
#[derive(Serialize)]
struct CheckReport<'a> {
    columns: &'a ColumnSelection,
    found: usize,
    linked: usize,
    tokens: &'a [TokenLine],
    unlinked: usize,
}

/// `headers` result for JSON output.
#[derive(Serialize)]
struct HeadersReport<'a> {
    guess: ColumnSelection,
    headers: &'a [String],
}

/// `run` result for JSON output.
#[derive(Serialize)]
struct RunReport<'a> {
    columns: &'a ColumnSelection,
    found: usize,
    linked: usize,
    output: String,
    unlinked: usize,
}

/// One matched token as reported by `check`.
#[derive(Serialize)]
struct TokenLine {
    code: String,
    linked: bool,
    location: String,
}

impl ProgressSink for Checklist {
    fn event(&mut self, event: &Progress<'_>) {
        if let Progress::TokenMatched { code, linked, location } = *event {
            self.tokens.push(TokenLine { code: code.to_string(), linked, location: location.to_string() });
        }
        TracingSink.event(event);
    }
}

/// Dry run: report every code in the document and whether it would be
/// linked. Nothing is written.
///
/// # Errors
///
/// Returns errors from input validation, config loading, mapping loading, or
/// document reading.
pub fn check(args: LinkArgs, json: bool) -> Result<ExitCode, error::Error> {
    let run_config = prepare(args)?;
    let mut checklist = Checklist::default();
    let mapping = load(&run_config, &mut checklist)?;
    let counts = walker::scan_document(&run_config.input_doc, &mapping, &mut checklist)?;

    if json {
        print_json(&CheckReport {
            columns: &run_config.columns,
            found: counts.found,
            linked: counts.linked,
            tokens: &checklist.tokens,
            unlinked: counts.unlinked(),
        });
    } else {
        for token in &checklist.tokens {
            let status = if token.linked { "LINKED " } else { "MISSING" };
            println!("{status}  [{}]  {}", token.code, token.location);
        }
        if !checklist.tokens.is_empty() {
            println!();
        }
        println!("Found {} codes, {} would be linked", counts.found, counts.linked);
    }

    if counts.unlinked() > 0 {
        return Ok(ExitCode::from(1));
    }
    return Ok(ExitCode::SUCCESS);
}

/// Link every code in `config.input_doc` and write `config.output_path`.
///
/// # Errors
///
/// Returns errors from mapping loading, document reading, or saving,
/// including `Error::OutputLocked`.
pub fn execute(config: &RunConfig, sink: &mut dyn ProgressSink) -> Result<Counts, error::Error> {
    let mapping = load(config, sink)?;
    return walker::process_document(&config.input_doc, &config.output_path, &mapping, sink);
}

/// Print a spreadsheet's header row and the columns that would be guessed.
///
/// # Errors
///
/// Returns errors from reading the spreadsheet.
pub fn headers(table: &Path, json: bool) -> Result<(), error::Error> {
    let headers = sheet::read_headers(table)?;
    let guess = mapping::guess_columns(&headers);

    if json {
        print_json(&HeadersReport { guess, headers: &headers });
        return Ok(());
    }

    println!("## Columns in {}\n", table.display());
    for header in &headers {
        println!("- {header}");
    }
    println!();
    println!("Guessed code column:    {}", guess.code);
    println!("Guessed link column:    {}", guess.link);
    println!("Guessed summary column: {}", guess.summary.as_deref().unwrap_or("(none)"));
    return Ok(());
}

/// Output a comprehensive reference document for evlink.
pub fn info(json: bool) {
    return crate::info::run(json);
}

/// Load the mapping for a run, warning when it is empty.
///
/// # Errors
///
/// Returns errors from [`mapping::load_mapping`].
fn load(config: &RunConfig, sink: &mut dyn ProgressSink) -> Result<CodeMapping, error::Error> {
    let (mapping, _headers) = mapping::load_mapping(&config.input_table, &config.columns, sink)?;
    if mapping.is_empty() {
        tracing::warn!(path = %config.input_table.display(), "mapping is empty, no code will be linked");
    }
    return Ok(mapping);
}

/// Validate inputs and resolve columns and the output path.
///
/// Column names come from flags first, then `.evlink.toml`, then a guess from
/// the header row.
///
/// # Errors
///
/// Returns `Error::FileNotFound` for a missing input, or errors from config
/// loading and header reading.
fn prepare(args: LinkArgs) -> Result<RunConfig, error::Error> {
    require_file(&args.doc)?;
    require_file(&args.table)?;

    let config = config::Config::load(Path::new("."))?;
    let names = args.columns.or(&config.columns);
    let headers = if names.is_complete() { Vec::new() } else { sheet::read_headers(&args.table)? };
    let columns = names.resolve(&headers);
    tracing::debug!(code = %columns.code, link = %columns.link, summary = ?columns.summary, "columns resolved");

    let output_path = args
        .output
        .unwrap_or_else(|| return config::default_output_path(&args.doc, &config.output.suffix));

    return Ok(RunConfig { columns, input_doc: args.doc, input_table: args.table, output_path });
}

/// Pretty-print a report as JSON on stdout.
fn print_json<T: Serialize>(report: &T) {
    // serde_json::to_string_pretty won't fail on these structures.
    let json = serde_json::to_string_pretty(report).unwrap_or_default();
    println!("{json}");
    return;
}

/// Fail early with a clear error when an input path is missing.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if `path` is not a file.
fn require_file(path: &Path) -> Result<(), error::Error> {
    if path.is_file() {
        return Ok(());
    }
    return Err(error::Error::FileNotFound { path: path.to_path_buf() });
}

/// Link codes and report the result.
///
/// # Errors
///
/// Returns errors from input validation, config loading, mapping loading,
/// document reading, or saving.
pub fn run(args: LinkArgs, json: bool) -> Result<ExitCode, error::Error> {
    let run_config = prepare(args)?;
    let counts = execute(&run_config, &mut TracingSink)?;

    if json {
        print_json(&RunReport {
            columns: &run_config.columns,
            found: counts.found,
            linked: counts.linked,
            output: run_config.output_path.display().to_string(),
            unlinked: counts.unlinked(),
        });
        return Ok(ExitCode::SUCCESS);
    }

    println!("Found {} codes, linked {}", counts.found, counts.linked);
    if counts.unlinked() > 0 {
        println!(
            "Note: {} codes had no matching link in {} and were left as plain text",
            counts.unlinked(),
            run_config.input_table.display()
        );
    }
    println!("Saved {}", run_config.output_path.display());
    return Ok(ExitCode::SUCCESS);
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;
    use crate::docx::tests::docx_bytes;
    use crate::events::{Location, NullSink};

    #[test]
    fn execute_links_and_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("report.docx");
        let table = dir.path().join("map.csv");
        std::fs::write(&doc, docx_bytes("<w:p><w:r><w:t>See [1.2-001] and [9.9-999].</w:t></w:r></w:p>", None))
            .unwrap();
        std::fs::write(&table, "Code,Link,Summary\n[1.2-001],http://ok,Minutes\n").unwrap();

        let config = RunConfig {
            columns: ColumnSelection {
                code: "Code".to_string(),
                link: "Link".to_string(),
                summary: Some("Summary".to_string()),
            },
            input_doc: doc.clone(),
            input_table: table,
            output_path: dir.path().join("out.docx"),
        };
        let counts = execute(&config, &mut NullSink).unwrap();

        assert_eq!(counts, Counts { found: 2, linked: 1 });
        assert!(config.output_path.is_file());
        let untouched = walker::scan_document(&doc, &CodeMapping::default(), &mut NullSink).unwrap();
        assert_eq!(untouched.found, 2);
    }

    #[test]
    fn missing_inputs_are_reported_before_anything_else() {
        let dir = tempfile::tempdir().unwrap();
        let args = LinkArgs {
            doc: dir.path().join("absent.docx"),
            table: dir.path().join("absent.csv"),
            ..LinkArgs::default()
        };
        match prepare(args) {
            Err(error::Error::FileNotFound { path }) => assert!(path.ends_with("absent.docx")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn checklist_records_tokens() {
        let mut checklist = Checklist::default();
        checklist.event(&Progress::TokenMatched {
            code: "1.1-001",
            linked: false,
            location: Location::Body { paragraph: 2 },
        });
        checklist.event(&Progress::TableEntered { depth: 0, index: 1 });

        assert_eq!(checklist.tokens.len(), 1);
        assert_eq!(checklist.tokens.first().map(|t| return t.location.as_str()), Some("paragraph 2"));
    }
}
