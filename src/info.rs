use std::path::Path;

use serde::Serialize;

use crate::config::{self, CONFIG_FILE};
use crate::scanner::CODE_PATTERN;

/// Output the evlink reference document.
pub fn run(json: bool) {
    let state = gather_state(Path::new("."));

    if json {
        print_json(&state);
    } else {
        print_markdown(&state);
    }
}

// ── State gathering ───────────────────────────────────────────────────

#[derive(Serialize)]
struct CurrentState {
    code_column: Option<String>,
    config_error: Option<String>,
    config_found: bool,
    link_column: Option<String>,
    output_suffix: String,
    summary_column: Option<String>,
}

fn gather_state(root: &Path) -> CurrentState {
    let config_found = root.join(CONFIG_FILE).exists();
    let (config, config_error) = match config::Config::load(root) {
        Ok(c) => (c, None),
        Err(e) => (config::Config::default(), Some(e.to_string())),
    };

    return CurrentState {
        code_column: config.columns.code,
        config_error,
        config_found,
        link_column: config.columns.link,
        output_suffix: config.output.suffix,
        summary_column: config.columns.summary,
    };
}

// ── Markdown output ───────────────────────────────────────────────────

fn print_markdown(state: &CurrentState) {
    let version = env!("CARGO_PKG_VERSION");
    print_markdown_header(version);
    print_markdown_state(state);
    println!();
    print_markdown_exit_codes();
}

fn print_markdown_header(version: &str) {
    print!(
        "\
# evlink {version}

Turn bracketed evidence codes in a Word document into hyperlinks, using a
spreadsheet that maps each code to a URL and an optional summary.

## Code Syntax

    [1.2-001]        digits, dot, digits, dash, exactly three digits
    [12.34-567]      multi-digit sections are fine
    [ 1.2-001]       not a code (no spaces inside the brackets)

Pattern: `{CODE_PATTERN}`

## Workflow

    evlink headers map.xlsx                     List spreadsheet columns
    evlink check --doc report.docx --table map.xlsx
                                                Dry run: list codes, exit 1 if any lack a link
    evlink run --doc report.docx --table map.xlsx
                                                Write report_linked.docx
    evlink run ... -o out.docx --code-column \"Mã\" --link-column URL

## Spreadsheets

| Extension    | Read as                    |
|--------------|----------------------------|
| .xlsx .xlsm  | Excel workbook, active sheet |
| .csv         | UTF-8, comma-separated     |

Row 1 is the header row. Unset columns are guessed from header keywords
(`mã`/`code`, `link`/`url`, `summary`/`mô tả`). The summary column is only
guessed when neither the code nor the link column is named.

## Configuration ({CONFIG_FILE})

    [columns]
    code = \"Code\"
    link = \"Link\"
    summary = \"Summary\"

    [output]
    suffix = \"_linked\"

## Current State

"
    );
}

fn print_markdown_state(state: &CurrentState) {
    match (&state.config_error, state.config_found) {
        (Some(e), _) => println!("Config:   {CONFIG_FILE} (invalid: {e})"),
        (None, true) => println!("Config:   {CONFIG_FILE} (found)"),
        (None, false) => println!("Config:   {CONFIG_FILE} (not found)"),
    }

    let show = |column: &Option<String>| return column.clone().unwrap_or_else(|| return "(guessed)".to_string());
    println!("Code:     {}", show(&state.code_column));
    println!("Link:     {}", show(&state.link_column));
    println!("Summary:  {}", show(&state.summary_column));
    println!("Suffix:   {}", state.output_suffix);
}

fn print_markdown_exit_codes() {
    print!(
        "\
## Exit Codes

| Code | Meaning |
|------|---------|
| 0    | Success |
| 1    | `check` found codes without a link |
| 2    | Invalid command-line arguments |
| 3    | Runtime error |
| 4    | Output file locked by another program |
"
    );
}

// ── JSON output ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct ExitCodeInfo {
    code: u8,
    meaning: String,
}

#[derive(Serialize)]
struct InfoJson<'a> {
    code_pattern: &'static str,
    current_state: &'a CurrentState,
    exit_codes: Vec<ExitCodeInfo>,
    spreadsheet_extensions: Vec<&'static str>,
    version: &'static str,
}

fn print_json(state: &CurrentState) {
    let info = InfoJson {
        code_pattern: CODE_PATTERN,
        current_state: state,
        exit_codes: vec![
            ExitCodeInfo { code: 0, meaning: "Success".to_string() },
            ExitCodeInfo { code: 1, meaning: "check found codes without a link".to_string() },
            ExitCodeInfo { code: 2, meaning: "Invalid command-line arguments".to_string() },
            ExitCodeInfo { code: 3, meaning: "Runtime error".to_string() },
            ExitCodeInfo { code: 4, meaning: "Output file locked by another program".to_string() },
        ],
        spreadsheet_extensions: vec![".xlsx", ".xlsm", ".csv"],
        version: env!("CARGO_PKG_VERSION"),
    };

    // serde_json::to_string_pretty won't fail on this structure.
    let json = serde_json::to_string_pretty(&info).unwrap_or_default();
    println!("{json}");
}
