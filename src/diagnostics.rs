use std::fmt::Write as _;
use std::path::Path;

use crate::config::CONFIG_FILE;
use crate::error::Error;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where the user can
/// act on it, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ColumnNotFound { column, headers, path } => render_column_not_found(column, headers, path),
        Error::OutputLocked { path } => render_output_locked(path),
        Error::UnsupportedTable { ext, path } => render_unsupported_table(ext, path),
        _ => render_generic(e),
    };
}

fn render_column_not_found(column: &str, headers: &[String], path: &Path) -> String {
    let mut out = format!(
        "\
# Error: Column Not Found

`{}` has no column named `{column}` (matched case-insensitively).
",
        path.display()
    );

    if headers.is_empty() {
        out.push_str("\nThe header row is empty.\n");
    } else {
        out.push_str("\n## Available columns\n\n");
        for header in headers {
            let _ = writeln!(out, "- `{header}`");
        }
    }

    let _ = write!(
        out,
        "\
\n## Fix

Name the columns explicitly:

    evlink run --code-column <NAME> --link-column <NAME> ...

or set them in `{CONFIG_FILE}` under `[columns]`.
"
    );
    return out;
}

fn render_generic(e: &Error) -> String {
    return match e {
        Error::FileNotFound { path } => format!(
            "\
# Error: File Not Found

`{}` does not exist.
",
            path.display()
        ),

        Error::DocumentRead { path, reason } => format!(
            "\
# Error: Unreadable Document

Could not read `{}` as a Word document: {reason}

## Fix

Make sure the file is a `.docx` saved by Word (not `.doc`, not a renamed file).
",
            path.display()
        ),

        Error::SheetRead { path, reason } => format!(
            "\
# Error: Unreadable Spreadsheet

Could not read `{}`: {reason}
",
            path.display()
        ),

        Error::MalformedXml { part, reason } => format!(
            "\
# Error: Malformed Document Part

`{part}` is not well-formed XML: {reason}
"
        ),

        Error::Csv(e) => format!(
            "\
# Error: Invalid CSV

{e}
"
        ),

        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),

        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

`{CONFIG_FILE}` could not be parsed: {e}
"
        ),

        Error::Zip(e) => format!(
            "\
# Error: Zip Archive

{e}
"
        ),

        // Already handled in render_error, but need exhaustive match.
        _ => format!(
            "\
# Error

{e}
"
        ),
    };
}

fn render_output_locked(path: &Path) -> String {
    return format!(
        "\
# Error: Output File Locked

`{}` could not be written because another program holds it open.

## Fix

Close the file in Word (or any other application using it) and run the
command again, or choose a different destination with `-o`.
",
        path.display()
    );
}

fn render_unsupported_table(ext: &str, path: &Path) -> String {
    return format!(
        "\
# Error: Unsupported Spreadsheet

`{}` has extension `.{ext}`, which cannot be read.

## Supported extensions

- `.xlsx`, `.xlsm`: Excel workbook (active sheet)
- `.csv`: UTF-8, comma-separated
",
        path.display()
    );
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn column_not_found_lists_headers() {
        let md = render_error(&Error::ColumnNotFound {
            column: "Href".to_string(),
            headers: vec!["Code".to_string(), "Link".to_string()],
            path: PathBuf::from("map.xlsx"),
        });
        assert!(md.starts_with("# Error: Column Not Found"));
        assert!(md.contains("no column named `Href`"));
        assert!(md.contains("- `Code`\n- `Link`"));
        assert!(md.contains("--code-column"));
    }

    #[test]
    fn output_locked_says_to_close_the_file() {
        let md = render_error(&Error::OutputLocked { path: PathBuf::from("out.docx") });
        assert!(md.contains("# Error: Output File Locked"));
        assert!(md.contains("`out.docx`"));
        assert!(md.contains("Close the file"));
    }

    #[test]
    fn every_heading_is_markdown() {
        let errors = [
            Error::FileNotFound { path: PathBuf::from("a.docx") },
            Error::DocumentRead { path: PathBuf::from("a.docx"), reason: "not a zip".to_string() },
            Error::SheetRead { path: PathBuf::from("m.xlsx"), reason: "no sheet".to_string() },
            Error::MalformedXml { part: "word/document.xml".to_string(), reason: "eof".to_string() },
            Error::UnsupportedTable { ext: "ods".to_string(), path: PathBuf::from("m.ods") },
            Error::Io(std::io::Error::other("disk full")),
        ];
        for error in &errors {
            let md = render_error(error);
            assert!(md.starts_with("# Error: "), "{md}");
        }
    }
}
