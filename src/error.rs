/// Crate-level error types for evlink diagnostics.
use std::path::PathBuf;

/// All errors in evlink carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, column, or reason for failure.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested column has no case-insensitive match in the header row.
    #[error("column not found: `{column}` in {}, headers: {}", path.display(), headers.join(", "))]
    ColumnNotFound {
        /// Column name as requested by the caller.
        column: String,
        /// Header row as read from the spreadsheet.
        headers: Vec<String>,
        /// Spreadsheet that was searched.
        path: PathBuf,
    },

    /// CSV parsing failed.
    #[error("csv: {0}")]
    Csv(
        /// The wrapped CSV error.
        #[from]
        csv::Error,
    ),

    /// The input is not a readable DOCX package.
    #[error("cannot read document {}: {reason}", path.display())]
    DocumentRead {
        /// Document that failed to open.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An input file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// A package part could not be parsed as XML.
    #[error("malformed xml in {part}: {reason}")]
    MalformedXml {
        /// Zip entry name of the part.
        part: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// The destination is held open by another process.
    #[error("output locked: {} is open in another application", path.display())]
    OutputLocked {
        /// Destination that could not be written.
        path: PathBuf,
    },

    /// The spreadsheet could not be read.
    #[error("cannot read spreadsheet {}: {reason}", path.display())]
    SheetRead {
        /// Spreadsheet that failed to open.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// No reader is registered for this spreadsheet extension.
    #[error("unsupported spreadsheet type .{ext}: {}", path.display())]
    UnsupportedTable {
        /// File extension without the leading dot.
        ext: String,
        /// Spreadsheet path as given.
        path: PathBuf,
    },

    /// Zip container error.
    #[error("zip: {0}")]
    Zip(
        /// The wrapped zip error.
        #[from]
        zip::result::ZipError,
    ),
}
