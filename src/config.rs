use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::mapping::{self, ColumnSelection};

/// Config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".evlink.toml";

/// Output file suffix when neither the command line nor the config sets one.
pub const DEFAULT_SUFFIX: &str = "_linked";

/// Column names from the `[columns]` table or the command line.
/// Unset names are guessed from the header row. The summary column is only
/// guessed when neither the code nor the link column is named.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ColumnNames {
    /// Code column.
    #[serde(default)]
    pub code: Option<String>,
    /// Link column.
    #[serde(default)]
    pub link: Option<String>,
    /// Summary (tooltip) column.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Project configuration loaded from `.evlink.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct Config {
    /// Default column names.
    #[serde(default)]
    pub columns: ColumnNames,
    /// Output naming.
    #[serde(default)]
    pub output: OutputConfig,
}

/// The `[output]` table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct OutputConfig {
    /// Appended to the input file stem to name the output.
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

/// Everything one linking run needs, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Spreadsheet column names.
    pub columns: ColumnSelection,
    /// Document to read.
    pub input_doc: PathBuf,
    /// Spreadsheet to read the mapping from.
    pub input_table: PathBuf,
    /// Where the linked document is written.
    pub output_path: PathBuf,
}

impl ColumnNames {
    /// True when nothing is left to guess, so the header row is not needed.
    pub const fn is_complete(&self) -> bool {
        return self.code.is_some() && self.link.is_some();
    }

    /// Fill unset names from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &Self) -> Self {
        return Self {
            code: self.code.or_else(|| return fallback.code.clone()),
            link: self.link.or_else(|| return fallback.link.clone()),
            summary: self.summary.or_else(|| return fallback.summary.clone()),
        };
    }

    /// Resolve to concrete columns, guessing from `headers` where unset.
    pub fn resolve(self, headers: &[String]) -> ColumnSelection {
        let guess = mapping::guess_columns(headers);
        let guess_summary = self.code.is_none() && self.link.is_none();
        return ColumnSelection {
            code: self.code.unwrap_or(guess.code),
            link: self.link.unwrap_or(guess.link),
            summary: self.summary.or(guess.summary.filter(|_| return guess_summary)),
        };
    }
}

impl Config {
    /// Load config from `.evlink.toml` in the given directory.
    /// Returns defaults if the file doesn't exist.
    /// Returns an error if the file exists but is malformed; a config the user
    /// wrote is never silently replaced by defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            },
            Err(e) => return Err(Error::Io(e)),
        };

        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        return Ok(config);
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        return Self { suffix: default_suffix() };
    }
}

/// `report.docx` -> `report_linked.docx`, next to the input.
pub fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input.file_stem().map_or_else(|| return "output".into(), |s| return s.to_string_lossy());
    return input.with_file_name(format!("{stem}{suffix}.docx"));
}

/// Serde default for [`OutputConfig::suffix`].
fn default_suffix() -> String {
    return DEFAULT_SUFFIX.to_string();
}
