//! Logging setup: `tracing` records rendered by `tracing-subscriber`.
//!
//! - `error`/`warn`: fatal problems, ignored configuration
//! - `info`: mapping loaded, tables entered, document written
//! - `debug`: per-paragraph results, unresolved codes
//! - `trace`: per-row spreadsheet values
//!
//! Records go to stderr unless a log file is given, so stdout stays reserved
//! for command output.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// How logging should be set up.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// Maximum level for this crate's records.
    pub level: Level,
    /// Append records to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Color output (ignored for JSON and files).
    pub with_ansi: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Single-line records.
    Compact,
    /// One JSON object per record.
    Json,
    /// Human-readable multi-field records.
    #[default]
    Pretty,
}

/// `MakeWriter` over a file shared between threads.
#[derive(Clone)]
struct SharedFileWriter {
    /// The open log file.
    file: Arc<Mutex<File>>,
}

/// Writer handed out per record by [`SharedFileWriter`].
struct SharedFileGuard {
    /// The open log file.
    file: Arc<Mutex<File>>,
}

impl Default for LogConfig {
    fn default() -> Self {
        return Self { format: LogFormat::default(), level: Level::WARN, log_file: None, with_ansi: true };
    }
}

impl LogConfig {
    /// Level from the `-v` count and `-q` flag.
    ///
    /// `-q` shows errors only; otherwise warnings by default, `-v` info,
    /// `-vv` debug, `-vvv` and beyond trace.
    #[must_use]
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => Level::WARN,
            (false, 1) => Level::INFO,
            (false, 2) => Level::DEBUG,
            (false, _) => Level::TRACE,
        };
        return Self { level, ..Self::default() };
    }

    /// Set the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        return self;
    }

    /// Set the log file (stderr when `None`).
    #[must_use]
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.with_ansi = false;
        }
        self.log_file = path;
        return self;
    }
}

impl<'a> MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        return SharedFileGuard { file: Arc::clone(&self.file) };
    }
}

impl SharedFileWriter {
    /// Wrap an open file.
    fn new(file: File) -> Self {
        return Self { file: Arc::new(Mutex::new(file)) };
    }
}

impl Write for SharedFileGuard {
    fn flush(&mut self) -> io::Result<()> {
        let mut file = self.file.lock().map_err(|_poisoned| return io::Error::other("log file lock poisoned"))?;
        return file.flush();
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock().map_err(|_poisoned| return io::Error::other("log file lock poisoned"))?;
        return file.write(buf);
    }
}

/// Filter from `RUST_LOG` if set, else this crate at `level` and
/// dependencies at `warn`.
fn build_env_filter(level: Level) -> EnvFilter {
    return EnvFilter::try_from_default_env().unwrap_or_else(|_unset| {
        let level = level.as_str().to_lowercase();
        return EnvFilter::new(format!("warn,evlink={level}"));
    });
}

/// Install the global subscriber. Call once, before any command runs.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    return match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            init_logging_with_writer(config, SharedFileWriter::new(file))
        },
        None => init_logging_with_writer(config, io::stderr),
    };
}

/// Install the global subscriber with a custom writer.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
fn init_logging_with_writer<W>(config: &LogConfig, writer: W) -> io::Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = build_env_filter(config.level);
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(writer).with_ansi(config.with_ansi).with_target(false).without_time())
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer).with_target(true)).try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(writer).with_ansi(config.with_ansi).with_target(false).without_time())
            .try_init(),
    };
    return installed.map_err(io::Error::other);
}
