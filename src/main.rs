mod archive;
mod commands;
mod config;
mod diagnostics;
mod docx;
mod error;
mod events;
mod info;
mod logging;
mod mapping;
mod rewriter;
mod scanner;
mod sheet;
mod types;
mod walker;
mod xml;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::commands::LinkArgs;
use crate::config::ColumnNames;
use crate::logging::{LogConfig, LogFormat};

#[derive(Parser)]
#[command(name = "evlink", version, about = "Attach evidence hyperlinks to bracketed codes in DOCX documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Append log records to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log record format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Dry run: list every code and whether it has a link (exit 1 if any does not)
    Check {
        #[command(flatten)]
        inputs: Inputs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a spreadsheet's header row and the guessed columns
    Headers {
        /// Spreadsheet (.xlsx, .xlsm, .csv)
        table: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a reference document (code syntax, config, exit codes, current state)
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Turn every mapped code in the document into a hyperlink
    Run {
        #[command(flatten)]
        inputs: Inputs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output document (default: <input>_linked.docx next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Inputs shared by `run` and `check`.
#[derive(Args)]
struct Inputs {
    /// Column holding the codes
    #[arg(long)]
    code_column: Option<String>,
    /// Word document (.docx)
    #[arg(long)]
    doc: PathBuf,
    /// Column holding the URLs
    #[arg(long)]
    link_column: Option<String>,
    /// Column holding tooltip text
    #[arg(long)]
    summary_column: Option<String>,
    /// Mapping spreadsheet (.xlsx, .xlsm, .csv)
    #[arg(long)]
    table: PathBuf,
}

impl Inputs {
    /// Convert to command arguments.
    fn into_link_args(self, output: Option<PathBuf>) -> LinkArgs {
        return LinkArgs {
            columns: ColumnNames { code: self.code_column, link: self.link_column, summary: self.summary_column },
            doc: self.doc,
            output,
            table: self.table,
        };
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbosity(cli.verbose, cli.quiet)
        .with_format(cli.log_format)
        .with_log_file(cli.log_file);
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("warning: logging disabled: {e}");
    }

    let result = match cli.command {
        Commands::Check { inputs, json } => commands::check(inputs.into_link_args(None), json),
        Commands::Headers { table, json } => commands::headers(&table, json).map(|()| return ExitCode::SUCCESS),
        Commands::Info { json } => {
            commands::info(json);
            Ok(ExitCode::SUCCESS)
        },
        Commands::Run { inputs, json, output } => commands::run(inputs.into_link_args(output), json),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            diagnostics::print_error(&e);
            // clap exits with 2 on bad arguments; 3 = runtime error, 4 = output locked.
            if matches!(e, error::Error::OutputLocked { .. }) { ExitCode::from(4) } else { ExitCode::from(3) }
        },
    };
}
