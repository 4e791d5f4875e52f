//! Console host integration for the descant test engine.
//!
//! Provides ready-made [`descant::ReportSink`] implementations (cargo test-like
//! console output and a JSON document) plus the small amount of CLI
//! plumbing a user-owned runner binary needs: parse a [`RunConfig`],
//! hand the consumed root to [`run_with_config`], and turn the summary
//! into an exit code.

pub mod console;
pub mod json;

pub use console::{ConsoleSink, ReporterConfig};
pub use json::{HookDiagnostic, JsonReport, JsonSink, TestRecord};

use clap::Parser;
use descant::{RunSummary, Scope};
use std::fmt;
use std::process::ExitCode;
use std::str::FromStr;
use thiserror::Error;

/// Output format for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// One line per test on stdout, plus a failures section.
    #[default]
    Table,
    /// A single JSON document on stdout after the run.
    Json,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown report format '{0}', expected 'table' or 'json'")]
pub struct ParseFormatError(String);

impl FromStr for ReportFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(ParseFormatError(other.to_string())),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Json => "json",
        })
    }
}

/// Command-line options for a runner binary.
#[derive(Parser, Debug, Clone)]
#[command(about = "Run a descant suite", version)]
pub struct RunConfig {
    /// Echo captured test output as it arrives.
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable ANSI colors.
    #[arg(long)]
    pub no_color: bool,

    /// Output format: table or json.
    #[arg(long, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
}

/// Drive a consumed root through the sink selected by `config` and
/// return the folded summary.
pub async fn run_with_config(root: Scope, config: &RunConfig) -> RunSummary {
    match config.format {
        ReportFormat::Table => {
            let mut sink = ConsoleSink::new(ReporterConfig {
                verbose: config.verbose,
                color: !config.no_color,
            });
            descant::run(root, &mut sink).await
        }
        ReportFormat::Json => {
            let mut sink = JsonSink::new();
            let summary = descant::run(root, &mut sink).await;
            match sink.into_report().to_json_string() {
                Ok(document) => println!("{document}"),
                Err(error) => eprintln!("error: could not render report: {error}"),
            }
            summary
        }
    }
}

/// Process exit status for a finished run; skips do not fail a run.
#[must_use]
pub const fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
