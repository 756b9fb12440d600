//! CLI argument definitions for the donor cohort pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use donor_cohort::DEFAULT_GAP_HOURS;

#[derive(Parser)]
#[command(
    name = "donor-cohort",
    version,
    about = "CLIF potential organ donor cohort derivation",
    long_about = "Derive the potential organ donor cohort from a site's CLIF tables.\n\n\
                  Identifies inpatient decedents, derives cause-of-death, ventilation,\n\
                  organ-quality, and infection flags, and writes the final cohort with\n\
                  attrition and strobe counts."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow patient-level values (PHI) in log output.
    ///
    /// By default ids, timestamps, and codes are replaced by a redaction
    /// placeholder wherever a log line would carry them.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Derive the donor cohort from a site's CLIF tables.
    Run(RunArgs),

    /// List the CLIF tables the pipeline reads and their required columns.
    Tables,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Directory containing the site's clif_<table> files.
    #[arg(value_name = "TABLES_DIR")]
    pub tables_dir: PathBuf,

    /// Source file format.
    #[arg(long = "file-type", value_enum, default_value = "parquet")]
    pub file_type: FileTypeArg,

    /// Site label for logs and the summary (default: tables directory name).
    #[arg(long = "site", value_name = "NAME")]
    pub site: Option<String>,

    /// Output directory for generated files (default: <TABLES_DIR>/output).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Outlier range configuration (JSON). Values outside their range are
    /// nulled before derivation.
    #[arg(long = "outlier-config", value_name = "PATH")]
    pub outlier_config: Option<PathBuf>,

    /// Contraindication ICD-10-CM code list (CSV with an ICD-10-CM column).
    #[arg(long = "contraindications", value_name = "PATH")]
    pub contraindications: Option<PathBuf>,

    /// Readmission gap in hours: hospitalizations closer than this are
    /// stitched into one encounter block.
    #[arg(long = "gap-hours", value_name = "HOURS", default_value_t = DEFAULT_GAP_HOURS)]
    pub gap_hours: i64,

    /// Derive and report without writing output files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

/// Source table file format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum FileTypeArg {
    Csv,
    Parquet,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
