//! CLI argument definitions for the ledger tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "ledger",
    version,
    about = "Inspect, verify and migrate ledger snapshots",
    long_about = "Inspect, verify and migrate ledger snapshot files.\n\n\
                  Reads both the current snapshot format and legacy streams.\n\
                  Every write goes through a temp file and an atomic rename."
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

    /// TOML settings file with [autosave] and [scheduler] sections.
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show a summary of a snapshot file.
    Inspect(InspectArgs),

    /// Load a snapshot and run its consistency check.
    Check(CheckArgs),

    /// Rewrite a snapshot in the current format.
    Migrate(MigrateArgs),

    /// Append postings to a ledger, saving through the autosave worker.
    Record(RecordArgs),
}

#[derive(Parser)]
pub struct InspectArgs {
    /// Snapshot file to read.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Also list every posting.
    #[arg(long = "entries")]
    pub entries: bool,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Snapshot file to verify.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Parser)]
pub struct MigrateArgs {
    /// Snapshot file to convert.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Where to write the converted snapshot (default: replace FILE).
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Rewrite even if the input already uses the current format.
    #[arg(long = "force")]
    pub force: bool,
}

#[derive(Parser)]
pub struct RecordArgs {
    /// Ledger file to update. Created if missing when --create is given.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Account to post to.
    #[arg(long = "account")]
    pub account: String,

    /// Signed amount in minor units (e.g. -4250 for -42.50).
    #[arg(long = "amount", allow_hyphen_values = true)]
    pub amount: i64,

    /// Optional note stored with the posting.
    #[arg(long = "memo")]
    pub memo: Option<String>,

    /// Create a new ledger with this name if FILE does not exist.
    #[arg(long = "create", value_name = "NAME")]
    pub create: Option<String>,

    /// Post the same amount this many times.
    #[arg(long = "repeat", default_value_t = 1)]
    pub repeat: u32,

    /// Autosave delay in milliseconds (overrides the settings file).
    #[arg(long = "autosave-ms", value_name = "MS")]
    pub autosave_ms: Option<u64>,
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
