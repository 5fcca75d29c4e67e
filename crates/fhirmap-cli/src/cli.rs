//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Args, Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use std::path::PathBuf;

/// fhirmap - map source records to clinical resources and back
///
/// Runs mapping configurations from a store file over CSV/JSON input or a
/// remote server and writes the resulting records as NDJSON.
#[derive(Parser, Debug)]
#[command(
    name = "fhirmap",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "FHIRMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for summaries and reports
    #[arg(short, long, value_enum, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Map CSV or JSON source records to target resources
    Transform(TransformArgs),

    /// Fetch target resources from a server and flatten them to source records
    Extract(ExtractArgs),

    /// Resolve a mapping and report configuration problems without running it
    Check(CheckArgs),

    /// Show how a mapping path is parsed
    Path(PathArgs),
}

/// Options shared by the commands that read the store
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Store file with mappings and schemas (YAML or JSON)
    #[arg(long, env = "FHIRMAP_STORE")]
    pub store: Option<PathBuf>,
}

/// Arguments for the transform command
#[derive(Parser, Debug)]
pub struct TransformArgs {
    /// Mapping configuration name or id
    #[arg(short, long)]
    pub mapping: String,

    /// Input file, `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub input: PathBuf,

    /// Write NDJSON records to a file instead of stdout
    #[arg(long = "save-to", value_name = "OUTPUT_FILE")]
    pub save_to: Option<PathBuf>,

    /// Deliver produced resources to the configured server
    #[arg(long)]
    pub deliver: bool,

    /// Exit with a failure code when any item was rejected
    #[arg(long)]
    pub fail_on_error: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Arguments for the extract command
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Mapping configuration name or id
    #[arg(short, long)]
    pub mapping: String,

    /// Search query, e.g. `Patient?gender=female`
    #[arg(long)]
    pub query: String,

    /// Server base URL (overrides the configured one)
    #[arg(long, env = "FHIRMAP_SERVER_URL")]
    pub server: Option<String>,

    /// Write NDJSON records to a file instead of stdout
    #[arg(long = "save-to", value_name = "OUTPUT_FILE")]
    pub save_to: Option<PathBuf>,

    /// Exit with a failure code when any item was rejected
    #[arg(long)]
    pub fail_on_error: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Mapping configuration name or id; all mappings when omitted
    #[arg(short, long)]
    pub mapping: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Arguments for the path command
#[derive(Parser, Debug)]
pub struct PathArgs {
    /// Path expression, e.g. `identifier[?system='urn:cns'].value`
    pub path: String,
}

/// Output format options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    JsonPretty,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stderr().is_terminal()
    }
}
