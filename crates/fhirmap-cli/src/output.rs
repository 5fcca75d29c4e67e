//! Output formatting and writing utilities
//!
//! Reports (run summaries, mapping checks, parsed paths) are rendered in the
//! selected [`OutputFormat`]. Pipeline records always go out as NDJSON
//! through a [`RecordWriter`].

use crate::cli::OutputFormat;
use crate::error::Result;
use colored::Colorize;
use fhirmap_core::{Direction, PathSegment};
use indicatif::{ProgressBar, ProgressStyle};
use is_terminal::IsTerminal;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Trait for formatting output with specialized support for reports
pub trait OutputFormatter {
    /// Format a serializable value
    fn format<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Format a run summary
    fn format_summary(&self, summary: &RunSummary) -> Result<String>;

    /// Format mapping check results
    fn format_check(&self, entries: &[CheckEntry]) -> Result<String>;

    /// Format a parsed path
    fn format_path(&self, report: &PathReport) -> Result<String>;
}

impl OutputFormatter for OutputFormat {
    fn format<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => Ok(serde_json::to_string(value)?),
            OutputFormat::JsonPretty | OutputFormat::Human => Ok(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }

    fn format_summary(&self, summary: &RunSummary) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_summary_human(summary)),
            _ => self.format(summary),
        }
    }

    fn format_check(&self, entries: &[CheckEntry]) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_check_human(entries)),
            _ => self.format(&entries),
        }
    }

    fn format_path(&self, report: &PathReport) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_path_human(report)),
            _ => self.format(report),
        }
    }
}

/// Counts and metadata of one finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mapping: String,
    pub direction: Direction,
    pub run_id: String,
    pub items_read: u64,
    pub data_records: u64,
    pub error_records: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryCounts>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Outcome of delivering produced resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub delivered: u64,
    pub failed: u64,
    /// Still in flight when the wait ended
    pub pending: u64,
}

/// Check result of one mapping configuration
#[derive(Debug, Clone, Serialize)]
pub struct CheckEntry {
    pub mapping: String,
    pub direction: Direction,
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// One parsed segment of a path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentView {
    pub kind: &'static str,
    pub text: String,
}

impl From<&PathSegment> for SegmentView {
    fn from(segment: &PathSegment) -> Self {
        let kind = match segment {
            PathSegment::Property(_) => "property",
            PathSegment::Index(_) => "index",
            PathSegment::SlicedProperty { .. } => "slice",
            PathSegment::Predicate { .. } => "predicate",
        };
        Self {
            kind,
            text: segment.to_string(),
        }
    }
}

/// Parsed form of a path expression
#[derive(Debug, Clone, Serialize)]
pub struct PathReport {
    pub path: String,
    pub segments: Vec<SegmentView>,
    /// Index- and predicate-free form used for schema lookups
    pub base: String,
}

/// Output writer that handles different output formats and colors
pub struct OutputWriter {
    format: OutputFormat,
    use_color: bool,
    show_progress: bool,
    quiet: bool,
    writer: Box<dyn Write + Send>,
}

impl OutputWriter {
    /// Create a new output writer on stdout
    pub fn new(format: OutputFormat, use_color: bool, quiet: bool) -> Self {
        Self {
            format,
            use_color,
            show_progress: !quiet && io::stderr().is_terminal(),
            quiet,
            writer: Box::new(io::stdout()),
        }
    }

    /// Create an output writer with a custom writer
    pub fn with_writer(format: OutputFormat, use_color: bool, quiet: bool, writer: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            use_color,
            // No progress bars with custom writers
            show_progress: false,
            quiet,
            writer,
        }
    }

    /// Send reports to stderr, leaving stdout to NDJSON records
    pub fn move_to_stderr(&mut self) {
        self.writer = Box::new(io::stderr());
    }

    /// Get the output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write raw output
    pub fn write(&mut self, content: &str) -> Result<()> {
        write!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write a line of output
    pub fn writeln(&mut self, content: &str) -> Result<()> {
        writeln!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write an info message
    pub fn info(&mut self, message: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }
        if self.use_color {
            self.writeln(&format!("{} {}", "ℹ".blue(), message))
        } else {
            self.writeln(&format!("INFO: {}", message))
        }
    }

    /// Write a success message
    pub fn success(&mut self, message: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }
        if self.use_color {
            self.writeln(&message.green().to_string())
        } else {
            self.writeln(message)
        }
    }

    /// Write a warning message
    pub fn warning(&mut self, message: &str) -> Result<()> {
        if self.format != OutputFormat::Human {
            return Ok(());
        }
        if self.use_color {
            self.writeln(&message.yellow().to_string())
        } else {
            self.writeln(&format!("WARNING: {}", message))
        }
    }

    /// Write a run summary
    pub fn summary(&mut self, summary: &RunSummary) -> Result<()> {
        if self.quiet && self.format == OutputFormat::Human {
            return Ok(());
        }
        let formatted = self.format.format_summary(summary)?;
        let formatted = if self.use_color && self.format == OutputFormat::Human {
            colorize_counts(&formatted, summary)
        } else {
            formatted
        };
        self.writeln(formatted.trim_end())
    }

    /// Write mapping check results
    pub fn check(&mut self, entries: &[CheckEntry]) -> Result<()> {
        let formatted = self.format.format_check(entries)?;
        self.writeln(formatted.trim_end())
    }

    /// Write a parsed path
    pub fn path(&mut self, report: &PathReport) -> Result<()> {
        let formatted = self.format.format_path(report)?;
        self.writeln(formatted.trim_end())
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(default_spinner_style());
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }
}

/// Helper function to create a spinner style
pub fn default_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Buffered NDJSON sink for pipeline records
pub struct RecordWriter {
    inner: BufWriter<Box<dyn Write + Send>>,
    lines: u64,
}

impl RecordWriter {
    /// Write to `path`, or to stdout when `None`
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let inner: Box<dyn Write + Send> = match path {
            Some(path) => Box::new(File::create(path)?),
            None => Box::new(io::stdout()),
        };
        Ok(Self::from_writer(inner))
    }

    pub fn from_writer(inner: Box<dyn Write + Send>) -> Self {
        Self {
            inner: BufWriter::new(inner),
            lines: 0,
        }
    }

    /// Write one newline-terminated line
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner.write_all(line.as_bytes())?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn finish(mut self) -> Result<u64> {
        self.inner.flush()?;
        Ok(self.lines)
    }
}

fn format_summary_human(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!("=== {} ({}) ===\n", summary.mapping, summary.direction));
    output.push_str(&format!("  Run:      {}\n", summary.run_id));
    output.push_str(&format!("  Read:     {}\n", summary.items_read));
    output.push_str(&format!("  Produced: {}\n", summary.data_records));
    output.push_str(&format!("  Rejected: {}\n", summary.error_records));
    output.push_str(&format!("  Duration: {}ms\n", summary.duration_ms));
    if let Some(file) = &summary.output_file {
        output.push_str(&format!("  Output:   {}\n", file));
    }
    if let Some(delivery) = &summary.delivery {
        output.push_str(&format!(
            "  Delivery: {} delivered, {} failed, {} pending\n",
            delivery.delivered, delivery.failed, delivery.pending
        ));
    }
    for warning in &summary.warnings {
        output.push_str(&format!("  ! {}\n", warning));
    }
    output
}

fn colorize_counts(rendered: &str, summary: &RunSummary) -> String {
    let produced = format!("  Produced: {}", summary.data_records);
    let rejected = format!("  Rejected: {}", summary.error_records);
    let rejected_colored = if summary.error_records > 0 {
        rejected.red().to_string()
    } else {
        rejected.clone()
    };
    rendered
        .replacen(&produced, &produced.green().to_string(), 1)
        .replacen(&rejected, &rejected_colored, 1)
}

fn format_check_human(entries: &[CheckEntry]) -> String {
    if entries.is_empty() {
        return "No mappings in store\n".to_string();
    }

    let mut output = String::new();
    for entry in entries {
        let status = if entry.valid { "ok" } else { "INVALID" };
        output.push_str(&format!("{} ({}): {}\n", entry.mapping, entry.direction, status));
        for problem in &entry.problems {
            output.push_str(&format!("  x {}\n", problem));
        }
        for warning in &entry.warnings {
            output.push_str(&format!("  ! {}\n", warning));
        }
    }
    output
}

fn format_path_human(report: &PathReport) -> String {
    let mut output = format!("{}\n", report.path);
    if report.segments.is_empty() {
        output.push_str("  (empty path)\n");
        return output;
    }

    let width = report.segments.iter().map(|s| s.kind.len()).max().unwrap_or(0);
    for (position, segment) in report.segments.iter().enumerate() {
        output.push_str(&format!(
            "  {:>2}. {:width$}  {}\n",
            position + 1,
            segment.kind,
            segment.text,
            width = width
        ));
    }
    output.push_str(&format!("  base: {}\n", report.base));
    output
}
