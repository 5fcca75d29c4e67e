//! Path command handler

use crate::cli::PathArgs;
use crate::error::Result;
use crate::output::{OutputWriter, PathReport, SegmentView};
use fhirmap_core::path::{base_path, parse_path};

/// Handle the path command
pub fn handle_path(args: PathArgs, output: &mut OutputWriter) -> Result<()> {
    output.path(&report(&args.path))
}

fn report(path: &str) -> PathReport {
    PathReport {
        path: path.to_string(),
        segments: parse_path(path).iter().map(SegmentView::from).collect(),
        base: base_path(path),
    }
}
