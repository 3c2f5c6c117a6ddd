//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Each entity leads with its identity (the file name, or the backend name)
//! and follows with indented context lines. Paths show up as given on the
//! command line, never canonicalized.
//!
//! # Output Format
//!
//! ## Identify
//!
//! ```text
//! dawn.jpg
//!     Format: jpeg (image/jpeg)
//!     Size: 4000x3000
//! ```
//!
//! ## Variant / Batch
//!
//! ```text
//! 001 dawn.jpg → out/dawn.webp
//!     Backend: magick
//!     Source: jpeg 4000x3000
//!     Output: webp (image/webp) 1200x900
//! 002 dusk.png
//!     Error: decode failed: ...
//!
//! Wrote 1 variant, 1 failed
//! ```
//!
//! ## Backends
//!
//! ```text
//! Backends (priority: magick, rust)
//! 001 magick: unavailable (magick: No such file or directory)
//! 002 rust: available
//! Selected: rust
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::imaging::{BackendVariant, ImageInfo, VariantSummary};
use std::path::{Path, PathBuf};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Final path component for headers, falling back to the whole path.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn summary_lines(summary: &VariantSummary) -> Vec<String> {
    let source = &summary.source;
    let output = &summary.output;
    vec![
        format!("    Backend: {}", summary.backend),
        format!("    Source: {} {}x{}", source.format, source.width, source.height),
        format!(
            "    Output: {} ({}) {}x{}",
            output.format, output.mimetype, output.width, output.height
        ),
    ]
}

// ============================================================================
// identify
// ============================================================================

pub fn format_identify(path: &Path, info: &ImageInfo) -> Vec<String> {
    vec![
        display_name(path),
        format!("    Format: {} ({})", info.format, info.mimetype),
        format!("    Size: {}x{}", info.width, info.height),
    ]
}

pub fn print_identify(path: &Path, info: &ImageInfo) {
    for line in format_identify(path, info) {
        println!("{}", line);
    }
}

// ============================================================================
// variant / batch
// ============================================================================

/// Format a single-variant result.
pub fn format_variant(source: &Path, output: &Path, summary: &VariantSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "{} \u{2192} {}",
        display_name(source),
        output.display()
    )];
    lines.extend(summary_lines(summary));
    lines
}

pub fn print_variant(source: &Path, output: &Path, summary: &VariantSummary) {
    for line in format_variant(source, output, summary) {
        println!("{}", line);
    }
}

/// What happened to one input of a batch.
#[derive(Debug)]
pub enum BatchOutcome {
    Written {
        output: PathBuf,
        summary: VariantSummary,
    },
    Failed(String),
}

/// Format one batch entry, indexed by its position on the command line.
pub fn format_batch_item(index: usize, source: &Path, outcome: &BatchOutcome) -> Vec<String> {
    match outcome {
        BatchOutcome::Written { output, summary } => {
            let mut lines = vec![format!(
                "{} {} \u{2192} {}",
                format_index(index),
                display_name(source),
                output.display()
            )];
            lines.extend(summary_lines(summary));
            lines
        }
        BatchOutcome::Failed(reason) => vec![
            format!("{} {}", format_index(index), display_name(source)),
            format!("    Error: {}", reason),
        ],
    }
}

/// Format the whole batch: every entry in input order, then a tally.
pub fn format_batch(results: &[(PathBuf, BatchOutcome)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, (source, outcome)) in results.iter().enumerate() {
        lines.extend(format_batch_item(i + 1, source, outcome));
    }

    let failed = results
        .iter()
        .filter(|(_, o)| matches!(o, BatchOutcome::Failed(_)))
        .count();
    let written = results.len() - failed;
    let noun = if written == 1 { "variant" } else { "variants" };
    lines.push(String::new());
    if failed == 0 {
        lines.push(format!("Wrote {} {}", written, noun));
    } else {
        lines.push(format!("Wrote {} {}, {} failed", written, noun, failed));
    }
    lines
}

pub fn print_batch(results: &[(PathBuf, BatchOutcome)]) {
    for line in format_batch(results) {
        println!("{}", line);
    }
}

// ============================================================================
// backends
// ============================================================================

/// Format the probe report for every variant plus the resolved choice.
pub fn format_backend_report(
    priority: &[BackendVariant],
    report: &[(BackendVariant, Result<(), String>)],
    selected: Result<BackendVariant, String>,
) -> Vec<String> {
    let order = priority
        .iter()
        .map(|v| v.name())
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![format!("Backends (priority: {})", order)];

    for (i, (variant, status)) in report.iter().enumerate() {
        let status = match status {
            Ok(()) => "available".to_string(),
            Err(reason) => format!("unavailable ({})", reason),
        };
        lines.push(format!("{} {}: {}", format_index(i + 1), variant, status));
    }

    lines.push(match selected {
        Ok(variant) => format!("Selected: {}", variant),
        Err(reason) => format!("Selected: none ({})", reason),
    });
    lines
}

pub fn print_backend_report(
    priority: &[BackendVariant],
    report: &[(BackendVariant, Result<(), String>)],
    selected: Result<BackendVariant, String>,
) {
    for line in format_backend_report(priority, report, selected) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
