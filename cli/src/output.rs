//! Output formatting utilities for CLI commands
//!
//! The report goes to stdout (or a file); status lines go to stderr so they
//! never mix with the JSON.

use anyhow::{Context, Result};
use colored::Colorize;
use gpuctr_shared::GpuReport;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Write a report to `path`, or to stdout when no path is given
pub fn write_report(report: &GpuReport, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_json(report, BufWriter::new(file))
        }
        None => write_json(report, std::io::stdout().lock()),
    }
}

/// Pretty-print a value as JSON and flush the writer
pub fn write_json<T: Serialize, W: Write>(value: &T, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value).context("Failed to serialize report")?;
    writeln!(writer)?;
    writer.flush().context("Failed to flush report output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuctr_shared::DeviceMetrics;

    #[test]
    fn test_write_report_to_file() {
        let mut gpu = DeviceMetrics::new(0);
        gpu.push("SQ_WAVES", 42.0);
        let report = GpuReport { gpus: vec![gpu] };

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("report.json");
        write_report(&report, Some(&path)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: GpuReport = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed, report);
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_write_report_bad_path() {
        let report = GpuReport::new();
        let err = write_report(&report, Some(Path::new("/nonexistent/dir/report.json")));
        assert!(err.is_err());
    }
}
