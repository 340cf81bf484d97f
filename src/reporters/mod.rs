//! Rendering of benchmark results for people and machines.

mod console;
mod json;

use std::fs;
use std::path::Path;

pub use console::ConsoleReporter;
pub use json::JsonReporter;

use crate::error::ReportError;
use crate::schemas::BenchmarkResult;

/// Turns a [`BenchmarkResult`] into a report.
pub trait Reporter {
    /// Renders the report as text.
    fn generate(&self, result: &BenchmarkResult) -> Result<String, ReportError>;

    /// Renders the report and writes it to `path`, creating parent directories.
    fn save(&self, result: &BenchmarkResult, path: &Path) -> Result<(), ReportError> {
        let content = self.generate(result)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        tracing::info!(path = %path.display(), "Report saved");
        Ok(())
    }

    /// Renders the report to stdout.
    fn print(&self, result: &BenchmarkResult) -> Result<(), ReportError> {
        println!("{}", self.generate(result)?);
        Ok(())
    }
}

/// Average cost per task, 0.0 for an empty run.
pub(crate) fn average_cost(result: &BenchmarkResult) -> f64 {
    if result.total_tasks == 0 {
        0.0
    } else {
        result.total_cost / result.total_tasks as f64
    }
}
