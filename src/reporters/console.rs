//! Human-readable terminal report.

use std::fmt::Write;

use super::{average_cost, Reporter};
use crate::error::ReportError;
use crate::schemas::{BenchmarkResult, ExecutionResult, ExecutionStatus};

const WIDTH: usize = 70;

/// Plain-text summary for terminals and CI logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }

    fn status_marker(result: &ExecutionResult) -> &'static str {
        match result.status {
            ExecutionStatus::Completed if result.success => "[PASS]",
            ExecutionStatus::Completed => "[FAIL]",
            ExecutionStatus::Failed => "[ERROR]",
            ExecutionStatus::Timeout => "[TIMEOUT]",
            ExecutionStatus::Cancelled => "[CANCELLED]",
            ExecutionStatus::Pending | ExecutionStatus::Running => "[?]",
        }
    }
}

impl Reporter for ConsoleReporter {
    fn generate(&self, result: &BenchmarkResult) -> Result<String, ReportError> {
        let rule = "=".repeat(WIDTH);
        let thin = "-".repeat(WIDTH);
        let mut out = String::new();

        writeln!(out, "{}", rule)?;
        writeln!(out, "  Benchmark Results: {}", result.benchmark_name)?;
        writeln!(out, "{}", rule)?;

        writeln!(out, "\nSummary")?;
        writeln!(out, "{}", thin)?;
        writeln!(out, "Adapter:              {}", result.adapter_name)?;
        writeln!(out, "Total Time:           {:.2}s", result.total_time)?;
        writeln!(out, "Average Task Time:    {:.2}s", result.average_execution_time)?;
        writeln!(out)?;
        writeln!(out, "Total Tasks:          {}", result.total_tasks)?;
        writeln!(out, "Successful:           {}", result.successful_tasks)?;
        writeln!(out, "Failed:               {}", result.failed_tasks)?;
        writeln!(out, "Success Rate:         {:.1}%", result.success_rate() * 100.0)?;

        let usage = &result.total_token_usage;
        if !usage.is_empty() {
            writeln!(out, "\nToken Usage")?;
            writeln!(out, "{}", thin)?;
            writeln!(out, "Input Tokens:         {}", group_thousands(usage.input_tokens))?;
            writeln!(out, "Output Tokens:        {}", group_thousands(usage.output_tokens))?;
            writeln!(out, "Total Tokens:         {}", group_thousands(usage.total_tokens))?;
        }

        if result.total_cost > 0.0 {
            writeln!(out)?;
            writeln!(out, "Total Cost:           ${:.6} USD", result.total_cost)?;
            writeln!(out, "Average Cost/Task:    ${:.6} USD", average_cost(result))?;
        }

        writeln!(out, "\nTask Details")?;
        writeln!(out, "{}", thin)?;

        for (i, task) in result.task_results.iter().enumerate() {
            writeln!(out, "\n{} Task {}: {}", Self::status_marker(task), i + 1, task.task_id)?;
            writeln!(out, "   Status:        {}", task.status)?;
            writeln!(out, "   Success:       {}", task.success)?;
            writeln!(out, "   Time:          {:.2}s", task.execution_time)?;
            if let Some(usage) = task.token_usage {
                writeln!(out, "   Tokens:        {}", group_thousands(usage.total_tokens))?;
            }
            if let Some(cost) = task.cost.filter(|c| *c > 0.0) {
                writeln!(out, "   Cost:          ${:.6}", cost)?;
            }
            writeln!(out, "   Validated:     {}", task.validation_passed)?;
            if let Some(error) = &task.error {
                writeln!(out, "   Error:         {}", error)?;
            }
        }

        let failed = result.failed_tasks_view();
        if !failed.is_empty() {
            writeln!(out, "\nFailed Tasks")?;
            writeln!(out, "{}", thin)?;
            for task in failed {
                let reason = task.error.as_deref().unwrap_or(match task.status {
                    ExecutionStatus::Completed => "Success criteria not met",
                    _ => "Unknown error",
                });
                writeln!(out, "  - {}: {}", task.task_id, reason)?;
            }
        }

        write!(out, "\n{}", rule)?;
        Ok(out)
    }
}

/// `1234567` -> `1,234,567`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
