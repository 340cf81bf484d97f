//! Machine-readable JSON report.

use serde_json::{json, Value};

use super::{average_cost, Reporter};
use crate::error::ReportError;
use crate::metrics::{evaluate_benchmark, MetricKind};
use crate::schemas::BenchmarkResult;

/// Pretty-printed JSON with `benchmark`, `summary`, `token_usage`, `cost`,
/// `tasks` and `config` sections.
#[derive(Debug, Clone, Default)]
pub struct JsonReporter {
    metrics: Vec<MetricKind>,
    compact: bool,
}

impl JsonReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `metrics` section with these aggregated evaluation metrics.
    pub fn with_metrics(mut self, metrics: impl Into<Vec<MetricKind>>) -> Self {
        self.metrics = metrics.into();
        self
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    fn build(&self, result: &BenchmarkResult) -> Result<Value, ReportError> {
        let tasks: Vec<Value> = result
            .task_results
            .iter()
            .map(|task| {
                json!({
                    "task_id": task.task_id,
                    "status": task.status,
                    "success": task.success,
                    "execution_time": task.execution_time,
                    "token_usage": task.token_usage,
                    "cost": task.cost,
                    "error": task.error,
                    "validation_passed": task.validation_passed,
                })
            })
            .collect();

        let mut report = json!({
            "benchmark": {
                "name": result.benchmark_name,
                "adapter": result.adapter_name,
                "start_time": result.start_time.to_rfc3339(),
                "end_time": result.end_time.to_rfc3339(),
                "total_time": result.total_time,
            },
            "summary": {
                "total_tasks": result.total_tasks,
                "successful_tasks": result.successful_tasks,
                "failed_tasks": result.failed_tasks,
                "success_rate": result.success_rate(),
                "average_execution_time": result.average_execution_time,
            },
            "token_usage": result.total_token_usage,
            "cost": {
                "total_usd": result.total_cost,
                "average_per_task": average_cost(result),
            },
            "tasks": tasks,
            "config": serde_json::to_value(&result.config)?,
            "metadata": result.metadata,
        });

        if !self.metrics.is_empty() {
            report["metrics"] = serde_json::to_value(evaluate_benchmark(result, &self.metrics))?;
        }

        Ok(report)
    }
}

impl Reporter for JsonReporter {
    fn generate(&self, result: &BenchmarkResult) -> Result<String, ReportError> {
        let report = self.build(result)?;
        let text = if self.compact {
            serde_json::to_string(&report)?
        } else {
            serde_json::to_string_pretty(&report)?
        };
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::executor::aggregate_results;
    use crate::schemas::{ExecutionResult, TokenUsage};
    use chrono::Utc;

    fn sample() -> BenchmarkResult {
        let results = vec![
            ExecutionResult::completed("a", "fake/model", Utc::now(), 2.0, "4", true)
                .with_usage(TokenUsage::new(10, 5), 0.5),
            ExecutionResult::failed("b", "fake/model", Utc::now(), 0.0, "boom"),
        ];
        let config = ExecutorConfig::default();
        aggregate_results("suite", Utc::now(), "fake/model", &config, results)
    }

    #[test]
    fn test_json_report_sections() {
        let text = JsonReporter::new().generate(&sample()).unwrap();
        let report: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(report["benchmark"]["name"], "suite");
        assert_eq!(report["summary"]["total_tasks"], 2);
        assert_eq!(report["summary"]["success_rate"], 0.5);
        assert_eq!(report["token_usage"]["total_tokens"], 15);
        assert_eq!(report["cost"]["average_per_task"], 0.25);
        assert_eq!(report["tasks"][1]["status"], "failed");
        assert_eq!(report["tasks"][1]["error"], "boom");
        assert_eq!(report["config"]["max_turns"], 10);
        assert!(report.get("metrics").is_none());
    }

    #[test]
    fn test_json_report_with_metrics() {
        let reporter = JsonReporter::new()
            .with_metrics(vec![MetricKind::CompletionRate, MetricKind::ApiCost])
            .compact();
        let text = reporter.generate(&sample()).unwrap();
        assert!(!text.contains('\n'));

        let report: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(report["metrics"][0]["name"], "completion_rate");
        assert_eq!(report["metrics"][0]["value"], 0.5);
        assert_eq!(report["metrics"][1]["value"], 0.25);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/nested/run.json");
        JsonReporter::new().save(&sample(), &path).unwrap();
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["summary"]["failed_tasks"], 1);
    }
}
