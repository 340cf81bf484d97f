//! Fold of per-task results into a benchmark summary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::schemas::{BenchmarkResult, ExecutionResult, TokenUsage};

/// Builds the benchmark-level summary for a finished run.
///
/// Never fails: an empty result list yields zero counts and averages.
/// `total_time` is wall-clock time since `start_time`, not the sum of task
/// times, since tasks may overlap.
pub fn aggregate_results(
    benchmark_name: &str,
    start_time: DateTime<Utc>,
    adapter_name: &str,
    config: &ExecutorConfig,
    results: Vec<ExecutionResult>,
) -> BenchmarkResult {
    let end_time = Utc::now();

    let total_tasks = results.len();
    let successful_tasks = results.iter().filter(|r| r.is_successful()).count();
    let failed_tasks = total_tasks - successful_tasks;

    let total_token_usage: TokenUsage = results.iter().filter_map(|r| r.token_usage).sum();
    let total_cost: f64 = results.iter().map(|r| r.cost.unwrap_or(0.0)).sum();

    let average_execution_time = if total_tasks == 0 {
        0.0
    } else {
        results.iter().map(|r| r.execution_time).sum::<f64>() / total_tasks as f64
    };

    let total_time = (end_time - start_time)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    BenchmarkResult {
        benchmark_name: benchmark_name.to_string(),
        start_time,
        end_time,
        total_time,
        task_results: results,
        total_tasks,
        successful_tasks,
        failed_tasks,
        total_token_usage,
        total_cost,
        average_execution_time,
        adapter_name: adapter_name.to_string(),
        config: config.clone(),
        metadata: HashMap::from([(
            "run_id".to_string(),
            serde_json::json!(Uuid::new_v4().to_string()),
        )]),
    }
}
