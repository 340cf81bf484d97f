//! High-level recording interface over the Prometheus series.

use super::prometheus::{
    COST_USD_TOTAL, TASKS_IN_FLIGHT, TASKS_TOTAL, TASK_DURATION, TOKENS_TOTAL,
};
use crate::schemas::ExecutionResult;

/// Records benchmark activity into the process metrics.
///
/// Every method is a no-op until [`init_metrics`](super::init_metrics) has
/// been called, so library users who never export metrics pay nothing.
///
/// # Example
///
/// ```ignore
/// use agent_eval::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.task_started();
/// // ... run the task ...
/// collector.task_finished();
/// collector.record_result(&result);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of one task attempt.
    pub fn record_result(&self, result: &ExecutionResult) {
        let status = result.status.to_string();
        let adapter = result.adapter_name.as_str();

        if let Some(tasks_total) = TASKS_TOTAL.get() {
            tasks_total.with_label_values(&[&status, adapter]).inc();
        }

        if let Some(task_duration) = TASK_DURATION.get() {
            task_duration
                .with_label_values(&[adapter])
                .observe(result.execution_time);
        }

        if let (Some(tokens_total), Some(usage)) = (TOKENS_TOTAL.get(), result.token_usage) {
            tokens_total
                .with_label_values(&[adapter, "input"])
                .inc_by(usage.input_tokens);
            tokens_total
                .with_label_values(&[adapter, "output"])
                .inc_by(usage.output_tokens);
        }

        if let (Some(cost_total), Some(cost)) = (COST_USD_TOTAL.get(), result.cost) {
            // Counters reject negative increments.
            if cost > 0.0 {
                cost_total.with_label_values(&[adapter]).inc_by(cost);
            }
        }

        tracing::trace!(
            task_id = %result.task_id,
            status = %status,
            adapter = adapter,
            duration_secs = result.execution_time,
            "Recorded task metric"
        );
    }

    pub fn task_started(&self) {
        if let Some(gauge) = TASKS_IN_FLIGHT.get() {
            gauge.inc();
        }
    }

    pub fn task_finished(&self) {
        if let Some(gauge) = TASKS_IN_FLIGHT.get() {
            gauge.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::init_metrics;
    use crate::schemas::TokenUsage;
    use chrono::Utc;

    #[test]
    fn test_record_result_updates_counters() {
        init_metrics().unwrap();
        let collector = MetricsCollector::new();
        let result = ExecutionResult::completed("t1", "collector-test", Utc::now(), 1.5, "ok", true)
            .with_usage(TokenUsage::new(100, 40), 0.01);

        let before = TASKS_TOTAL
            .get()
            .unwrap()
            .with_label_values(&["completed", "collector-test"])
            .get();
        collector.record_result(&result);
        let after = TASKS_TOTAL
            .get()
            .unwrap()
            .with_label_values(&["completed", "collector-test"])
            .get();
        assert_eq!(after, before + 1);

        let input = TOKENS_TOTAL
            .get()
            .unwrap()
            .with_label_values(&["collector-test", "input"])
            .get();
        assert!(input >= 100);
    }

    #[test]
    fn test_in_flight_balances() {
        init_metrics().unwrap();
        let collector = MetricsCollector::new();
        collector.task_started();
        collector.task_finished();
    }
}
