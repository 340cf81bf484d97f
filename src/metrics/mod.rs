//! Evaluation metrics and Prometheus-based process monitoring.
//!
//! Two concerns live here:
//! - [`evaluation`] turns execution results into benchmark scores
//!   (completion rate, cost, tokens, accuracy, safety screens).
//! - [`prometheus`] and [`collectors`] expose process counters for a run.
//!
//! # Example
//!
//! ```ignore
//! use agent_eval::metrics::{evaluate_benchmark, init_metrics, export_metrics, MetricKind};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! let scores = evaluate_benchmark(&benchmark_result, MetricKind::defaults());
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod evaluation;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use evaluation::{
    aggregate, compute, evaluate_benchmark, MetricCategory, MetricKind, MetricResult,
    EXPECTED_OUTPUT_KEY, METRIC_CONFIG_KEY, SHOULD_REFUSE_KEY,
};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    COST_USD_TOTAL, REGISTRY, TASKS_IN_FLIGHT, TASKS_TOTAL, TASK_DURATION, TOKENS_TOTAL,
};
