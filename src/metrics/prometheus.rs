//! Prometheus metrics registration and export.
//!
//! Process-level series for benchmark runs: task outcomes, durations, token
//! consumption and spend per adapter.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all agenteval metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of tasks executed, labeled by status and adapter.
pub static TASKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Task execution duration in seconds, labeled by adapter.
pub static TASK_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Total tokens consumed, labeled by adapter and type (input/output).
pub static TOKENS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Estimated spend in USD, labeled by adapter.
pub static COST_USD_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Number of tasks currently executing.
pub static TASKS_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless: later calls leave the first
/// registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric construction or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let tasks_total = IntCounterVec::new(
        Opts::new("agenteval_tasks_total", "Total number of tasks executed"),
        &["status", "adapter"],
    )?;

    let task_duration = HistogramVec::new(
        HistogramOpts::new(
            "agenteval_task_duration_seconds",
            "Task execution duration in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["adapter"],
    )?;

    let tokens_total = IntCounterVec::new(
        Opts::new("agenteval_tokens_total", "Total tokens consumed"),
        &["adapter", "type"],
    )?;

    let cost_usd_total = CounterVec::new(
        Opts::new("agenteval_cost_usd_total", "Estimated API spend in USD"),
        &["adapter"],
    )?;

    let tasks_in_flight = Gauge::new(
        "agenteval_tasks_in_flight",
        "Number of tasks currently executing",
    )?;

    registry.register(Box::new(tasks_total.clone()))?;
    registry.register(Box::new(task_duration.clone()))?;
    registry.register(Box::new(tokens_total.clone()))?;
    registry.register(Box::new(cost_usd_total.clone()))?;
    registry.register(Box::new(tasks_in_flight.clone()))?;

    // Lost races leave the winner's metrics in place.
    let _ = REGISTRY.set(registry);
    let _ = TASKS_TOTAL.set(tasks_total);
    let _ = TASK_DURATION.set(task_duration);
    let _ = TOKENS_TOTAL.set(tokens_total);
    let _ = COST_USD_TOTAL.set(cost_usd_total);
    let _ = TASKS_IN_FLIGHT.set(tasks_in_flight);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
