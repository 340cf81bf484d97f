//! Single-task execution shared by every executor.
//!
//! [`TaskRunner`] owns the per-task algorithm: context construction, the
//! initial conversation, the adapter call under a deadline, success-criteria
//! evaluation and trace capture. Traces are persisted once the deadline has
//! resolved. It never returns an error for a task; every failure mode ends up
//! in the returned [`ExecutionResult`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::adapters::Adapter;
use crate::config::ExecutorConfig;
use crate::error::{AdapterError, ExecutorError};
use crate::metrics::{
    MetricsCollector, EXPECTED_OUTPUT_KEY, METRIC_CONFIG_KEY, SHOULD_REFUSE_KEY,
};
use crate::schemas::{
    AgentMessage, AgentTrace, AgentTurn, ExecutionContext, ExecutionResult, Task,
};

/// Runs one task at a time against an adapter and keeps a record of what ran.
pub struct TaskRunner {
    config: ExecutorConfig,
    traces: Mutex<Vec<AgentTrace>>,
    results: Mutex<Vec<ExecutionResult>>,
    metrics: MetricsCollector,
}

impl TaskRunner {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            traces: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Derives the execution context for a task.
    ///
    /// The timeout comes from the executor configuration; the turn budget from
    /// the task setup, falling back to the configured default.
    pub fn create_context(
        &self,
        task: &Task,
        adapter: &dyn Adapter,
        benchmark_name: Option<&str>,
    ) -> Result<ExecutionContext, ExecutorError> {
        let timeout = self.config.timeout;
        if timeout.is_zero() {
            return Err(ExecutorError::InvalidContext(format!(
                "task '{}' has a zero timeout",
                task.task_id()
            )));
        }

        let max_turns = task.max_turns().unwrap_or(self.config.max_turns);
        if max_turns == 0 {
            return Err(ExecutorError::InvalidContext(format!(
                "task '{}' allows zero turns",
                task.task_id()
            )));
        }

        Ok(ExecutionContext {
            task_id: task.task_id().to_string(),
            benchmark_name: benchmark_name.map(str::to_string),
            adapter_name: adapter.name(),
            start_time: Utc::now(),
            timeout,
            max_turns,
            config: self.config.clone(),
        })
    }

    /// Optional system prompt followed by the task instructions.
    pub fn initial_messages(task: &Task) -> Vec<AgentMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = task.system_message() {
            messages.push(AgentMessage::system(system));
        }
        messages.push(AgentMessage::user(task.instructions()));
        messages
    }

    /// Runs a task to completion, failure or timeout.
    ///
    /// Without a context one is derived from the task; a context that cannot
    /// be built yields a failed result.
    pub async fn run(
        &self,
        task: &Task,
        adapter: &dyn Adapter,
        context: Option<ExecutionContext>,
    ) -> ExecutionResult {
        let context = match context {
            Some(context) => context,
            None => match self.create_context(task, adapter, None) {
                Ok(context) => context,
                Err(e) => {
                    let failure =
                        self.failure_result(task.task_id(), &adapter.name(), e.to_string());
                    return self.finish(failure);
                }
            },
        };

        self.metrics.task_started();
        let started = Instant::now();

        let guarded = AssertUnwindSafe(self.run_body(task, adapter, &context)).catch_unwind();
        let result = match tokio::time::timeout(context.timeout, guarded).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                error!(task_id = %context.task_id, error = %e, "Task failed");
                ExecutionResult::failed(
                    &context.task_id,
                    &context.adapter_name,
                    context.start_time,
                    started.elapsed().as_secs_f64(),
                    e.to_string(),
                )
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(task_id = %context.task_id, error = %message, "Task panicked");
                ExecutionResult::failed(
                    &context.task_id,
                    &context.adapter_name,
                    context.start_time,
                    started.elapsed().as_secs_f64(),
                    message,
                )
            }
            Err(_) => {
                warn!(
                    task_id = %context.task_id,
                    timeout_secs = context.timeout.as_secs_f64(),
                    "Task timed out"
                );
                ExecutionResult::timed_out(
                    &context.task_id,
                    &context.adapter_name,
                    context.start_time,
                    context.timeout,
                )
            }
        };

        // Trace persistence is not subject to the task deadline.
        if let Some(trace) = result.trace.as_ref() {
            if self.config.save_traces {
                self.save_trace(trace).await;
            }
            self.lock_traces().push(trace.clone());
        }

        self.metrics.task_finished();
        self.finish(result)
    }

    async fn run_body(
        &self,
        task: &Task,
        adapter: &dyn Adapter,
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, AdapterError> {
        let started = Instant::now();
        let messages = Self::initial_messages(task);
        let tools = task.tool_specs();

        debug!(
            task_id = %context.task_id,
            adapter = %context.adapter_name,
            tools = tools.as_ref().map_or(0, Vec::len),
            max_turns = context.max_turns,
            "Dispatching task"
        );

        let response = adapter
            .execute(&messages, tools.as_deref(), context.max_turns)
            .await?;
        let elapsed = started.elapsed().as_secs_f64();

        let mut turn = AgentTurn::new(1);
        turn.messages = messages;
        turn.messages.push(AgentMessage::assistant(&response.content));
        turn.tool_calls = response.tool_calls.clone();
        turn.token_usage = response.token_usage;
        turn.latency = Some(elapsed);
        turn.model = Some(
            response
                .model
                .clone()
                .unwrap_or_else(|| adapter.model().to_string()),
        );

        let mut trace = AgentTrace::new(&context.task_id, &context.adapter_name);
        trace.add_turn(turn);
        trace.final_output = Some(response.content.clone());
        trace.total_time = Some(elapsed);

        let outcome = task.evaluate_criteria(&response.content, &response.tools_called());

        // Usage of this response alone; the adapter's counters span every task.
        let usage = response.token_usage.unwrap_or_else(|| adapter.token_usage());
        let cost = response.cost.unwrap_or_else(|| adapter.cost());

        let mut result = ExecutionResult::completed(
            &context.task_id,
            &context.adapter_name,
            context.start_time,
            elapsed,
            response.content,
            outcome.passed,
        )
        .with_trace(trace)
        .with_usage(usage, cost)
        .with_adapter_metadata(adapter.metadata())
        .with_validation_details(serde_json::to_value(&outcome).unwrap_or_default());

        if let Some(expected) = &task.task.expected_output {
            result = result.with_metadata(EXPECTED_OUTPUT_KEY, expected.clone());
        }
        if let Some(config) = &task.metrics.config {
            result = result.with_metadata(METRIC_CONFIG_KEY, json!(config));
        }
        if let Some(should_refuse) = task.should_refuse() {
            result = result.with_metadata(SHOULD_REFUSE_KEY, json!(should_refuse));
        }

        Ok(result)
    }

    /// A failed result for errors raised outside the task body.
    pub fn failure_result(
        &self,
        task_id: &str,
        adapter_name: &str,
        error: String,
    ) -> ExecutionResult {
        warn!(task_id = %task_id, error = %error, "Task could not be executed");
        ExecutionResult::failed(task_id, adapter_name, Utc::now(), 0.0, error)
    }

    /// Records a result produced outside [`TaskRunner::run`].
    pub(crate) fn finish(&self, result: ExecutionResult) -> ExecutionResult {
        self.metrics.record_result(&result);
        info!(
            task_id = %result.task_id,
            status = %result.status,
            success = result.success,
            elapsed_secs = result.execution_time,
            tokens = result.token_usage.map_or(0, |u| u.total_tokens),
            cost_usd = result.cost.unwrap_or(0.0),
            "Task finished"
        );
        self.lock_results().push(result.clone());
        result
    }

    async fn save_trace(&self, trace: &AgentTrace) {
        let path = self.trace_path(trace);
        let saved = async {
            tokio::fs::create_dir_all(&self.config.trace_dir).await?;
            let body = serde_json::to_vec_pretty(trace)?;
            tokio::fs::write(&path, body).await?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
        }
        .await;

        match saved {
            Ok(()) => debug!(path = %path.display(), "Saved trace"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save trace"),
        }
    }

    fn trace_path(&self, trace: &AgentTrace) -> PathBuf {
        let safe_id: String = trace
            .task_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stamp = trace.timestamp.format("%Y%m%d_%H%M%S");
        self.config
            .trace_dir
            .join(format!("trace_{}_{}.json", safe_id, stamp))
    }

    /// Every trace captured since creation or the last [`clear`](Self::clear).
    pub fn traces(&self) -> Vec<AgentTrace> {
        self.lock_traces().clone()
    }

    /// Every result produced since creation or the last [`clear`](Self::clear).
    pub fn results(&self) -> Vec<ExecutionResult> {
        self.lock_results().clone()
    }

    pub fn clear(&self) {
        self.lock_traces().clear();
        self.lock_results().clear();
    }

    fn lock_traces(&self) -> std::sync::MutexGuard<'_, Vec<AgentTrace>> {
        self.traces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_results(&self) -> std::sync::MutexGuard<'_, Vec<ExecutionResult>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Task panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Task panicked: {}", s)
    } else {
        "Task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::UsageTracker;
    use crate::error::AdapterError;
    use crate::schemas::{
        AgentResponse, ExecutionStatus, SuccessCriterion, TaskSetup, TokenUsage, ToolSpec,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixedAdapter {
        reply: String,
        delay: Duration,
        usage: UsageTracker,
    }

    impl FixedAdapter {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                delay: Duration::ZERO,
                usage: UsageTracker::new(),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Adapter for FixedAdapter {
        fn name(&self) -> String {
            "fixed/model".to_string()
        }

        fn model(&self) -> &str {
            "model"
        }

        fn supports_tools(&self) -> bool {
            true
        }

        fn supports_streaming(&self) -> bool {
            false
        }

        async fn execute(
            &self,
            messages: &[AgentMessage],
            _tools: Option<&[ToolSpec]>,
            _max_turns: u32,
        ) -> Result<AgentResponse, AdapterError> {
            tokio::time::sleep(self.delay).await;
            if self.reply == "error" {
                return Err(AdapterError::Execution("provider exploded".to_string()));
            }
            if self.reply == "panic" {
                panic!("adapter bug");
            }
            let usage = TokenUsage::new(messages.len() as u64 * 10, 5);
            self.usage.record(&usage, 0.01);
            Ok(AgentResponse::new(self.reply.clone())
                .with_token_usage(usage)
                .with_cost(0.01))
        }

        fn token_usage(&self) -> TokenUsage {
            self.usage.usage()
        }

        fn cost(&self) -> f64 {
            self.usage.cost()
        }

        fn reset_usage(&self) {
            self.usage.reset();
        }

        fn validate_config(&self) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    fn task(name: &str) -> Task {
        Task::new(name, "What is 2 + 2?").with_criterion(SuccessCriterion::output_contains("4"))
    }

    #[test]
    fn test_initial_messages() {
        let plain = TaskRunner::initial_messages(&task("t"));
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].content, "What is 2 + 2?");

        let with_system = TaskRunner::initial_messages(&task("t").with_system_message("Be terse."));
        assert_eq!(with_system.len(), 2);
        assert_eq!(with_system[0].content, "Be terse.");
        assert!(crate::schemas::validate_conversation(&with_system).is_ok());
    }

    #[test]
    fn test_context_turns_from_task_setup() {
        let runner = TaskRunner::new(ExecutorConfig::default());
        let adapter = FixedAdapter::new("4");

        let context = runner.create_context(&task("t"), &adapter, Some("suite")).unwrap();
        assert_eq!(context.max_turns, 10);
        assert_eq!(context.benchmark_name.as_deref(), Some("suite"));
        assert_eq!(context.adapter_name, "fixed/model");

        let setup = TaskSetup {
            max_turns: 3,
            ..Default::default()
        };
        let context = runner
            .create_context(&task("t").with_setup(setup), &adapter, None)
            .unwrap();
        assert_eq!(context.max_turns, 3);
    }

    #[test]
    fn test_invalid_context() {
        let runner = TaskRunner::new(ExecutorConfig::default().with_timeout(Duration::ZERO));
        let err = runner
            .create_context(&task("t"), &FixedAdapter::new("4"), None)
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidContext(_)));
    }

    #[tokio::test]
    async fn test_completed_result() {
        let runner = TaskRunner::new(ExecutorConfig::default());
        let result = runner.run(&task("t"), &FixedAdapter::new("It is 4."), None).await;

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(result.is_successful());
        assert!(result.validation_passed);
        assert_eq!(result.output.as_deref(), Some("It is 4."));
        assert_eq!(result.turns_count, 1);
        assert_eq!(result.token_usage, Some(TokenUsage::new(10, 5)));
        assert_eq!(result.cost, Some(0.01));
        assert!(result.validation_details.is_some());
        assert_eq!(runner.traces().len(), 1);
        assert_eq!(runner.results().len(), 1);

        runner.clear();
        assert!(runner.traces().is_empty());
        assert!(runner.results().is_empty());
    }

    #[tokio::test]
    async fn test_failed_criteria_still_completed() {
        let runner = TaskRunner::new(ExecutorConfig::default());
        let result = runner.run(&task("t"), &FixedAdapter::new("5"), None).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(!result.success);
        assert!(!result.is_successful());
    }

    #[tokio::test]
    async fn test_adapter_error_becomes_failed() {
        let runner = TaskRunner::new(ExecutorConfig::default());
        let result = runner.run(&task("t"), &FixedAdapter::new("error"), None).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("provider exploded"));
        assert!(result.trace.is_none());
    }

    #[tokio::test]
    async fn test_panic_becomes_failed() {
        let runner = TaskRunner::new(ExecutorConfig::default());
        let result = runner.run(&task("t"), &FixedAdapter::new("panic"), None).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("adapter bug"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let config = ExecutorConfig::default().with_timeout(Duration::from_millis(10));
        let runner = TaskRunner::new(config);
        let adapter = FixedAdapter::new("4").slow(Duration::from_secs(5));

        let result = runner.run(&task("slow"), &adapter, None).await;
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(!result.success);
        assert!(result.output.is_none());
        assert!((result.execution_time - 0.01).abs() < 1e-9);
        assert!(result.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_expected_output_copied_to_metadata() {
        let mut t = task("t");
        t.task.expected_output = Some(serde_json::json!("4"));
        let runner = TaskRunner::new(ExecutorConfig::default());
        let result = runner.run(&t, &FixedAdapter::new("4"), None).await;
        assert_eq!(result.metadata["expected_output"], serde_json::json!("4"));
        assert!(!result.metadata.contains_key(METRIC_CONFIG_KEY));
        assert!(!result.metadata.contains_key(SHOULD_REFUSE_KEY));
    }

    #[tokio::test]
    async fn test_metric_inputs_copied_to_metadata() {
        let mut t = task("t");
        t.metrics.config = Some(HashMap::from([("max_length".to_string(), json!(3))]));
        t.task.context = Some(HashMap::from([("should_refuse".to_string(), json!(true))]));
        let runner = TaskRunner::new(ExecutorConfig::default());
        let result = runner.run(&t, &FixedAdapter::new("It is 4."), None).await;

        assert_eq!(result.metadata[METRIC_CONFIG_KEY], json!({"max_length": 3}));
        assert_eq!(result.metadata[SHOULD_REFUSE_KEY], json!(true));

        let length = crate::metrics::compute(crate::metrics::MetricKind::OutputLength, &result);
        assert_eq!(length.passed, Some(false));
        let refusal = crate::metrics::compute(crate::metrics::MetricKind::RefusalRate, &result);
        assert_eq!(refusal.value, 0.0);
    }

    #[tokio::test]
    async fn test_saves_trace_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutorConfig::default()
            .with_save_traces(true)
            .with_trace_dir(dir.path().join("traces"));
        let runner = TaskRunner::new(config);

        runner.run(&task("math/add"), &FixedAdapter::new("4"), None).await;

        let files: Vec<_> = std::fs::read_dir(dir.path().join("traces"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("trace_math_add_"));
        assert!(files[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_trace_persisted_after_deadline_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutorConfig::default()
            .with_save_traces(true)
            .with_trace_dir(dir.path().join("traces"))
            .with_timeout(Duration::from_millis(200));
        let runner = TaskRunner::new(config);
        let adapter = FixedAdapter::new("4").slow(Duration::from_millis(20));

        let result = runner.run(&task("near-deadline"), &adapter, None).await;

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(result.trace.is_some());
        assert_eq!(runner.traces().len(), 1);
        let saved = std::fs::read_dir(dir.path().join("traces")).unwrap();
        assert_eq!(saved.count(), 1);
    }

    #[tokio::test]
    async fn test_unwritable_trace_dir_keeps_result() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let config = ExecutorConfig::default()
            .with_save_traces(true)
            .with_trace_dir(blocker.join("traces"));
        let runner = TaskRunner::new(config);

        let result = runner.run(&task("t"), &FixedAdapter::new("4"), None).await;

        assert!(result.is_successful());
        assert_eq!(runner.traces().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_task_records_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutorConfig::default()
            .with_save_traces(true)
            .with_trace_dir(dir.path().join("traces"))
            .with_timeout(Duration::from_millis(10));
        let runner = TaskRunner::new(config);
        let adapter = FixedAdapter::new("4").slow(Duration::from_secs(5));

        let result = runner.run(&task("slow"), &adapter, None).await;

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(runner.traces().is_empty());
        assert!(!dir.path().join("traces").exists());
    }
}
