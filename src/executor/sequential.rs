//! One-at-a-time executor.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::{aggregate_results, Executor, TaskRunner};
use crate::adapters::Adapter;
use crate::config::ExecutorConfig;
use crate::schemas::{BenchmarkResult, ExecutionContext, ExecutionResult, Task};

/// Runs tasks strictly in order with a single task in flight.
///
/// With `stop_on_failure` the run ends after the first unsuccessful result;
/// that result is kept and the remaining tasks are not represented.
pub struct SequentialExecutor {
    runner: TaskRunner,
}

impl SequentialExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            runner: TaskRunner::new(config),
        }
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }
}

#[async_trait]
impl Executor for SequentialExecutor {
    fn config(&self) -> &ExecutorConfig {
        self.runner.config()
    }

    async fn execute_task(
        &self,
        task: &Task,
        adapter: &dyn Adapter,
        context: Option<ExecutionContext>,
    ) -> ExecutionResult {
        self.runner.run(task, adapter, context).await
    }

    async fn execute_benchmark(
        &self,
        tasks: &[Task],
        adapter: &dyn Adapter,
        benchmark_name: &str,
    ) -> BenchmarkResult {
        let start_time = Utc::now();
        let adapter_name = adapter.name();
        let stop_on_failure = self.config().stop_on_failure;

        info!(
            benchmark = %benchmark_name,
            adapter = %adapter_name,
            tasks = tasks.len(),
            "Starting sequential benchmark"
        );

        let mut results = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let result = match self.runner.create_context(task, adapter, Some(benchmark_name)) {
                Ok(context) => self.runner.run(task, adapter, Some(context)).await,
                Err(e) => self.runner.finish(self.runner.failure_result(
                    task.task_id(),
                    &adapter_name,
                    e.to_string(),
                )),
            };

            let succeeded = result.is_successful();
            results.push(result);

            if stop_on_failure && !succeeded {
                warn!(
                    benchmark = %benchmark_name,
                    task_id = %task.task_id(),
                    skipped = tasks.len() - index - 1,
                    "Stopping after failed task"
                );
                break;
            }
        }

        let summary = aggregate_results(
            benchmark_name,
            start_time,
            &adapter_name,
            self.config(),
            results,
        );

        info!(
            benchmark = %benchmark_name,
            successful = summary.successful_tasks,
            failed = summary.failed_tasks,
            total_time_secs = summary.total_time,
            "Sequential benchmark finished"
        );

        summary
    }
}
