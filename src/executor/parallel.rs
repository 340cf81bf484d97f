//! Concurrency-bounded executor.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::runner::panic_message;
use super::{aggregate_results, Executor, TaskRunner};
use crate::adapters::Adapter;
use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::schemas::{BenchmarkResult, ExecutionContext, ExecutionResult, Task};

/// Runs tasks concurrently behind a semaphore of `max_concurrency` permits.
///
/// Results keep the order of the submitted tasks whatever order they finish
/// in. A permit is held for the whole task body and released on every exit
/// path when the owned permit is dropped.
pub struct ParallelExecutor {
    runner: TaskRunner,
    gate: Arc<Semaphore>,
}

impl ParallelExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            runner: TaskRunner::new(config),
            gate: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Permits currently free.
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    async fn run_gated(
        &self,
        task: &Task,
        adapter: &dyn Adapter,
        context: Option<ExecutionContext>,
    ) -> ExecutionResult {
        let _permit = match Arc::clone(&self.gate).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return self.runner.finish(self.runner.failure_result(
                    task.task_id(),
                    &adapter.name(),
                    ExecutorError::GateClosed.to_string(),
                ))
            }
        };
        self.runner.run(task, adapter, context).await
    }

    /// Runs every task concurrently and returns results aligned with `tasks`.
    async fn run_all(
        &self,
        tasks: &[Task],
        adapter: &dyn Adapter,
        benchmark_name: &str,
    ) -> Vec<ExecutionResult> {
        let adapter_name = adapter.name();

        let futures = tasks.iter().map(|task| {
            let adapter_name = adapter_name.as_str();
            async move {
                let body = async {
                    match self.runner.create_context(task, adapter, Some(benchmark_name)) {
                        Ok(context) => self.run_gated(task, adapter, Some(context)).await,
                        Err(e) => self.runner.finish(self.runner.failure_result(
                            task.task_id(),
                            adapter_name,
                            e.to_string(),
                        )),
                    }
                };

                match AssertUnwindSafe(body).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(
                            task_id = %task.task_id(),
                            error = %message,
                            "Task escaped its wrapper"
                        );
                        let failure = self
                            .runner
                            .failure_result(task.task_id(), adapter_name, message);
                        self.runner.finish(failure)
                    }
                }
            }
        });

        join_all(futures).await
    }

    /// Runs `tasks` in consecutive chunks of `batch_size`, each chunk in
    /// parallel, and aggregates all results once at the end.
    pub async fn execute_benchmark_batched(
        &self,
        tasks: &[Task],
        adapter: &dyn Adapter,
        benchmark_name: &str,
        batch_size: usize,
    ) -> BenchmarkResult {
        let start_time = Utc::now();
        let batch_size = batch_size.max(1);
        let batches = tasks.len().div_ceil(batch_size);

        info!(
            benchmark = %benchmark_name,
            tasks = tasks.len(),
            batch_size,
            batches,
            "Starting batched parallel benchmark"
        );

        let mut results = Vec::with_capacity(tasks.len());
        for (index, chunk) in tasks.chunks(batch_size).enumerate() {
            let batch_name = format!("{}_batch_{}", benchmark_name, index + 1);
            debug!(batch = %batch_name, size = chunk.len(), "Running batch");
            results.extend(self.run_all(chunk, adapter, &batch_name).await);
        }

        aggregate_results(
            benchmark_name,
            start_time,
            &adapter.name(),
            self.config(),
            results,
        )
    }
}

#[async_trait]
impl Executor for ParallelExecutor {
    fn config(&self) -> &ExecutorConfig {
        self.runner.config()
    }

    async fn execute_task(
        &self,
        task: &Task,
        adapter: &dyn Adapter,
        context: Option<ExecutionContext>,
    ) -> ExecutionResult {
        self.run_gated(task, adapter, context).await
    }

    async fn execute_benchmark(
        &self,
        tasks: &[Task],
        adapter: &dyn Adapter,
        benchmark_name: &str,
    ) -> BenchmarkResult {
        if let Some(batch_size) = self.config().batch_size {
            if batch_size < tasks.len() {
                return self
                    .execute_benchmark_batched(tasks, adapter, benchmark_name, batch_size)
                    .await;
            }
        }

        let start_time = Utc::now();
        info!(
            benchmark = %benchmark_name,
            tasks = tasks.len(),
            max_concurrency = self.config().max_concurrency,
            "Starting parallel benchmark"
        );

        let results = self.run_all(tasks, adapter, benchmark_name).await;
        let summary = aggregate_results(
            benchmark_name,
            start_time,
            &adapter.name(),
            self.config(),
            results,
        );

        info!(
            benchmark = %benchmark_name,
            successful = summary.successful_tasks,
            failed = summary.failed_tasks,
            total_time_secs = summary.total_time,
            "Parallel benchmark finished"
        );

        summary
    }
}
