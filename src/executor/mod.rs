//! Task execution strategies.
//!
//! An [`Executor`] turns tasks plus an adapter into results. Two strategies
//! are provided:
//! - [`SequentialExecutor`]: one task at a time, optional stop-on-failure.
//! - [`ParallelExecutor`]: semaphore-bounded concurrency, optional batching.
//!
//! Neither ever fails for a task: timeouts, adapter errors and panics become
//! results with the matching status, and the run always produces a
//! [`BenchmarkResult`].
//!
//! # Example
//!
//! ```ignore
//! use agent_eval::config::{ExecutorConfig, ExecutorKind};
//! use agent_eval::executor::create_executor;
//!
//! let executor = create_executor(ExecutorKind::Parallel, ExecutorConfig::default());
//! let result = executor.execute_benchmark(&tasks, adapter.as_ref(), "smoke").await;
//! println!("{:.1}%", result.success_rate() * 100.0);
//! ```

mod aggregate;
mod parallel;
mod runner;
mod sequential;

use async_trait::async_trait;

pub use aggregate::aggregate_results;
pub use parallel::ParallelExecutor;
pub use runner::TaskRunner;
pub use sequential::SequentialExecutor;

use crate::adapters::Adapter;
use crate::config::{ExecutorConfig, ExecutorKind};
use crate::schemas::{BenchmarkResult, ExecutionContext, ExecutionResult, Task};

/// Strategy for running tasks against an adapter.
#[async_trait]
pub trait Executor: Send + Sync {
    fn config(&self) -> &ExecutorConfig;

    /// Runs exactly one task. Every failure mode is reported in the result.
    ///
    /// Without a context one is derived from the task and the configuration.
    async fn execute_task(
        &self,
        task: &Task,
        adapter: &dyn Adapter,
        context: Option<ExecutionContext>,
    ) -> ExecutionResult;

    /// Runs the task list and aggregates the results in task order.
    async fn execute_benchmark(
        &self,
        tasks: &[Task],
        adapter: &dyn Adapter,
        benchmark_name: &str,
    ) -> BenchmarkResult;
}

/// Builds the executor selected by `kind`.
pub fn create_executor(kind: ExecutorKind, config: ExecutorConfig) -> Box<dyn Executor> {
    match kind {
        ExecutorKind::Sequential => Box::new(SequentialExecutor::new(config)),
        ExecutorKind::Parallel => Box::new(ParallelExecutor::new(config)),
    }
}
