//! agent-eval: benchmark execution harness for LLM-based agents.
//!
//! Loads declarative YAML tasks, runs them against provider adapters under
//! per-task timeouts with sequential or bounded-parallel executors, and
//! aggregates the outcomes into benchmark results, metrics and reports.

pub mod adapters;
pub mod benchmarks;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod reporters;
pub mod schemas;

pub use adapters::{Adapter, AdapterConfig, AdapterRegistry};
pub use benchmarks::BenchmarkLoader;
pub use config::{ExecutorConfig, ExecutorKind, Settings};
pub use error::{AdapterError, ConfigError, ExecutorError, ReportError, TaskLoadError};
pub use executor::{
    aggregate_results, create_executor, Executor, ParallelExecutor, SequentialExecutor,
};
pub use schemas::{
    AgentMessage, AgentResponse, BenchmarkResult, ExecutionContext, ExecutionResult,
    ExecutionStatus, Task, TokenUsage,
};
