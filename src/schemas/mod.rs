//! Data model shared by the loader, adapters, executors and reporters.

pub mod benchmark;
pub mod execution;

pub use benchmark::{
    Benchmark, BenchmarkConfig, BenchmarkSuite, CriterionCheck, CriterionType, DifficultyLevel,
    MetricsConfig, ReportingConfig, SuccessCriterion, Task, TaskDefinition, TaskMetadata,
    TaskReference, TaskSetup, TaskType, ToolDefinition, ValidationConfig, ValidationMethod,
    ValidationOutcome,
};
pub use execution::{
    validate_conversation, AgentMessage, AgentResponse, AgentTrace, AgentTurn, BenchmarkResult,
    ExecutionContext, ExecutionResult, ExecutionStatus, MessageRole, TokenUsage, ToolCall,
    ToolSpec,
};
