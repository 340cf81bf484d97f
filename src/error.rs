//! Error types for agent-eval operations.
//!
//! Defines error types for the major subsystems:
//! - Provider adapters and the adapter registry
//! - Task and suite loading
//! - Settings and executor configuration
//! - Executor context construction
//! - Report generation
//!
//! Task-level failures during a benchmark run are never surfaced through these
//! types; they are captured in the returned `ExecutionResult` instead.

use thiserror::Error;

/// Errors that can occur while talking to a model provider.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),

    #[error("Missing model name for provider '{0}'")]
    MissingModel(String),

    #[error("Unknown adapter '{name}'. Available adapters: {available}")]
    UnknownAdapter { name: String, available: String },

    #[error("Adapter '{0}' is already registered")]
    DuplicateAdapter(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    #[error("Provider stream error: {0}")]
    Stream(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Adapter configuration error: {0}")]
    Config(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

/// Errors that can occur while loading tasks and suites.
#[derive(Debug, Error)]
pub enum TaskLoadError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid YAML in '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid task definition: {0}")]
    Invalid(String),

    #[error("Benchmark suite '{0}' must contain at least one task")]
    EmptySuite(String),
}

/// Errors that can occur while reading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors raised by executor plumbing outside the task body.
///
/// These are converted into failed results by the executors and never abort a
/// benchmark run.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Invalid execution context: {0}")]
    InvalidContext(String),

    #[error("Admission gate closed")]
    GateClosed,
}

/// Errors that can occur while writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),
}
