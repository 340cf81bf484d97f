//! Settings and executor configuration.
//!
//! `Settings` carries process-wide defaults read from `AGENTEVAL_*` environment
//! variables. `ExecutorConfig` is the per-run option set consumed by the
//! executors and recorded on every context and benchmark result.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix shared by every recognized environment variable.
pub const ENV_PREFIX: &str = "AGENTEVAL_";

/// Default per-task timeout in seconds.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;

/// Default number of conversation turns granted to a task.
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Default admission gate size for the parallel executor.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Default directory for persisted execution traces.
pub const DEFAULT_TRACE_DIR: &str = ".agenteval_traces";

/// Execution strategy selected for a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    #[default]
    Sequential,
    Parallel,
}

impl ExecutorKind {
    /// Returns all executor kinds.
    pub fn all() -> &'static [ExecutorKind] {
        &[ExecutorKind::Sequential, ExecutorKind::Parallel]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::Sequential => "sequential",
            ExecutorKind::Parallel => "parallel",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutorKind::Sequential),
            "parallel" | "par" => Ok(ExecutorKind::Parallel),
            other => Err(ConfigError::InvalidValue {
                key: "executor".to_string(),
                message: format!("unknown executor '{}', expected sequential or parallel", other),
            }),
        }
    }
}

/// Global settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub trace_dir: PathBuf,
    pub default_executor: ExecutorKind,
    pub max_concurrency: usize,
    /// Per-task timeout.
    pub task_timeout: Duration,
    pub save_traces: bool,
    pub stop_on_failure: bool,
    /// Model used when the CLI does not name one.
    pub default_model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            trace_dir: PathBuf::from(DEFAULT_TRACE_DIR),
            default_executor: ExecutorKind::Sequential,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            save_traces: true,
            stop_on_failure: false,
            default_model: None,
            anthropic_api_key: None,
            openai_api_key: None,
        }
    }
}

impl Settings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from `AGENTEVAL_*` environment variables.
    ///
    /// Unset variables keep their defaults. Values that fail to parse yield
    /// `ConfigError::InvalidValue` naming the offending variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };

        let mut settings = Self::default();

        if let Some((_, val)) = var("LOG_LEVEL") {
            settings.log_level = val;
        }

        if let Some((_, val)) = var("TRACE_DIR") {
            settings.trace_dir = PathBuf::from(val);
        }

        if let Some((key, val)) = var("DEFAULT_EXECUTOR") {
            settings.default_executor = val.parse().map_err(|_| ConfigError::InvalidValue {
                key,
                message: format!("unknown executor '{}'", val),
            })?;
        }

        if let Some((key, val)) = var("MAX_CONCURRENCY") {
            settings.max_concurrency = parse_env_value(&val, &key)?;
        }

        if let Some((key, val)) = var("TASK_TIMEOUT") {
            let secs: u64 = parse_env_value(&val, &key)?;
            settings.task_timeout = Duration::from_secs(secs);
        }

        if let Some((key, val)) = var("SAVE_TRACES") {
            settings.save_traces = parse_env_bool(&val, &key)?;
        }

        if let Some((key, val)) = var("STOP_ON_FAILURE") {
            settings.stop_on_failure = parse_env_bool(&val, &key)?;
        }

        settings.default_model = var("DEFAULT_MODEL")
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty());
        settings.anthropic_api_key = var("ANTHROPIC_API_KEY")
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty());
        settings.openai_api_key = var("OPENAI_API_KEY")
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty());

        Ok(settings)
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.task_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "task_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the API key configured for a provider, if any.
    ///
    /// `anthropic`/`claude` and `openai`/`gpt` are accepted as provider names.
    pub fn get_api_key(&self, provider: &str) -> Option<&str> {
        match provider.to_lowercase().as_str() {
            "anthropic" | "claude" => self.anthropic_api_key.as_deref(),
            "openai" | "gpt" => self.openai_api_key.as_deref(),
            _ => None,
        }
    }

    pub fn has_api_key(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }

    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = dir.into();
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }
}

/// Options consumed by the executors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Hard wall-clock limit for a single task.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Turn budget handed to the adapter.
    pub max_turns: u32,
    /// Admission gate size. Only used by the parallel executor.
    pub max_concurrency: usize,
    pub save_traces: bool,
    pub trace_dir: PathBuf,
    /// Sequential only: stop after the first unsuccessful task.
    pub stop_on_failure: bool,
    /// Parallel only: run the task list in chunks of this size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            max_turns: DEFAULT_MAX_TURNS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            save_traces: false,
            trace_dir: PathBuf::from(DEFAULT_TRACE_DIR),
            stop_on_failure: false,
            batch_size: None,
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives executor options from global settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.task_timeout,
            max_turns: DEFAULT_MAX_TURNS,
            max_concurrency: settings.max_concurrency,
            save_traces: settings.save_traces,
            trace_dir: settings.trace_dir.clone(),
            stop_on_failure: settings.stop_on_failure,
            batch_size: None,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_turns == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_turns must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_save_traces(mut self, save: bool) -> Self {
        self.save_traces = save;
        self
    }

    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = dir.into();
        self
    }

    pub fn with_stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }
}

/// Serializes a `Duration` as fractional seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
