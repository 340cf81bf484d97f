//! Execution records: messages, traces, contexts and results.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{duration_secs, ExecutorConfig};

/// Status of a single task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Not started yet.
    Pending,
    /// Currently executing.
    Running,
    /// Adapter call returned and the output was validated.
    Completed,
    /// Adapter call or surrounding logic failed.
    Failed,
    /// Terminated at the per-task deadline.
    Timeout,
    /// Reserved for cooperative cancellation; no executor produces it.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns true for statuses no transition can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Timeout
                | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Timeout => write!(f, "timeout"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single message in an agent conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Identifier of the tool call a `tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Checks the role sequencing rule of a conversation.
///
/// At most one `system` message is allowed and it must come first.
pub fn validate_conversation(messages: &[AgentMessage]) -> Result<(), String> {
    for (index, message) in messages.iter().enumerate() {
        if message.role == MessageRole::System && index != 0 {
            return Err(format!(
                "system message at position {} must be the first message",
                index
            ));
        }
    }
    Ok(())
}

/// A tool invocation made by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Seconds spent running the tool, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            arguments: HashMap::new(),
            result: None,
            error: None,
            timestamp: Utc::now(),
            execution_time: None,
        }
    }

    pub fn with_arguments(mut self, arguments: HashMap<String, serde_json::Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Normalized tool declaration passed to adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's parameters.
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Declaration for a tool known only by name.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: empty_object(),
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Token usage statistics.
///
/// `total_tokens` is stored rather than derived so adapters can record the
/// provider's own reported total. Combining sums every field, with absent
/// cache counters treated as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
}

impl TokenUsage {
    /// Usage with `total_tokens = input + output`.
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
            cache_read_tokens: None,
            cache_write_tokens: None,
        }
    }

    /// Usage with an explicitly reported total.
    pub fn with_total(input: u64, output: u64, total: u64) -> Self {
        Self {
            total_tokens: total,
            ..Self::new(input, output)
        }
    }

    pub fn with_cache(mut self, read: Option<u64>, write: Option<u64>) -> Self {
        self.cache_read_tokens = read;
        self.cache_write_tokens = write;
        self
    }

    /// Field-wise sum of two usages.
    pub fn combine(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
            cache_read_tokens: Some(
                self.cache_read_tokens.unwrap_or(0) + other.cache_read_tokens.unwrap_or(0),
            ),
            cache_write_tokens: Some(
                self.cache_write_tokens.unwrap_or(0) + other.cache_write_tokens.unwrap_or(0),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.total_tokens == 0
            && self.cache_read_tokens.unwrap_or(0) == 0
            && self.cache_write_tokens.unwrap_or(0) == 0
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        self.combine(&rhs)
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = self.combine(&rhs);
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |acc, usage| acc + usage)
    }
}

impl<'a> Sum<&'a TokenUsage> for TokenUsage {
    fn sum<I: Iterator<Item = &'a TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |acc, usage| acc.combine(usage))
    }
}

/// One exchange with the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTurn {
    /// Turn number, starting at 1.
    pub turn_number: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Seconds between request and reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentTurn {
    pub fn new(turn_number: u32) -> Self {
        Self {
            turn_number,
            timestamp: Utc::now(),
            messages: Vec::new(),
            tool_calls: Vec::new(),
            token_usage: None,
            latency: None,
            model: None,
            metadata: HashMap::new(),
        }
    }
}

/// Complete record of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrace {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    /// Adapter name, e.g. `anthropic/claude-3-5-sonnet-20241022`.
    pub adapter: String,
    #[serde(default)]
    pub turns: Vec<AgentTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentTrace {
    pub fn new(task_id: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            timestamp: Utc::now(),
            adapter: adapter.into(),
            turns: Vec::new(),
            final_output: None,
            total_time: None,
            metadata: HashMap::new(),
        }
    }

    pub fn add_turn(&mut self, turn: AgentTurn) {
        self.turns.push(turn);
    }

    /// Sum of the usage recorded on every turn.
    pub fn total_token_usage(&self) -> TokenUsage {
        self.turns.iter().filter_map(|t| t.token_usage.as_ref()).sum()
    }

    /// All tool calls across all turns, in order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.turns.iter().flat_map(|t| t.tool_calls.iter()).collect()
    }
}

/// Reply returned by an adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// USD cost of this response alone, when the adapter prices it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Distinct names of the tools invoked in this response.
    pub fn tools_called(&self) -> HashSet<String> {
        self.tool_calls.iter().map(|c| c.tool.clone()).collect()
    }
}

/// Per-task execution parameters, created just before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_name: Option<String>,
    pub adapter_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub max_turns: u32,
    pub config: ExecutorConfig,
}

/// Outcome of one task attempt.
///
/// Built exactly once per attempt by the executor and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: String,
    pub status: ExecutionStatus,
    pub success: bool,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds.
    pub execution_time: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<AgentTrace>,

    #[serde(default)]
    pub turns_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Estimated cost in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    pub adapter_name: String,
    #[serde(default)]
    pub adapter_metadata: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub validation_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_details: Option<serde_json::Value>,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionResult {
    fn base(
        task_id: impl Into<String>,
        adapter_name: impl Into<String>,
        status: ExecutionStatus,
        start_time: DateTime<Utc>,
        execution_time: f64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            success: false,
            start_time,
            end_time: Utc::now(),
            execution_time,
            output: None,
            error: None,
            trace: None,
            turns_count: 0,
            token_usage: None,
            cost: None,
            adapter_name: adapter_name.into(),
            adapter_metadata: HashMap::new(),
            validation_passed: false,
            validation_details: None,
            metadata: HashMap::new(),
        }
    }

    /// A result whose adapter call returned.
    ///
    /// `success` reflects the task's success criteria, not the transport.
    pub fn completed(
        task_id: impl Into<String>,
        adapter_name: impl Into<String>,
        start_time: DateTime<Utc>,
        execution_time: f64,
        output: impl Into<String>,
        success: bool,
    ) -> Self {
        let mut result = Self::base(
            task_id,
            adapter_name,
            ExecutionStatus::Completed,
            start_time,
            execution_time,
        );
        result.output = Some(output.into());
        result.success = success;
        result.validation_passed = success;
        result
    }

    /// A result for a task that failed with an error.
    pub fn failed(
        task_id: impl Into<String>,
        adapter_name: impl Into<String>,
        start_time: DateTime<Utc>,
        execution_time: f64,
        error: impl Into<String>,
    ) -> Self {
        let mut result = Self::base(
            task_id,
            adapter_name,
            ExecutionStatus::Failed,
            start_time,
            execution_time,
        );
        result.error = Some(error.into());
        result
    }

    /// A result for a task that hit its deadline.
    ///
    /// `execution_time` is the configured timeout.
    pub fn timed_out(
        task_id: impl Into<String>,
        adapter_name: impl Into<String>,
        start_time: DateTime<Utc>,
        timeout: Duration,
    ) -> Self {
        let mut result = Self::base(
            task_id,
            adapter_name,
            ExecutionStatus::Timeout,
            start_time,
            timeout.as_secs_f64(),
        );
        result.error = Some(format!(
            "Task exceeded timeout of {} seconds",
            format_secs(timeout)
        ));
        result
    }

    pub fn with_trace(mut self, trace: AgentTrace) -> Self {
        self.turns_count = trace.turns.len() as u32;
        self.trace = Some(trace);
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage, cost: f64) -> Self {
        self.token_usage = Some(usage);
        self.cost = Some(cost);
        self
    }

    pub fn with_adapter_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.adapter_metadata = metadata;
        self
    }

    pub fn with_validation_details(mut self, details: serde_json::Value) -> Self {
        self.validation_details = Some(details);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Completed and judged successful.
    pub fn is_successful(&self) -> bool {
        self.status == ExecutionStatus::Completed && self.success
    }

    pub fn duration_seconds(&self) -> f64 {
        self.execution_time
    }
}

/// Aggregated outcome of a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub benchmark_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Wall-clock seconds from start to aggregation.
    pub total_time: f64,

    /// One entry per executed task, in submission order.
    pub task_results: Vec<ExecutionResult>,
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,

    pub total_token_usage: TokenUsage,
    pub total_cost: f64,
    pub average_execution_time: f64,

    pub adapter_name: String,
    pub config: ExecutorConfig,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BenchmarkResult {
    /// Fraction of tasks that succeeded, 0.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.successful_tasks as f64 / self.total_tasks as f64
    }

    pub fn get_task_result(&self, task_id: &str) -> Option<&ExecutionResult> {
        self.task_results.iter().find(|r| r.task_id == task_id)
    }

    pub fn failed_tasks_view(&self) -> Vec<&ExecutionResult> {
        self.task_results
            .iter()
            .filter(|r| !r.is_successful())
            .collect()
    }

    pub fn successful_tasks_view(&self) -> Vec<&ExecutionResult> {
        self.task_results
            .iter()
            .filter(|r| r.is_successful())
            .collect()
    }
}

/// Formats a duration as whole seconds when possible.
fn format_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{}", duration.as_secs_f64())
    }
}
