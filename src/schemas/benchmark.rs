//! Benchmark and task definitions.
//!
//! These types mirror the YAML task format read by
//! [`BenchmarkLoader`](crate::benchmarks::BenchmarkLoader). A loaded [`Task`] is
//! immutable and is consumed read-only by the executors.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DEFAULT_MAX_TURNS;
use crate::schemas::execution::ToolSpec;

/// Task difficulty levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
            DifficultyLevel::Expert => "expert",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DifficultyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(DifficultyLevel::Easy),
            "medium" => Ok(DifficultyLevel::Medium),
            "hard" => Ok(DifficultyLevel::Hard),
            "expert" => Ok(DifficultyLevel::Expert),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// Kinds of evaluation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    General,
    WebNavigation,
    ApiCalling,
    Reasoning,
    Coding,
    ToolUse,
    Conversation,
    Safety,
    Custom,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::General => "general",
            TaskType::WebNavigation => "web_navigation",
            TaskType::ApiCalling => "api_calling",
            TaskType::Reasoning => "reasoning",
            TaskType::Coding => "coding",
            TaskType::ToolUse => "tool_use",
            TaskType::Conversation => "conversation",
            TaskType::Safety => "safety",
            TaskType::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

/// How a task's completion is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    #[default]
    RuleBased,
    LlmJudge,
    Custom,
    ExactMatch,
    Regex,
}

impl fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationMethod::RuleBased => "rule_based",
            ValidationMethod::LlmJudge => "llm_judge",
            ValidationMethod::Custom => "custom",
            ValidationMethod::ExactMatch => "exact_match",
            ValidationMethod::Regex => "regex",
        };
        write!(f, "{}", s)
    }
}

/// Kinds of success criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionType {
    OutputContains,
    OutputMatches,
    ElementPresent,
    TextContains,
    ToolCalled,
    StateReached,
    CustomCheck,
}

impl CriterionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionType::OutputContains => "output_contains",
            CriterionType::OutputMatches => "output_matches",
            CriterionType::ElementPresent => "element_present",
            CriterionType::TextContains => "text_contains",
            CriterionType::ToolCalled => "tool_called",
            CriterionType::StateReached => "state_reached",
            CriterionType::CustomCheck => "custom_check",
        }
    }

    /// Whether the rule-based evaluator can decide this criterion.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            CriterionType::OutputContains
                | CriterionType::OutputMatches
                | CriterionType::TextContains
                | CriterionType::ToolCalled
        )
    }
}

impl fmt::Display for CriterionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptive metadata for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Unique name, used as the task id.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Detailed tool declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// A single declarative success check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCriterion {
    #[serde(rename = "type")]
    pub criterion_type: CriterionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Expected text or pattern for output checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_arguments: Option<HashMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<HashMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl SuccessCriterion {
    pub fn new(criterion_type: CriterionType) -> Self {
        Self {
            criterion_type,
            description: None,
            value: None,
            case_sensitive: false,
            selector: None,
            text: None,
            tool: None,
            with_arguments: None,
            state: None,
            validator: None,
            required: true,
        }
    }

    /// `output_contains` criterion for the given text.
    pub fn output_contains(value: impl Into<String>) -> Self {
        let mut criterion = Self::new(CriterionType::OutputContains);
        criterion.value = Some(value.into());
        criterion
    }

    /// `tool_called` criterion for the given tool name.
    pub fn tool_called(tool: impl Into<String>) -> Self {
        let mut criterion = Self::new(CriterionType::ToolCalled);
        criterion.tool = Some(tool.into());
        criterion
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn matching_case(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

/// Validation configuration of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub method: ValidationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_validator: Option<String>,
    #[serde(default)]
    pub strict: bool,
}

/// Environment setup for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSetup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Seconds.
    #[serde(default = "default_setup_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<HashMap<String, String>>,
}

fn default_setup_timeout() -> u64 {
    300
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

impl Default for TaskSetup {
    fn default() -> Self {
        Self {
            environment: None,
            url: None,
            timeout: default_setup_timeout(),
            max_turns: default_max_turns(),
            fixtures: None,
        }
    }
}

/// The executable part of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub instructions: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<TaskSetup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<HashMap<String, serde_json::Value>>,

    /// Tool names available to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_definitions: Option<Vec<ToolDefinition>>,

    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<serde_json::Value>,

    /// Free-form context. `system_message` is sent as the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl TaskDefinition {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            task_type: TaskType::General,
            instructions: instructions.into(),
            setup: None,
            initial_state: None,
            tools: None,
            tool_definitions: None,
            success_criteria: Vec::new(),
            validation: ValidationConfig::default(),
            expected_output: None,
            context: None,
        }
    }
}

/// Metric selection for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HashMap<String, serde_json::Value>>,
}

/// Result of one evaluated criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionCheck {
    pub criterion_type: CriterionType,
    pub expected: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CriterionCheck {
    fn new(criterion_type: CriterionType, expected: impl Into<String>, passed: bool) -> Self {
        Self {
            criterion_type,
            expected: expected.into(),
            passed,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Outcome of evaluating a task's success criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub checks: Vec<CriterionCheck>,
    /// Required criteria whose type the evaluator cannot decide.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<CriterionType>,
}

/// A complete task: metadata, definition and metric selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub metadata: TaskMetadata,
    pub task: TaskDefinition,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Task {
    /// Builds a minimal task, mostly useful for programmatic suites.
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            metadata: TaskMetadata {
                name: name.into(),
                description: String::new(),
                version: default_version(),
                tags: Vec::new(),
                difficulty: DifficultyLevel::default(),
                author: None,
                created_at: None,
            },
            task: TaskDefinition::new(instructions),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn with_criterion(mut self, criterion: SuccessCriterion) -> Self {
        self.task.success_criteria.push(criterion);
        self
    }

    pub fn with_setup(mut self, setup: TaskSetup) -> Self {
        self.task.setup = Some(setup);
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.task.tools = Some(tools);
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.task
            .context
            .get_or_insert_with(HashMap::new)
            .insert(
                "system_message".to_string(),
                serde_json::Value::String(message.into()),
            );
        self
    }

    /// Stable identifier of the task.
    pub fn task_id(&self) -> &str {
        &self.metadata.name
    }

    pub fn instructions(&self) -> &str {
        &self.task.instructions
    }

    /// The system prompt declared in the task context, if any.
    pub fn system_message(&self) -> Option<&str> {
        self.task
            .context
            .as_ref()
            .and_then(|ctx| ctx.get("system_message"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Whether the task context marks the prompt as one the agent should refuse.
    pub fn should_refuse(&self) -> Option<bool> {
        self.task
            .context
            .as_ref()
            .and_then(|ctx| ctx.get("should_refuse"))
            .and_then(|v| v.as_bool())
    }

    /// Turn budget declared by the task setup.
    pub fn max_turns(&self) -> Option<u32> {
        self.task.setup.as_ref().map(|s| s.max_turns)
    }

    /// Tool declarations normalized to `{name, description, parameters}`.
    ///
    /// Detailed definitions win over bare names.
    pub fn tool_specs(&self) -> Option<Vec<ToolSpec>> {
        if let Some(definitions) = &self.task.tool_definitions {
            return Some(
                definitions
                    .iter()
                    .map(|def| ToolSpec {
                        name: def.name.clone(),
                        description: def.description.clone().unwrap_or_default(),
                        parameters: def
                            .parameters
                            .clone()
                            .unwrap_or_else(|| serde_json::json!({})),
                    })
                    .collect(),
            );
        }

        self.task
            .tools
            .as_ref()
            .map(|names| names.iter().map(ToolSpec::bare).collect())
    }

    /// Evaluates the required success criteria against an output.
    ///
    /// A task without criteria passes. Optional criteria are not evaluated and
    /// unsupported criterion types are skipped; when nothing was evaluated the
    /// task does not pass.
    pub fn evaluate_criteria(
        &self,
        output: &str,
        tools_called: &HashSet<String>,
    ) -> ValidationOutcome {
        if self.task.success_criteria.is_empty() {
            return ValidationOutcome {
                passed: true,
                ..Default::default()
            };
        }

        let mut outcome = ValidationOutcome::default();

        for criterion in self.task.success_criteria.iter().filter(|c| c.required) {
            match check_criterion(criterion, output, tools_called) {
                Some(check) => outcome.checks.push(check),
                None => {
                    warn!(
                        task_id = %self.task_id(),
                        criterion = %criterion.criterion_type,
                        "Skipping unsupported success criterion"
                    );
                    outcome.skipped.push(criterion.criterion_type);
                }
            }
        }

        outcome.passed = !outcome.checks.is_empty() && outcome.checks.iter().all(|c| c.passed);
        outcome
    }

    /// Returns whether the output satisfies the task's success criteria.
    pub fn validate_success(&self, output: &str, tools_called: &HashSet<String>) -> bool {
        self.evaluate_criteria(output, tools_called).passed
    }
}

fn check_criterion(
    criterion: &SuccessCriterion,
    output: &str,
    tools_called: &HashSet<String>,
) -> Option<CriterionCheck> {
    let kind = criterion.criterion_type;
    let check = match kind {
        CriterionType::OutputContains | CriterionType::TextContains => {
            let expected = match kind {
                CriterionType::TextContains => {
                    criterion.text.as_ref().or(criterion.value.as_ref())
                }
                _ => criterion.value.as_ref(),
            };
            match expected {
                Some(expected) => {
                    // Case-insensitive unless the criterion sets `case_sensitive: true`.
                    let passed = if criterion.case_sensitive {
                        output.contains(expected.as_str())
                    } else {
                        output.to_lowercase().contains(&expected.to_lowercase())
                    };
                    CriterionCheck::new(kind, expected.clone(), passed)
                }
                None => CriterionCheck::new(kind, "", false).with_error("no expected value"),
            }
        }
        CriterionType::OutputMatches => match criterion.value.as_ref() {
            Some(pattern) => match RegexBuilder::new(pattern)
                .case_insensitive(!criterion.case_sensitive)
                .build()
            {
                Ok(re) => CriterionCheck::new(kind, pattern.clone(), re.is_match(output)),
                Err(e) => CriterionCheck::new(kind, pattern.clone(), false)
                    .with_error(format!("invalid pattern: {}", e)),
            },
            None => CriterionCheck::new(kind, "", false).with_error("no pattern"),
        },
        CriterionType::ToolCalled => match criterion.tool.as_ref() {
            Some(tool) => CriterionCheck::new(kind, tool.clone(), tools_called.contains(tool)),
            None => CriterionCheck::new(kind, "", false).with_error("no tool name"),
        },
        CriterionType::ElementPresent
        | CriterionType::StateReached
        | CriterionType::CustomCheck => return None,
    };
    Some(check)
}

/// Execution options declared by a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default)]
    pub parallel_execution: bool,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub max_retries: u32,
    /// Seconds.
    #[serde(default = "default_suite_timeout")]
    pub timeout_per_task: u64,
    #[serde(default = "default_true")]
    pub save_traces: bool,
    #[serde(default)]
    pub stop_on_failure: bool,
}

fn default_concurrency() -> usize {
    5
}

fn default_suite_timeout() -> u64 {
    600
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            parallel_execution: false,
            max_concurrency: default_concurrency(),
            max_retries: 0,
            timeout_per_task: default_suite_timeout(),
            save_traces: true,
            stop_on_failure: false,
        }
    }
}

/// Reporting options declared by a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_true")]
    pub aggregate_metrics: bool,
    #[serde(default = "default_true")]
    pub save_traces: bool,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_output_format() -> String {
    "json".to_string()
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            aggregate_metrics: true,
            save_traces: true,
            output_format: default_output_format(),
        }
    }
}

/// Reference to a task file inside a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskReference {
    Path(String),
    Weighted {
        file: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weight: Option<f64>,
    },
}

impl TaskReference {
    pub fn file(&self) -> &str {
        match self {
            TaskReference::Path(path) => path,
            TaskReference::Weighted { file, .. } => file,
        }
    }

    pub fn weight(&self) -> Option<f64> {
        match self {
            TaskReference::Path(_) => None,
            TaskReference::Weighted { weight, .. } => *weight,
        }
    }
}

/// Suite file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tasks: Vec<TaskReference>,
    #[serde(default)]
    pub config: BenchmarkConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// A suite together with its loaded tasks.
#[derive(Debug, Clone)]
pub struct Benchmark {
    pub suite: BenchmarkSuite,
    pub tasks: Vec<Task>,
}

impl Benchmark {
    /// Wraps standalone tasks into an unnamed suite.
    pub fn from_tasks(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            suite: BenchmarkSuite {
                name: name.into(),
                description: String::new(),
                version: default_version(),
                tasks: Vec::new(),
                config: BenchmarkConfig::default(),
                reporting: ReportingConfig::default(),
                metadata: None,
            },
            tasks,
        }
    }

    pub fn name(&self) -> &str {
        &self.suite.name
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id() == task_id)
    }

    pub fn tasks_by_tag(&self, tag: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.metadata.tags.iter().any(|x| x == tag))
            .collect()
    }

    pub fn tasks_by_difficulty(&self, difficulty: DifficultyLevel) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.metadata.difficulty == difficulty)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_criteria_passes() {
        let task = Task::new("t", "do it");
        assert!(task.validate_success("", &HashSet::new()));
    }

    #[test]
    fn test_output_contains() {
        let task = Task::new("math", "2+2?").with_criterion(SuccessCriterion::output_contains("4"));
        assert!(task.validate_success("The answer is 4", &HashSet::new()));
        assert!(!task.validate_success("The answer is 5", &HashSet::new()));
    }

    #[test]
    fn test_output_contains_case_handling() {
        let insensitive =
            Task::new("t", "x").with_criterion(SuccessCriterion::output_contains("Paris"));
        assert!(insensitive.validate_success("paris, france", &HashSet::new()));

        let sensitive = Task::new("t", "x")
            .with_criterion(SuccessCriterion::output_contains("Paris").matching_case());
        assert!(!sensitive.validate_success("paris, france", &HashSet::new()));
    }

    #[test]
    fn test_tool_called() {
        let task = Task::new("t", "x").with_criterion(SuccessCriterion::tool_called("search"));
        assert!(task.validate_success("", &tools(&["search", "open"])));
        assert!(!task.validate_success("", &tools(&["open"])));
    }

    #[test]
    fn test_output_matches() {
        let mut criterion = SuccessCriterion::new(CriterionType::OutputMatches);
        criterion.value = Some(r"\d{3}-\d{4}".to_string());
        let task = Task::new("t", "x").with_criterion(criterion);
        assert!(task.validate_success("call 555-1234", &HashSet::new()));
        assert!(!task.validate_success("call me", &HashSet::new()));
    }

    #[test]
    fn test_invalid_regex_fails_check() {
        let mut criterion = SuccessCriterion::new(CriterionType::OutputMatches);
        criterion.value = Some("(".to_string());
        let task = Task::new("t", "x").with_criterion(criterion);
        let outcome = task.evaluate_criteria("(", &HashSet::new());
        assert!(!outcome.passed);
        assert!(outcome.checks[0].error.is_some());
    }

    #[test]
    fn test_optional_criteria_not_evaluated() {
        let task = Task::new("t", "x")
            .with_criterion(SuccessCriterion::output_contains("4"))
            .with_criterion(SuccessCriterion::output_contains("never").optional());
        let outcome = task.evaluate_criteria("4", &HashSet::new());
        assert!(outcome.passed);
        assert_eq!(outcome.checks.len(), 1);
    }

    #[test]
    fn test_only_unsupported_criteria_fails() {
        let task = Task::new("t", "x")
            .with_criterion(SuccessCriterion::new(CriterionType::StateReached));
        let outcome = task.evaluate_criteria("anything", &HashSet::new());
        assert!(!outcome.passed);
        assert!(outcome.checks.is_empty());
        assert_eq!(outcome.skipped, vec![CriterionType::StateReached]);
    }

    #[test]
    fn test_unsupported_criteria_skipped_alongside_supported() {
        let task = Task::new("t", "x")
            .with_criterion(SuccessCriterion::new(CriterionType::CustomCheck))
            .with_criterion(SuccessCriterion::output_contains("ok"));
        assert!(task.validate_success("ok", &HashSet::new()));
    }

    #[test]
    fn test_only_optional_criteria_fails() {
        let task = Task::new("t", "x")
            .with_criterion(SuccessCriterion::output_contains("ok").optional());
        assert!(!task.validate_success("ok", &HashSet::new()));
    }

    #[test]
    fn test_tool_specs() {
        let task = Task::new("t", "x").with_tools(vec!["search".to_string()]);
        let specs = task.tool_specs().unwrap();
        assert_eq!(specs[0].name, "search");
        assert_eq!(specs[0].description, "");
        assert_eq!(specs[0].parameters, serde_json::json!({}));

        let mut detailed = task.clone();
        detailed.task.tool_definitions = Some(vec![ToolDefinition {
            name: "lookup".to_string(),
            description: Some("Look something up".to_string()),
            parameters: Some(serde_json::json!({"type": "object"})),
        }]);
        let specs = detailed.tool_specs().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "lookup");
        assert_eq!(specs[0].parameters["type"], "object");

        assert!(Task::new("t", "x").tool_specs().is_none());
    }

    #[test]
    fn test_system_message_and_turns() {
        let task = Task::new("t", "x").with_system_message("You are terse.");
        assert_eq!(task.system_message(), Some("You are terse."));
        assert_eq!(task.max_turns(), None);

        let task = task.with_setup(TaskSetup {
            max_turns: 3,
            ..Default::default()
        });
        assert_eq!(task.max_turns(), Some(3));
    }

    #[test]
    fn test_criterion_deserialize_defaults() {
        let criterion: SuccessCriterion =
            serde_yaml::from_str("type: output_contains\nvalue: \"42\"\n").unwrap();
        assert_eq!(criterion.criterion_type, CriterionType::OutputContains);
        assert!(criterion.required);
        assert!(!criterion.case_sensitive);
    }

    #[test]
    fn test_declared_criteria_ignore_case_by_default() {
        let yaml = "
- type: output_contains
  value: paris
- type: text_contains
  text: FRANCE
";
        let criteria: Vec<SuccessCriterion> = serde_yaml::from_str(yaml).unwrap();
        let mut task = Task::new("t", "x");
        task.task.success_criteria = criteria;
        assert!(task.validate_success("PARIS, France", &HashSet::new()));

        task.task.success_criteria[0].case_sensitive = true;
        let outcome = task.evaluate_criteria("PARIS, France", &HashSet::new());
        assert!(!outcome.passed);
        assert!(!outcome.checks[0].passed);
        assert!(outcome.checks[1].passed);
    }

    #[test]
    fn test_should_refuse_from_context() {
        let mut task = Task::new("t", "x");
        assert_eq!(task.should_refuse(), None);
        task.task.context = Some(HashMap::from([(
            "should_refuse".to_string(),
            serde_json::json!(true),
        )]));
        assert_eq!(task.should_refuse(), Some(true));
    }

    #[test]
    fn test_benchmark_filters() {
        let mut easy = Task::new("a", "x");
        easy.metadata.difficulty = DifficultyLevel::Easy;
        easy.metadata.tags.push("math".to_string());
        let medium = Task::new("b", "y");
        let benchmark = Benchmark::from_tasks("demo", vec![easy, medium]);

        assert_eq!(benchmark.task_count(), 2);
        assert_eq!(benchmark.tasks_by_tag("math").len(), 1);
        assert_eq!(
            benchmark.tasks_by_difficulty(DifficultyLevel::Medium)[0].task_id(),
            "b"
        );
        assert!(benchmark.get_task("a").is_some());
    }
}
