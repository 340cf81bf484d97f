//! CLI command definitions for agenteval.
//!
//! Three commands: `run` executes a benchmark against a provider adapter,
//! `list` shows adapters, metrics or benchmarks, and `validate` checks a task
//! or suite file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::adapters::{AdapterConfig, AdapterRegistry};
use crate::benchmarks::{BenchmarkLoader, DiscoveredBenchmark};
use crate::config::{ExecutorConfig, ExecutorKind, Settings, ENV_PREFIX};
use crate::executor::create_executor;
use crate::metrics::{export_metrics, init_metrics, MetricCategory, MetricKind};
use crate::reporters::{ConsoleReporter, JsonReporter, Reporter};
use crate::schemas::{BenchmarkResult, Task};

/// Default directory searched for named benchmarks.
const DEFAULT_BENCHMARKS_DIR: &str = "benchmarks";

/// Evaluation harness for LLM-based agents.
#[derive(Parser)]
#[command(name = "agenteval")]
#[command(about = "Run declarative benchmarks against LLM agents")]
#[command(version)]
#[command(
    long_about = "agenteval loads YAML task definitions, runs them against a model provider and reports success rates, token usage and cost.\n\nExample usage:\n  agenteval run reasoning --adapter anthropic\n  agenteval run my_task.yaml --adapter openai --model gpt-4o --format json --output results.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a benchmark evaluation.
    Run(RunArgs),

    /// List available adapters, metrics or benchmarks.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Validate a task or suite file.
    Validate(ValidateArgs),
}

/// Report output format.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
}

/// Arguments for `agenteval run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Benchmark name or path to a task/suite YAML file.
    pub benchmark: String,

    /// Adapter name (anthropic, openai).
    #[arg(short = 'a', long)]
    pub adapter: String,

    /// Model name. Defaults to AGENTEVAL_DEFAULT_MODEL, then the adapter's default.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Write the report to this file.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Report format.
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    /// Run tasks concurrently.
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Maximum concurrent tasks when running in parallel.
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Run parallel tasks in batches of this size.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Per-task timeout in seconds.
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Do not write execution traces.
    #[arg(long)]
    pub no_trace: bool,

    /// Stop at the first unsuccessful task (sequential mode).
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Write Prometheus metrics for the run to this file.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Directory searched for named benchmarks.
    #[arg(long, default_value = DEFAULT_BENCHMARKS_DIR)]
    pub benchmarks_dir: PathBuf,
}

/// What `agenteval list` shows.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    #[value(alias = "adapter")]
    Adapters,
    #[value(alias = "metric")]
    Metrics,
    #[value(alias = "benchmark")]
    Benchmarks,
}

/// Arguments for `agenteval list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Resource type to list.
    #[arg(value_enum, default_value = "benchmarks")]
    pub resource: ResourceKind,

    /// Only show benchmarks carrying one of these tags.
    #[arg(short = 't', long)]
    pub tag: Vec<String>,

    /// Directory searched for benchmarks.
    #[arg(long, default_value = DEFAULT_BENCHMARKS_DIR)]
    pub benchmarks_dir: PathBuf,
}

/// Arguments for `agenteval validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to a task or suite YAML file.
    pub file: PathBuf,

    /// Also require instructions, success criteria and supported criterion types.
    #[arg(long)]
    pub strict: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_benchmark_command(args).await,
        Commands::List(args) => run_list_command(args),
        Commands::Validate(args) => run_validate_command(args),
    }
}

// ============================================================================
// run
// ============================================================================

async fn run_benchmark_command(args: RunArgs) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    settings.validate()?;

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let benchmark = BenchmarkLoader::resolve(&args.benchmark, &args.benchmarks_dir)
        .with_context(|| format!("Failed to load benchmark '{}'", args.benchmark))?;
    info!(benchmark = %benchmark.name(), tasks = benchmark.task_count(), "Loaded benchmark");

    let registry = AdapterRegistry::with_builtin();
    if !registry.is_registered(&args.adapter) {
        anyhow::bail!(
            "Unknown adapter: {}. Available: {}",
            args.adapter,
            registry.list().join(", ")
        );
    }

    let api_key = settings.get_api_key(&args.adapter).ok_or_else(|| {
        anyhow::anyhow!(
            "API key not configured for {}. Set {}{}_API_KEY",
            args.adapter,
            ENV_PREFIX,
            args.adapter.to_uppercase()
        )
    })?;

    let model = args
        .model
        .clone()
        .or_else(|| settings.default_model.clone())
        .or_else(|| {
            registry
                .info(&args.adapter)
                .ok()
                .and_then(|info| info.default_model.clone())
        })
        .ok_or_else(|| anyhow::anyhow!("Model not specified for {}", args.adapter))?;

    let adapter = registry.create(
        &args.adapter,
        AdapterConfig::new().with_api_key(api_key).with_model(&model),
    )?;
    adapter.validate_config()?;

    let config = executor_config(&args, &settings);
    config.validate()?;

    let kind = if args.parallel {
        ExecutorKind::Parallel
    } else {
        settings.default_executor
    };
    info!(
        benchmark = %benchmark.name(),
        adapter = %adapter.name(),
        executor = %kind,
        max_concurrency = config.max_concurrency,
        timeout_secs = config.timeout.as_secs_f64(),
        "Running benchmark"
    );

    let result = create_executor(kind, config)
        .execute_benchmark(&benchmark.tasks, adapter.as_ref(), benchmark.name())
        .await;

    report(&args, &result)?;

    if let Some(path) = &args.metrics_file {
        std::fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write metrics file {}", path.display()))?;
        info!(path = %path.display(), "Metrics written");
    }

    if result.failed_tasks > 0 {
        anyhow::bail!(
            "{} of {} tasks failed",
            result.failed_tasks,
            result.total_tasks
        );
    }

    Ok(())
}

fn executor_config(args: &RunArgs, settings: &Settings) -> ExecutorConfig {
    let mut config = ExecutorConfig::from_settings(settings)
        .with_save_traces(settings.save_traces && !args.no_trace)
        .with_stop_on_failure(settings.stop_on_failure || args.stop_on_failure);

    if let Some(concurrency) = args.concurrency {
        config = config.with_max_concurrency(concurrency);
    }
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(size) = args.batch_size {
        config = config.with_batch_size(size);
    }
    config
}

fn report(args: &RunArgs, result: &BenchmarkResult) -> anyhow::Result<()> {
    let reporter: Box<dyn Reporter> = match args.format {
        OutputFormat::Json => Box::new(JsonReporter::new().with_metrics(MetricKind::defaults())),
        OutputFormat::Console => Box::new(ConsoleReporter::new()),
    };

    if args.format == OutputFormat::Console || args.output.is_none() {
        reporter.print(result)?;
    }

    if let Some(path) = &args.output {
        reporter.save(result, path)?;
        println!("\nReport saved to: {}", path.display());
    }

    Ok(())
}

// ============================================================================
// list
// ============================================================================

fn run_list_command(args: ListArgs) -> anyhow::Result<()> {
    match args.resource {
        ResourceKind::Adapters => list_adapters(),
        ResourceKind::Metrics => list_metrics(),
        ResourceKind::Benchmarks => list_benchmarks(&args.benchmarks_dir, &args.tag),
    }
    Ok(())
}

fn list_adapters() {
    let registry = AdapterRegistry::with_builtin();

    println!("\nAvailable Adapters");
    println!("{}", "=".repeat(60));

    for info in registry.all_info() {
        println!("\n{}", info.name);
        println!("   {}", info.description);
        if let Some(model) = &info.default_model {
            println!("   Default model: {}", model);
        }

        let mut features = Vec::new();
        if info.supports_tools {
            features.push("Tool calling");
        }
        if info.supports_streaming {
            features.push("Streaming");
        }
        if !features.is_empty() {
            println!("   {}", features.join(" | "));
        }
    }
    println!();
}

fn list_metrics() {
    println!("\nAvailable Metrics");
    println!("{}", "=".repeat(60));

    for &category in MetricCategory::all() {
        let kinds: Vec<_> = MetricKind::all()
            .iter()
            .filter(|k| k.category() == category)
            .collect();
        if kinds.is_empty() {
            continue;
        }

        println!("\n{} Metrics:", category.to_string().to_uppercase());
        println!("{}", "-".repeat(60));
        for kind in kinds {
            println!("  - {} ({})", kind, kind.unit());
            println!("    {}", kind.description());
        }
    }
    println!();
}

fn list_benchmarks(dir: &Path, tags: &[String]) {
    println!("\nAvailable Benchmarks");
    println!("{}", "=".repeat(60));

    if !dir.is_dir() {
        println!("No benchmarks directory found.");
        println!("Create benchmarks in {}/", dir.display());
        return;
    }

    let matches_tags =
        |task: &Task| tags.is_empty() || task.metadata.tags.iter().any(|t| tags.contains(t));

    let mut suites = Vec::new();
    let mut tasks = Vec::new();
    for found in BenchmarkLoader::discover(dir) {
        match found {
            DiscoveredBenchmark::Suite { name, path } => suites.push((name, path)),
            DiscoveredBenchmark::Task { name, path } => tasks.push((name, path)),
        }
    }

    let mut shown = 0;

    if !suites.is_empty() {
        println!("\nBenchmark Suites:");
        println!("{}", "-".repeat(60));
        for (name, path) in &suites {
            match BenchmarkLoader::load_suite(path) {
                Ok(benchmark) => {
                    let count = benchmark.tasks.iter().filter(|&t| matches_tags(t)).count();
                    if count == 0 && !tags.is_empty() {
                        continue;
                    }
                    println!("  {}", name);
                    println!("     Path: {}", path.display());
                    println!("     Tasks: {}", count);
                    if !benchmark.suite.description.is_empty() {
                        println!("     {}", benchmark.suite.description);
                    }
                }
                Err(e) => {
                    if !tags.is_empty() {
                        continue;
                    }
                    println!("  {} (failed to load: {})", name, e);
                    println!("     Path: {}", path.display());
                }
            }
            shown += 1;
        }
    }

    let tasks: Vec<_> = tasks
        .into_iter()
        .filter(|(_, path)| {
            tags.is_empty()
                || BenchmarkLoader::load_task(path)
                    .map(|t| matches_tags(&t))
                    .unwrap_or(false)
        })
        .collect();

    if !tasks.is_empty() {
        println!("\nIndividual Tasks:");
        println!("{}", "-".repeat(60));
        for (name, path) in &tasks {
            println!("  {}", name);
            println!("     Path: {}", path.display());
        }
        shown += tasks.len();
    }

    if shown == 0 {
        println!("\nNo benchmarks found.");
    }
    println!();
}

// ============================================================================
// validate
// ============================================================================

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let path = args.file.as_path();
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if !is_yaml {
        anyhow::bail!("File must be YAML (.yaml or .yml): {}", path.display());
    }

    println!("Validating: {}\n", path.display());

    let is_suite = path
        .file_name()
        .map(|n| n.to_string_lossy().contains("suite"))
        .unwrap_or(false);

    let tasks = if is_suite {
        let benchmark = BenchmarkLoader::load_suite(path)
            .with_context(|| format!("Validation failed for {}", path.display()))?;
        println!("Suite loaded successfully");
        println!("   Name: {}", benchmark.suite.name);
        println!("   Description: {}", benchmark.suite.description);
        println!("   Tasks: {}", benchmark.task_count());
        for task in &benchmark.tasks {
            println!("     - {}", task.task_id());
        }
        benchmark.tasks
    } else {
        let task = BenchmarkLoader::load_task(path)
            .with_context(|| format!("Validation failed for {}", path.display()))?;
        println!("Task loaded successfully");
        println!("   Name: {}", task.metadata.name);
        println!("   Description: {}", task.metadata.description);
        println!("   Type: {}", task.task.task_type);
        println!("   Difficulty: {}", task.metadata.difficulty);
        println!("   Validation method: {}", task.task.validation.method);
        println!("   Success criteria: {}", task.task.success_criteria.len());
        if let Some(specs) = task.tool_specs() {
            println!("   Tools: {}", specs.len());
        }
        if task.task.expected_output.is_some() {
            println!("   Expected output: defined");
        }
        vec![task]
    };

    if args.strict {
        let problems: Vec<String> = tasks.iter().flat_map(strict_problems).collect();
        println!("\nStrict checks:");
        if problems.is_empty() {
            println!("  all passed");
        } else {
            for problem in &problems {
                println!("  - {}", problem);
            }
            anyhow::bail!("{} strict check(s) failed", problems.len());
        }
    }

    println!("\nValidation successful");
    Ok(())
}

/// Problems `--strict` reports for one task.
fn strict_problems(task: &Task) -> Vec<String> {
    let mut problems = Vec::new();
    let id = task.task_id();

    if task.instructions().trim().is_empty() {
        problems.push(format!("{}: missing instructions", id));
    }
    if task.task.success_criteria.is_empty() {
        problems.push(format!("{}: no success criteria defined", id));
    }
    for criterion in &task.task.success_criteria {
        if !criterion.criterion_type.is_supported() {
            problems.push(format!(
                "{}: criterion type '{}' cannot be evaluated",
                id, criterion.criterion_type
            ));
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{CriterionType, SuccessCriterion};

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "agenteval", "run", "reasoning", "-a", "openai", "-m", "gpt-4o-mini", "-p", "-c", "3",
            "--batch-size", "10", "-t", "60", "--no-trace", "-f", "json",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.benchmark, "reasoning");
        assert_eq!(args.adapter, "openai");
        assert_eq!(args.model.as_deref(), Some("gpt-4o-mini"));
        assert!(args.parallel);
        assert_eq!(args.concurrency, Some(3));
        assert_eq!(args.batch_size, Some(10));
        assert_eq!(args.timeout, Some(60));
        assert!(args.no_trace);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_parse_list_and_validate() {
        let cli = Cli::try_parse_from(["agenteval", "list", "adapters"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List(ListArgs { resource: ResourceKind::Adapters, .. })
        ));

        let cli = Cli::try_parse_from([
            "agenteval",
            "validate",
            "task.yaml",
            "--strict",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate command");
        };
        assert!(args.strict);
    }

    #[test]
    fn test_run_requires_adapter() {
        assert!(Cli::try_parse_from(["agenteval", "run", "reasoning"]).is_err());
    }

    #[test]
    fn test_executor_config_overrides() {
        let args = RunArgs::try_parse_from([
            "run", "b", "-a", "anthropic", "-c", "2", "-t", "45", "--no-trace", "--stop-on-failure",
        ])
        .unwrap();
        let settings = Settings::default();

        let config = executor_config(&args, &settings);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert!(!config.save_traces);
        assert!(config.stop_on_failure);
        assert_eq!(config.batch_size, None);
    }

    #[test]
    fn test_strict_problems() {
        let good =
            Task::new("good", "Say hi").with_criterion(SuccessCriterion::output_contains("hi"));
        assert!(strict_problems(&good).is_empty());

        let bare = Task::new("bare", "   ");
        assert_eq!(strict_problems(&bare).len(), 2);

        let unsupported = Task::new("ui", "Click it")
            .with_criterion(SuccessCriterion::new(CriterionType::ElementPresent));
        let problems = strict_problems(&unsupported);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("element_present"));
    }
}
