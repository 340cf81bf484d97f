//! YAML loader for tasks and benchmark suites.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::TaskLoadError;
use crate::schemas::{Benchmark, BenchmarkSuite, Task};

/// File name that marks a directory as a benchmark suite.
pub const SUITE_FILE_NAME: &str = "suite.yaml";

/// A suite or standalone task found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveredBenchmark {
    Suite { name: String, path: PathBuf },
    Task { name: String, path: PathBuf },
}

/// Loads task and suite definitions from YAML.
#[derive(Debug, Clone, Copy, Default)]
pub struct BenchmarkLoader;

impl BenchmarkLoader {
    /// Loads a single task file.
    pub fn load_task(path: impl AsRef<Path>) -> Result<Task, TaskLoadError> {
        let path = path.as_ref();
        let content = read_file(path)?;
        let task = Self::load_from_str(&content, &path.display().to_string())?;
        debug!(path = %path.display(), task_id = %task.task_id(), "Loaded task");
        Ok(task)
    }

    /// Parses a task from YAML text. `origin` is used in error messages.
    pub fn load_from_str(content: &str, origin: &str) -> Result<Task, TaskLoadError> {
        let task: Task = serde_yaml::from_str(content).map_err(|source| TaskLoadError::Yaml {
            path: origin.to_string(),
            source,
        })?;

        if task.metadata.name.trim().is_empty() {
            return Err(TaskLoadError::Invalid(format!(
                "{}: metadata.name must not be empty",
                origin
            )));
        }

        Ok(task)
    }

    /// Loads a suite file and every task it references.
    ///
    /// Task paths are resolved relative to the suite file. A reference weight
    /// is recorded on the task as a `weight:<w>` tag.
    pub fn load_suite(path: impl AsRef<Path>) -> Result<Benchmark, TaskLoadError> {
        let path = path.as_ref();
        let content = read_file(path)?;

        let mut suite: BenchmarkSuite =
            serde_yaml::from_str(&content).map_err(|source| TaskLoadError::Yaml {
                path: path.display().to_string(),
                source,
            })?;

        if suite.name.trim().is_empty() {
            suite.name = default_suite_name(path);
        }

        if suite.tasks.is_empty() {
            return Err(TaskLoadError::EmptySuite(suite.name));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tasks = Vec::with_capacity(suite.tasks.len());

        for reference in &suite.tasks {
            let mut task = Self::load_task(base_dir.join(reference.file()))?;
            if let Some(weight) = reference.weight() {
                task.metadata.tags.push(format!("weight:{}", weight));
            }
            tasks.push(task);
        }

        info!(suite = %suite.name, tasks = tasks.len(), "Loaded benchmark suite");
        Ok(Benchmark { suite, tasks })
    }

    /// Resolves a benchmark argument into a loaded benchmark.
    ///
    /// A YAML path whose file name contains `suite` is loaded as a suite; any
    /// other YAML path is wrapped as a one-task benchmark. Anything else is
    /// looked up as `<benchmarks_dir>/<name>/suite.yaml`.
    pub fn resolve(
        benchmark: &str,
        benchmarks_dir: impl AsRef<Path>,
    ) -> Result<Benchmark, TaskLoadError> {
        let path = Path::new(benchmark);

        if path.is_file() && is_yaml(path) {
            let is_suite = path
                .file_name()
                .map(|n| n.to_string_lossy().contains("suite"))
                .unwrap_or(false);

            if is_suite {
                return Self::load_suite(path);
            }

            let task = Self::load_task(path)?;
            let mut wrapped = Benchmark::from_tasks(task.task_id().to_string(), Vec::new());
            wrapped.suite.description = task.metadata.description.clone();
            wrapped.tasks.push(task);
            return Ok(wrapped);
        }

        let suite_file = benchmarks_dir.as_ref().join(benchmark).join(SUITE_FILE_NAME);
        if suite_file.is_file() {
            return Self::load_suite(suite_file);
        }

        Err(TaskLoadError::NotFound(benchmark.to_string()))
    }

    /// Returns true if the task file loads.
    pub fn validate_task_file(path: impl AsRef<Path>) -> bool {
        Self::load_task(path).is_ok()
    }

    /// Task ids of a suite, or an empty list if the suite fails to load.
    pub fn list_tasks_in_suite(path: impl AsRef<Path>) -> Vec<String> {
        Self::load_suite(path)
            .map(|b| b.tasks.iter().map(|t| t.task_id().to_string()).collect())
            .unwrap_or_default()
    }

    /// Finds suites and standalone task files under a directory.
    pub fn discover(dir: impl AsRef<Path>) -> Vec<DiscoveredBenchmark> {
        let mut found = Vec::new();

        for entry in WalkDir::new(dir.as_ref())
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_yaml(e.path()))
        {
            let path = entry.path().to_path_buf();
            if entry.file_name() == SUITE_FILE_NAME {
                let name = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "suite".to_string());
                found.push(DiscoveredBenchmark::Suite { name, path });
            } else {
                let name = path
                    .file_stem()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                found.push(DiscoveredBenchmark::Task { name, path });
            }
        }

        found
    }
}

fn read_file(path: &Path) -> Result<String, TaskLoadError> {
    if !path.exists() {
        return Err(TaskLoadError::NotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn default_suite_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "benchmark".to_string())
}
