//! Scripted fake adapters shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agent_eval::adapters::{Adapter, UsageTracker};
use agent_eval::error::AdapterError;
use agent_eval::schemas::{
    AgentMessage, AgentResponse, SuccessCriterion, Task, TokenUsage, ToolSpec,
};
use async_trait::async_trait;

/// What the adapter does for one prompt.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    ReplyAfter(String, Duration),
    Fail(String),
    Hang,
    Panic,
}

/// Adapter whose behaviour is keyed by the user prompt it receives.
///
/// Tracks how many calls are in flight and the highest value observed.
pub struct ScriptedAdapter {
    script: HashMap<String, Step>,
    fallback: Step,
    usage: UsageTracker,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(fallback: Step) -> Self {
        Self {
            script: HashMap::new(),
            fallback,
            usage: UsageTracker::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `reply` immediately.
    pub fn replying(reply: &str) -> Self {
        Self::new(Step::Reply(reply.to_string()))
    }

    pub fn on(mut self, prompt: &str, step: Step) -> Self {
        self.script.insert(prompt.to_string(), step);
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn perform(&self, step: Step) -> Result<AgentResponse, AdapterError> {
        let reply = match step {
            Step::Reply(reply) => reply,
            Step::ReplyAfter(reply, delay) => {
                tokio::time::sleep(delay).await;
                reply
            }
            Step::Fail(message) => return Err(AdapterError::Execution(message)),
            Step::Hang => std::future::pending::<String>().await,
            Step::Panic => panic!("scripted adapter panic"),
        };

        let usage = TokenUsage::new(10, 5);
        let cost = 0.001;
        self.usage.record(&usage, cost);
        Ok(AgentResponse::new(reply)
            .with_token_usage(usage)
            .with_model("scripted-1")
            .with_cost(cost))
    }
}

/// Decrements the in-flight counter however the call ends.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> String {
        "scripted/scripted-1".to_string()
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        messages: &[AgentMessage],
        _tools: Option<&[ToolSpec]>,
        _max_turns: u32,
    ) -> Result<AgentResponse, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let step = self
            .script
            .get(&prompt)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        self.perform(step).await
    }

    fn token_usage(&self) -> TokenUsage {
        self.usage.usage()
    }

    fn cost(&self) -> f64 {
        self.usage.cost()
    }

    fn reset_usage(&self) {
        self.usage.reset();
    }

    fn validate_config(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// A task whose prompt equals its name, so scripts can key on either.
pub fn task(name: &str) -> Task {
    Task::new(name, name)
}

/// A task that passes when the output contains `expected`.
pub fn task_expecting(name: &str, expected: &str) -> Task {
    task(name).with_criterion(SuccessCriterion::output_contains(expected))
}
