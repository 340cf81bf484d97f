//! Model provider adapters.
//!
//! An [`Adapter`] wraps one provider behind a uniform execute/stream interface
//! and keeps cumulative token usage and cost counters. Executors share a single
//! adapter instance across every task of a run, so the counters live behind a
//! [`UsageTracker`].

mod anthropic;
mod openai;
mod registry;
mod sse;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;
pub use registry::{AdapterConstructor, AdapterInfo, AdapterRegistry};

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MAX_TURNS;
use crate::error::AdapterError;
use crate::schemas::{AgentMessage, AgentResponse, TokenUsage, ToolSpec};

/// A boxed stream of partial responses.
pub type ResponseStream<'a> =
    Pin<Box<dyn Stream<Item = Result<AgentResponse, AdapterError>> + Send + 'a>>;

/// Default generation limit per request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Connection and sampling options for an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Overrides the provider's public endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            api_base: None,
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Checks that an API key and model are present.
    pub fn require_credentials(&self, provider: &str) -> Result<(), AdapterError> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(AdapterError::MissingApiKey(provider.to_string()));
        }
        if self.model.as_deref().map_or(true, str::is_empty) {
            return Err(AdapterError::MissingModel(provider.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UsageState {
    usage: TokenUsage,
    cost: f64,
}

/// Cumulative usage and cost counters shared by concurrent calls.
#[derive(Debug, Default)]
pub struct UsageTracker {
    state: Mutex<UsageState>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one call's usage and cost.
    pub fn record(&self, usage: &TokenUsage, cost: f64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.usage += *usage;
        state.cost += cost;
    }

    pub fn usage(&self) -> TokenUsage {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .usage
    }

    pub fn cost(&self) -> f64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).cost
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = UsageState::default();
    }
}

/// Uniform interface over a model provider.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// `provider/model`, e.g. `anthropic/claude-3-5-sonnet-20241022`.
    fn name(&self) -> String;

    fn model(&self) -> &str;

    fn supports_tools(&self) -> bool;

    fn supports_streaming(&self) -> bool;

    /// Runs the conversation and returns the final reply.
    ///
    /// Usage and cost of the call are added to the adapter's counters.
    async fn execute(
        &self,
        messages: &[AgentMessage],
        tools: Option<&[ToolSpec]>,
        max_turns: u32,
    ) -> Result<AgentResponse, AdapterError>;

    /// Streams partial replies.
    ///
    /// The default yields the result of [`Adapter::execute`] as a single item.
    fn stream_execute<'a>(
        &'a self,
        messages: &'a [AgentMessage],
        tools: Option<&'a [ToolSpec]>,
    ) -> ResponseStream<'a> {
        Box::pin(async_stream::stream! {
            yield self.execute(messages, tools, DEFAULT_MAX_TURNS).await;
        })
    }

    /// Cumulative usage since creation or the last reset.
    fn token_usage(&self) -> TokenUsage;

    /// Cumulative cost in USD since creation or the last reset.
    fn cost(&self) -> f64;

    fn reset_usage(&self);

    /// Descriptive information recorded on each result.
    fn metadata(&self) -> HashMap<String, serde_json::Value> {
        let mut metadata = HashMap::new();
        metadata.insert("adapter_name".to_string(), serde_json::json!(self.name()));
        metadata.insert("model".to_string(), serde_json::json!(self.model()));
        metadata.insert(
            "supports_tools".to_string(),
            serde_json::json!(self.supports_tools()),
        );
        metadata.insert(
            "supports_streaming".to_string(),
            serde_json::json!(self.supports_streaming()),
        );
        metadata.insert(
            "token_usage".to_string(),
            serde_json::to_value(self.token_usage()).unwrap_or_default(),
        );
        metadata.insert("total_cost".to_string(), serde_json::json!(self.cost()));
        metadata
    }

    /// Checks the adapter can make calls.
    fn validate_config(&self) -> Result<(), AdapterError>;
}

/// Price of one million tokens in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_write: f64,
    pub cache_read: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            cache_write: 0.0,
            cache_read: 0.0,
        }
    }

    pub const fn with_cache(mut self, write: f64, read: f64) -> Self {
        self.cache_write = write;
        self.cache_read = read;
        self
    }

    /// Cost of a call in USD.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        const PER_MILLION: f64 = 1_000_000.0;
        usage.input_tokens as f64 / PER_MILLION * self.input
            + usage.output_tokens as f64 / PER_MILLION * self.output
            + usage.cache_write_tokens.unwrap_or(0) as f64 / PER_MILLION * self.cache_write
            + usage.cache_read_tokens.unwrap_or(0) as f64 / PER_MILLION * self.cache_read
    }
}

/// Builds the shared HTTP client used by the provider adapters.
pub(crate) fn http_client() -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| AdapterError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Maps a non-success HTTP response to an adapter error.
pub(crate) async fn error_from_response(response: reqwest::Response) -> AdapterError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    let code = response.status().as_u16();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error.message)
        .unwrap_or(text);

    if code == 429 {
        AdapterError::RateLimited(message)
    } else {
        AdapterError::ApiError { code, message }
    }
}
