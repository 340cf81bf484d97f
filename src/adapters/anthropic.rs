//! Anthropic Messages API adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::sse::SseDecoder;
use super::{
    error_from_response, http_client, Adapter, AdapterConfig, ModelPricing, ResponseStream,
    UsageTracker,
};
use crate::error::AdapterError;
use crate::schemas::{AgentMessage, AgentResponse, MessageRole, TokenUsage, ToolCall, ToolSpec};

const PROVIDER: &str = "anthropic";
const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Model used when none is configured.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

/// USD per million tokens. Unlisted models are priced at zero.
fn pricing_for(model: &str) -> Option<ModelPricing> {
    match model {
        "claude-3-5-sonnet-20241022" => Some(ModelPricing::new(3.0, 15.0).with_cache(3.75, 0.30)),
        "claude-3-opus-20240229" => Some(ModelPricing::new(15.0, 75.0)),
        "claude-3-sonnet-20240229" => Some(ModelPricing::new(3.0, 15.0)),
        "claude-3-haiku-20240307" => Some(ModelPricing::new(0.25, 1.25)),
        _ => None,
    }
}

/// Adapter for Claude models.
pub struct AnthropicAdapter {
    config: AdapterConfig,
    model: String,
    http_client: Client,
    usage: UsageTracker,
}

impl AnthropicAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string());
        Ok(Self {
            config,
            model,
            http_client: http_client()?,
            usage: UsageTracker::new(),
        })
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    fn build_request(
        &self,
        messages: &[AgentMessage],
        tools: Option<&[ToolSpec]>,
    ) -> ApiRequest {
        let system = messages
            .first()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone());

        ApiRequest {
            model: self.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system,
            messages: convert_messages(messages),
            tools: tools
                .filter(|t| !t.is_empty())
                .map(|t| t.iter().map(convert_tool).collect()),
            stream: false,
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, AdapterError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::MissingApiKey(PROVIDER.to_string()))?;
        let url = format!("{}/v1/messages", self.api_base());

        let http_response = self
            .http_client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AdapterError::RequestFailed(e.to_string()))?;

        if !http_response.status().is_success() {
            return Err(error_from_response(http_response).await);
        }
        Ok(http_response)
    }

    /// Adds a call to the usage counters and returns its cost.
    fn record_usage(&self, usage: &TokenUsage) -> f64 {
        let cost = pricing_for(&self.model)
            .map(|p| p.cost(usage))
            .unwrap_or(0.0);
        self.usage.record(usage, cost);
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd = cost,
            "Recorded Anthropic usage"
        );
        cost
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    stop_sequence: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: HashMap<String, Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

/// One server-sent event of a streamed Messages call.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StreamMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    id: String,
    model: String,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    stop_sequence: Option<String>,
}

/// Output tokens so far; cumulative, not incremental.
#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Debug)]
struct StreamedToolUse {
    index: usize,
    id: String,
    name: String,
    input_json: String,
}

/// Folds stream events into the response they describe.
#[derive(Debug, Default)]
struct StreamAccumulator {
    message_id: Option<String>,
    model: Option<String>,
    content: String,
    tool_uses: Vec<StreamedToolUse>,
    usage: Option<ApiUsage>,
    stop_reason: Option<String>,
    stop_sequence: Option<String>,
}

impl StreamAccumulator {
    /// Applies one event payload and reports whether it added text.
    fn apply(&mut self, data: &str) -> Result<bool, AdapterError> {
        let event: StreamEvent =
            serde_json::from_str(data).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        match event {
            StreamEvent::MessageStart { message } => {
                self.message_id = Some(message.id);
                self.model = Some(message.model);
                self.usage = message.usage;
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name, .. },
            } => self.tool_uses.push(StreamedToolUse {
                index,
                id,
                name,
                input_json: String::new(),
            }),
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text },
                ..
            } => {
                self.content.push_str(&text);
                return Ok(!text.is_empty());
            }
            StreamEvent::ContentBlockDelta {
                index,
                delta: BlockDelta::InputJsonDelta { partial_json },
            } => {
                if let Some(tool) = self.tool_uses.iter_mut().find(|t| t.index == index) {
                    tool.input_json.push_str(&partial_json);
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                self.stop_reason = delta.stop_reason.or(self.stop_reason.take());
                self.stop_sequence = delta.stop_sequence.or(self.stop_sequence.take());
                if let Some(delta_usage) = usage {
                    match self.usage.as_mut() {
                        Some(total) => total.output_tokens = delta_usage.output_tokens,
                        None => {
                            self.usage = Some(ApiUsage {
                                input_tokens: 0,
                                output_tokens: delta_usage.output_tokens,
                                cache_creation_input_tokens: None,
                                cache_read_input_tokens: None,
                            })
                        }
                    }
                }
            }
            StreamEvent::Error { error } => return Err(AdapterError::Stream(error.message)),
            StreamEvent::ContentBlockStart { .. }
            | StreamEvent::ContentBlockDelta { .. }
            | StreamEvent::Other => {}
        }
        Ok(false)
    }

    /// The text received so far.
    fn partial(&self, messages: &[AgentMessage], default_model: &str) -> AgentResponse {
        let model = self.model.as_deref().unwrap_or(default_model);
        let mut response = AgentResponse::new(self.content.clone()).with_model(model);
        response.messages = messages.to_vec();
        response
            .metadata
            .insert("streaming".to_string(), json!(true));
        response
    }

    fn finish(self, messages: &[AgentMessage], default_model: &str) -> AgentResponse {
        let mut response = self.partial(messages, default_model);
        response.tool_calls = self
            .tool_uses
            .into_iter()
            .map(|tool| {
                let input: HashMap<String, Value> = if tool.input_json.trim().is_empty() {
                    HashMap::new()
                } else {
                    serde_json::from_str(&tool.input_json).unwrap_or_else(|e| {
                        warn!(tool = %tool.name, error = %e, "Unparseable streamed tool input");
                        HashMap::new()
                    })
                };
                ToolCall::new(tool.id, tool.name).with_arguments(input)
            })
            .collect();
        response.finish_reason = self.stop_reason;
        response.token_usage = self.usage.as_ref().map(Into::into);
        response
            .metadata
            .insert("message_id".to_string(), json!(self.message_id));
        response
            .metadata
            .insert("stop_sequence".to_string(), json!(self.stop_sequence));
        response
    }
}

impl From<&ApiUsage> for TokenUsage {
    fn from(usage: &ApiUsage) -> Self {
        let cache_read = usage.cache_read_input_tokens;
        let cache_write = usage.cache_creation_input_tokens;
        TokenUsage::new(usage.input_tokens, usage.output_tokens)
            .with_cache(cache_read, cache_write)
    }
}

/// System messages travel in the `system` field; tool replies become
/// `tool_result` blocks on a user turn.
fn convert_messages(messages: &[AgentMessage]) -> Vec<ApiMessage> {
    messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| match m.role {
            MessageRole::Tool => ApiMessage {
                role: "user",
                content: json!([{
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content,
                }]),
            },
            MessageRole::Assistant => ApiMessage {
                role: "assistant",
                content: Value::String(m.content.clone()),
            },
            _ => ApiMessage {
                role: "user",
                content: Value::String(m.content.clone()),
            },
        })
        .collect()
}

fn convert_tool(tool: &ToolSpec) -> ApiTool {
    ApiTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

fn convert_response(response: ApiResponse, messages: &[AgentMessage]) -> AgentResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name).with_arguments(input));
            }
            ContentBlock::Other => {}
        }
    }

    let mut agent_response = AgentResponse::new(content)
        .with_tool_calls(tool_calls)
        .with_model(response.model);
    agent_response.messages = messages.to_vec();
    agent_response.finish_reason = response.stop_reason;
    agent_response
        .metadata
        .insert("message_id".to_string(), json!(response.id));
    agent_response
        .metadata
        .insert("stop_sequence".to_string(), json!(response.stop_sequence));
    if let Some(usage) = response.usage.as_ref() {
        agent_response.token_usage = Some(usage.into());
    }
    agent_response
}

#[async_trait]
impl Adapter for AnthropicAdapter {
    fn name(&self) -> String {
        format!("{}/{}", PROVIDER, self.model)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        messages: &[AgentMessage],
        tools: Option<&[ToolSpec]>,
        max_turns: u32,
    ) -> Result<AgentResponse, AdapterError> {
        let request = self.build_request(messages, tools);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            max_turns,
            "Sending Anthropic request"
        );

        let http_response = self.send(&request).await?;
        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut response = convert_response(api_response, messages);

        if let Some(usage) = response.token_usage.as_ref() {
            response.cost = Some(self.record_usage(usage));
        }

        Ok(response)
    }

    /// Yields the accumulated text after every text delta, then the final
    /// response with tool calls, usage and cost.
    fn stream_execute<'a>(
        &'a self,
        messages: &'a [AgentMessage],
        tools: Option<&'a [ToolSpec]>,
    ) -> ResponseStream<'a> {
        Box::pin(async_stream::try_stream! {
            let mut request = self.build_request(messages, tools);
            request.stream = true;
            debug!(
                model = %self.model,
                messages = request.messages.len(),
                "Streaming Anthropic request"
            );

            let http_response = self.send(&request).await?;
            let mut body = Box::pin(http_response.bytes_stream());
            let mut decoder = SseDecoder::new();
            let mut accumulator = StreamAccumulator::default();

            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| AdapterError::Stream(e.to_string()))?;
                for data in decoder.push(&chunk) {
                    if accumulator.apply(&data)? {
                        yield accumulator.partial(messages, &self.model);
                    }
                }
            }
            for data in decoder.finish() {
                accumulator.apply(&data)?;
            }

            let mut response = accumulator.finish(messages, &self.model);
            if let Some(usage) = response.token_usage.as_ref() {
                response.cost = Some(self.record_usage(usage));
            }
            yield response;
        })
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
        let mut config = self.config.clone();
        config.model = Some(self.model.clone());
        config.require_credentials(PROVIDER)
    }
}
