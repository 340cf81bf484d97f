//! OpenAI Chat Completions adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::sse::{SseDecoder, DONE_MARKER};
use super::{
    error_from_response, http_client, Adapter, AdapterConfig, ModelPricing, ResponseStream,
    UsageTracker,
};
use crate::error::AdapterError;
use crate::schemas::{AgentMessage, AgentResponse, TokenUsage, ToolCall, ToolSpec};

const PROVIDER: &str = "openai";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Model used when none is configured.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

const PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4", ModelPricing::new(30.0, 60.0)),
    ("gpt-4-turbo", ModelPricing::new(10.0, 30.0)),
    ("gpt-4o", ModelPricing::new(2.50, 10.0)),
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.60)),
    ("gpt-3.5-turbo", ModelPricing::new(0.50, 1.50)),
];

/// USD per million tokens, matched on the longest model prefix.
///
/// Unlisted models are priced as `gpt-4o`.
fn pricing_for(model: &str) -> ModelPricing {
    let longest_prefix = |name: &str| {
        PRICING
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| *pricing)
    };
    longest_prefix(model)
        .or_else(|| longest_prefix(DEFAULT_OPENAI_MODEL))
        .unwrap_or(ModelPricing::new(0.0, 0.0))
}

/// Adapter for GPT models.
pub struct OpenAiAdapter {
    config: AdapterConfig,
    model: String,
    http_client: Client,
    usage: UsageTracker,
}

impl OpenAiAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
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
        ApiRequest {
            model: self.model.clone(),
            messages: messages.iter().map(convert_message).collect(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools: tools
                .filter(|t| !t.is_empty())
                .map(|t| t.iter().map(convert_tool).collect()),
            stream: false,
            stream_options: None,
        }
    }

    /// A request that streams deltas and reports usage in a final chunk.
    fn build_stream_request(
        &self,
        messages: &[AgentMessage],
        tools: Option<&[ToolSpec]>,
    ) -> ApiRequest {
        ApiRequest {
            stream: true,
            stream_options: Some(json!({"include_usage": true})),
            ..self.build_request(messages, tools)
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, AdapterError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::MissingApiKey(PROVIDER.to_string()))?;
        let url = format!("{}/chat/completions", self.api_base());

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
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
        let cost = pricing_for(&self.model).cost(usage);
        self.usage.record(usage, cost);
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd = cost,
            "Recorded OpenAI usage"
        );
        cost
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl From<&ApiUsage> for TokenUsage {
    fn from(usage: &ApiUsage) -> Self {
        TokenUsage::with_total(
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
        )
    }
}

/// One `chat.completion.chunk` of a streamed call.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCall>,
}

/// A fragment of a tool call; `id` and `name` arrive once, arguments in pieces.
#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct StreamedToolCall {
    index: usize,
    id: String,
    name: String,
    arguments: String,
}

/// What a stream step produced.
#[derive(Debug, PartialEq, Eq)]
enum StreamStep {
    Text,
    Quiet,
    Done,
}

/// Folds streamed chunks into the response they describe.
#[derive(Debug, Default)]
struct StreamAccumulator {
    response_id: Option<String>,
    model: Option<String>,
    content: String,
    tool_calls: Vec<StreamedToolCall>,
    usage: Option<TokenUsage>,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    fn apply(&mut self, data: &str) -> Result<StreamStep, AdapterError> {
        if data.trim() == DONE_MARKER {
            return Ok(StreamStep::Done);
        }
        let chunk: StreamChunk =
            serde_json::from_str(data).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        if self.response_id.is_none() {
            self.response_id = chunk.id;
        }
        if chunk.model.is_some() {
            self.model = chunk.model;
        }
        if let Some(usage) = chunk.usage.as_ref() {
            self.usage = Some(usage.into());
        }

        let mut step = StreamStep::Quiet;
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                self.content.push_str(&text);
                step = StreamStep::Text;
            }
            for fragment in choice.delta.tool_calls {
                self.merge_tool_call(fragment);
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        Ok(step)
    }

    fn merge_tool_call(&mut self, fragment: StreamToolCall) {
        let existing = self.tool_calls.iter().position(|c| c.index == fragment.index);
        let position = match existing {
            Some(position) => position,
            None => {
                self.tool_calls.push(StreamedToolCall {
                    index: fragment.index,
                    ..Default::default()
                });
                self.tool_calls.len() - 1
            }
        };
        let call = &mut self.tool_calls[position];
        if let Some(id) = fragment.id {
            call.id = id;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
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
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = parse_arguments(&call.name, &call.arguments);
                ToolCall::new(call.id, call.name).with_arguments(arguments)
            })
            .collect();
        response.finish_reason = self.finish_reason;
        response.token_usage = self.usage;
        response
            .metadata
            .insert("response_id".to_string(), json!(self.response_id));
        response
    }
}

/// Decodes a JSON argument object, treating blank or malformed input as empty.
fn parse_arguments(tool: &str, arguments: &str) -> HashMap<String, Value> {
    if arguments.trim().is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(arguments).unwrap_or_else(|e| {
        warn!(tool = %tool, error = %e, "Unparseable tool arguments");
        HashMap::new()
    })
}

fn convert_message(message: &AgentMessage) -> ApiMessage {
    ApiMessage {
        role: message.role.as_str().to_string(),
        content: message.content.clone(),
        name: message.name.clone(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn convert_tool(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn convert_response(response: ApiResponse, messages: &[AgentMessage]) -> AgentResponse {
    let mut agent_response = AgentResponse::new("").with_model(response.model);
    agent_response.messages = messages.to_vec();
    agent_response.token_usage = response.usage.as_ref().map(Into::into);
    agent_response
        .metadata
        .insert("response_id".to_string(), json!(response.id));
    agent_response
        .metadata
        .insert("created".to_string(), json!(response.created));

    let Some(choice) = response.choices.into_iter().next() else {
        agent_response.finish_reason = Some("error".to_string());
        return agent_response;
    };

    agent_response.content = choice.message.content.unwrap_or_default();
    agent_response.finish_reason = choice.finish_reason;
    agent_response.tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = parse_arguments(&call.function.name, &call.function.arguments);
            ToolCall::new(call.id, call.function.name).with_arguments(arguments)
        })
        .collect();

    agent_response
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    fn name(&self) -> String {
        format!("{}/{}", PROVIDER, self.model)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        self.model.contains("gpt-4") || self.model.contains("gpt-3.5")
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
            "Sending OpenAI request"
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

    /// Yields the accumulated text after every content delta, then the final
    /// response with tool calls, usage and cost.
    fn stream_execute<'a>(
        &'a self,
        messages: &'a [AgentMessage],
        tools: Option<&'a [ToolSpec]>,
    ) -> ResponseStream<'a> {
        Box::pin(async_stream::try_stream! {
            let request = self.build_stream_request(messages, tools);
            debug!(
                model = %self.model,
                messages = request.messages.len(),
                "Streaming OpenAI request"
            );

            let http_response = self.send(&request).await?;
            let mut body = Box::pin(http_response.bytes_stream());
            let mut decoder = SseDecoder::new();
            let mut accumulator = StreamAccumulator::default();
            let mut done = false;

            while !done {
                let Some(chunk) = body.next().await else {
                    break;
                };
                let chunk = chunk.map_err(|e| AdapterError::Stream(e.to_string()))?;
                for data in decoder.push(&chunk) {
                    match accumulator.apply(&data)? {
                        StreamStep::Text => {
                            yield accumulator.partial(messages, &self.model);
                        }
                        StreamStep::Done => done = true,
                        StreamStep::Quiet => {}
                    }
                }
            }
            if !done {
                for data in decoder.finish() {
                    accumulator.apply(&data)?;
                }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_longest_prefix() {
        let usage = TokenUsage::new(1_000_000, 0);
        let mini = pricing_for("gpt-4o-mini-2024-07-18");
        assert!((mini.cost(&usage) - 0.15).abs() < 1e-9);
        assert!((pricing_for("gpt-4o").cost(&usage) - 2.50).abs() < 1e-9);
        let turbo = pricing_for("gpt-4-turbo-preview");
        assert!((turbo.cost(&usage) - 10.0).abs() < 1e-9);
        assert!((pricing_for("gpt-4-0613").cost(&usage) - 30.0).abs() < 1e-9);
        assert!((pricing_for("o1-preview").cost(&usage) - 2.50).abs() < 1e-9);
    }

    #[test]
    fn test_build_request() {
        let adapter = OpenAiAdapter::new(
            AdapterConfig::new()
                .with_api_key("sk-test")
                .with_model("gpt-4o-mini")
                .with_temperature(0.2),
        )
        .unwrap();
        let messages = vec![
            AgentMessage::system("Be terse."),
            AgentMessage::user("hi"),
            AgentMessage::tool("call_1", "result"),
        ];
        let tools = vec![ToolSpec::bare("lookup")];
        let body = serde_json::to_value(adapter.build_request(&messages, Some(&tools))).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
        assert!(body["messages"][1].get("name").is_none());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(body["temperature"], 0.2);
    }

    #[test]
    fn test_convert_response_with_tool_calls() {
        let raw = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "created": 1700000000,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"city\":\"Paris\"}"}
                    }, {
                        "id": "call_2",
                        "type": "function",
                        "function": {"name": "broken", "arguments": "{not json"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 26}
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let response = convert_response(parsed, &[]);

        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].arguments["city"], "Paris");
        assert!(response.tool_calls[1].arguments.is_empty());
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
        // provider total is kept as reported
        assert_eq!(response.token_usage.unwrap().total_tokens, 26);
    }

    #[test]
    fn test_convert_response_without_choices() {
        let parsed: ApiResponse =
            serde_json::from_value(json!({"id": "x", "model": "gpt-4o", "choices": []})).unwrap();
        let response = convert_response(parsed, &[]);
        assert_eq!(response.finish_reason.as_deref(), Some("error"));
        assert!(response.token_usage.is_none());
    }

    #[test]
    fn test_stream_request_asks_for_usage() {
        let adapter = OpenAiAdapter::new(AdapterConfig::new().with_api_key("sk-test")).unwrap();
        let messages = [AgentMessage::user("hi")];

        let plain = serde_json::to_value(adapter.build_request(&messages, None)).unwrap();
        assert!(plain.get("stream").is_none());
        assert!(plain.get("stream_options").is_none());

        let streamed = serde_json::to_value(adapter.build_stream_request(&messages, None)).unwrap();
        assert_eq!(streamed["stream"], true);
        assert_eq!(streamed["stream_options"]["include_usage"], true);
        assert!(adapter.supports_streaming());
    }

    #[test]
    fn test_stream_chunks_accumulate() {
        let chunks = [
            json!({"id": "chatcmpl-1", "model": "gpt-4o-mini", "choices": [
                {"index": 0, "delta": {"role": "assistant", "content": ""}, "finish_reason": null}
            ]}),
            json!({"id": "chatcmpl-1", "choices": [
                {"index": 0, "delta": {"content": "Par"}, "finish_reason": null}
            ]}),
            json!({"id": "chatcmpl-1", "choices": [
                {"index": 0, "delta": {"content": "is"}, "finish_reason": null}
            ]}),
            json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function",
                    "function": {"name": "lookup", "arguments": "{\"ci"}}
            ]}}]}),
            json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "ty\": \"Paris\"}"}}
            ]}}]}),
            json!({"id": "chatcmpl-1", "choices": [
                {"index": 0, "delta": {}, "finish_reason": "tool_calls"}
            ]}),
            json!({"id": "chatcmpl-1", "choices": [],
                "usage": {"prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13}}),
        ];

        let mut accumulator = StreamAccumulator::default();
        let mut partials = Vec::new();
        for chunk in &chunks {
            if accumulator.apply(&chunk.to_string()).unwrap() == StreamStep::Text {
                partials.push(accumulator.partial(&[], DEFAULT_OPENAI_MODEL).content);
            }
        }
        assert_eq!(accumulator.apply(" [DONE]").unwrap(), StreamStep::Done);
        assert_eq!(partials, vec!["Par", "Paris"]);

        let response = accumulator.finish(&[], DEFAULT_OPENAI_MODEL);
        assert_eq!(response.content, "Paris");
        assert_eq!(response.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].tool, "lookup");
        assert_eq!(response.tool_calls[0].arguments["city"], "Paris");
        assert_eq!(response.token_usage, Some(TokenUsage::with_total(9, 4, 13)));
        assert_eq!(response.metadata["response_id"], "chatcmpl-1");
    }

    #[test]
    fn test_stream_chunk_parse_error() {
        let mut accumulator = StreamAccumulator::default();
        assert!(matches!(
            accumulator.apply("{\"choices\": ["),
            Err(AdapterError::ParseError(_))
        ));
    }

    #[test]
    fn test_supports_tools_by_model() {
        let gpt4 = OpenAiAdapter::new(AdapterConfig::new().with_model("gpt-4o")).unwrap();
        assert!(gpt4.supports_tools());
        let other = OpenAiAdapter::new(AdapterConfig::new().with_model("o1-mini")).unwrap();
        assert!(!other.supports_tools());
        assert!(matches!(
            other.validate_config(),
            Err(AdapterError::MissingApiKey(_))
        ));
    }
}
