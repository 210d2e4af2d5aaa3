//! OpenAI-compatible HTTP provider.
//!
//! One implementation serves all three [`ClientStrategy`] values; the
//! strategy only changes addressing and authentication, which live in
//! [`Connection`]. Nothing is retried; every failure reaches the caller.
//!
//! [`ClientStrategy`]: crate::llm::strategy::ClientStrategy

use crate::llm::strategy::{ApiRoute, Connection};
use crate::llm::streaming::{parse_usage, sse_event_stream};
use crate::llm::traits::{
    ChatConfig, ChatResponse, EventStream, LlmError, LlmProvider, Message, MessageRole, Messages,
    ResponsesOutput, Tool, ToolCall,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Chat and Responses API client for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    connection: Connection,
    client: reqwest::Client,
    name: String,
}

impl OpenAiCompatibleProvider {
    /// Builds the provider with a per-request timeout
    pub fn new(connection: Connection, request_timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::Network {
                message: "failed to build HTTP client".to_string(),
                source: e,
            })?;
        Ok(Self::with_client(connection, client))
    }

    /// Builds the provider around an existing client
    pub fn with_client(connection: Connection, client: reqwest::Client) -> Self {
        let name = connection.strategy().to_string();
        Self {
            connection,
            client,
            name,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn chat_body(
        &self,
        model_id: &str,
        messages: &Messages,
        tools: &[Tool],
        config: &ChatConfig,
        stream: bool,
    ) -> Value {
        let mut body = json!({ "messages": convert_messages(messages) });

        if self.connection.model_in_body(&ApiRoute::ChatCompletions) {
            body["model"] = json!(model_id);
        }
        if let Some(max_tokens) = config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(convert_tools(tools));
            body["tool_choice"] = json!("auto");
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
        }
        for (key, value) in &config.additional_params {
            body[key] = value.clone();
        }

        body
    }

    async fn post_chat(&self, model_id: &str, body: Value) -> Result<ChatResponse, LlmError> {
        let start_time = Instant::now();
        let request = self
            .connection
            .request(
                &self.client,
                reqwest::Method::POST,
                &ApiRoute::ChatCompletions,
                model_id,
            )
            .json(&body);

        let response_json = self.connection.send_json(request).await?;
        let chat_response = parse_chat_completion(&response_json)?;

        tracing::info!(
            "✅ {} chat completed in {:?}, content length: {} chars, tool calls: {}",
            self.name,
            start_time.elapsed(),
            chat_response.content.len(),
            chat_response.tool_calls.len()
        );
        Ok(chat_response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn chat(
        &self,
        model_id: &str,
        messages: &Messages,
        config: &ChatConfig,
    ) -> Result<ChatResponse, LlmError> {
        tracing::info!("🔵 {} chat request for model: {}", self.name, model_id);
        tracing::debug!(
            "🔵 request config: temp={:?}, max_tokens={:?}",
            config.temperature,
            config.max_tokens
        );
        let body = self.chat_body(model_id, messages, &[], config, false);
        self.post_chat(model_id, body).await
    }

    async fn chat_with_tools(
        &self,
        model_id: &str,
        messages: &Messages,
        tools: &[Tool],
        config: &ChatConfig,
    ) -> Result<ChatResponse, LlmError> {
        tracing::info!(
            "🔧 {} chat with {} tools for model: {}",
            self.name,
            tools.len(),
            model_id
        );
        let body = self.chat_body(model_id, messages, tools, config, false);
        self.post_chat(model_id, body).await
    }

    async fn chat_streaming(
        &self,
        model_id: &str,
        messages: &Messages,
        config: &ChatConfig,
    ) -> Result<EventStream, LlmError> {
        tracing::info!("🌊 {} streaming request for model: {}", self.name, model_id);
        let body = self.chat_body(model_id, messages, &[], config, true);
        let request = self
            .connection
            .request(
                &self.client,
                reqwest::Method::POST,
                &ApiRoute::ChatCompletions,
                model_id,
            )
            .header("Accept", "text/event-stream")
            .json(&body);

        let response = self.connection.send(request).await?;
        tracing::debug!("🌊 streaming response received, decoding SSE");
        Ok(sse_event_stream(response.bytes_stream()))
    }

    async fn create_response(
        &self,
        model_id: &str,
        input: &str,
    ) -> Result<ResponsesOutput, LlmError> {
        tracing::info!("🔵 {} responses request for model: {}", self.name, model_id);
        let body = json!({ "model": model_id, "input": input });
        let request = self
            .connection
            .request(&self.client, reqwest::Method::POST, &ApiRoute::Responses, model_id)
            .json(&body);

        let response_json = self.connection.send_json(request).await?;
        parse_responses_output(&response_json)
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

/// Converts messages to the chat-completions wire format
pub(crate) fn convert_messages(messages: &Messages) -> Vec<Value> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(message: &Message) -> Value {
    match message.role {
        MessageRole::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        MessageRole::Assistant if message.has_tool_calls() => {
            let tool_calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    // Arguments travel as a JSON-encoded string
                    let arguments = match &call.input {
                        Value::Object(_) => call.input.to_string(),
                        Value::String(raw) => raw.clone(),
                        _ => "{}".to_string(),
                    };
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": arguments }
                    })
                })
                .collect();
            json!({
                "role": "assistant",
                "content": if message.content.is_empty() { Value::Null } else { json!(message.content) },
                "tool_calls": tool_calls,
            })
        }
        role => json!({ "role": role.as_str(), "content": message.content }),
    }
}

pub(crate) fn convert_tools(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema
                }
            })
        })
        .collect()
}

/// Parses a non-streaming `chat/completions` body
pub fn parse_chat_completion(response: &Value) -> Result<ChatResponse, LlmError> {
    let first_choice = response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| LlmError::InvalidResponse {
            message: "missing or empty choices array".to_string(),
        })?;

    let message = first_choice
        .get("message")
        .ok_or_else(|| LlmError::InvalidResponse {
            message: "choice has no message".to_string(),
        })?;

    // Null when the reply only carries tool calls
    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|tc| tc.as_array()) {
        for call in calls {
            let (Some(id), Some(function)) = (
                call.get("id").and_then(|i| i.as_str()),
                call.get("function"),
            ) else {
                continue;
            };
            let Some(name) = function.get("name").and_then(|n| n.as_str()) else {
                continue;
            };

            let input = match function.get("arguments") {
                Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|e| {
                    tracing::warn!(
                        "Failed to parse tool arguments as JSON: {} | Raw: {}",
                        e,
                        raw
                    );
                    Value::String(raw.clone())
                }),
                Some(other) => other.clone(),
                None => Value::Object(serde_json::Map::new()),
            };

            tool_calls.push(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                input,
            });
        }
    }

    Ok(ChatResponse {
        content,
        tool_calls,
        usage: response.get("usage").and_then(parse_usage),
        finish_reason: first_choice
            .get("finish_reason")
            .and_then(|r| r.as_str())
            .map(str::to_string),
    })
}

/// Parses a Responses API body.
///
/// Prefers the aggregated `output_text` field and falls back to joining the
/// `output_text` parts of every `output[].content[]` entry.
pub fn parse_responses_output(response: &Value) -> Result<ResponsesOutput, LlmError> {
    let aggregated = response
        .get("output_text")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let output_text = match aggregated {
        Some(text) => text,
        None => {
            let items = response
                .get("output")
                .and_then(|o| o.as_array())
                .ok_or_else(|| LlmError::InvalidResponse {
                    message: "response has neither output_text nor output".to_string(),
                })?;
            items
                .iter()
                .filter_map(|item| item.get("content").and_then(|c| c.as_array()))
                .flatten()
                .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("output_text"))
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        }
    };

    Ok(ResponsesOutput {
        id: response.get("id").and_then(|i| i.as_str()).map(str::to_string),
        output_text,
        usage: response.get("usage").and_then(parse_usage),
    })
}
