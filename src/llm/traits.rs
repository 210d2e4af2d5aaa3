//! Core traits and wire-independent types for the chat collaborators.
//!
//! Every check talks to the remote service through [`LlmProvider`], so the
//! harness can run against the real endpoint or a scripted stand-in.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

/// Boxed, lazily evaluated stream of [`StreamEvent`]s.
///
/// The stream is finite and cannot be restarted; the consumer drains it.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Chat-completion capability consumed by the checks.
///
/// Implementations own request formatting, authentication, response parsing
/// and error normalization. Models are passed as deployment/model id strings.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Single request/response generation over a message sequence
    async fn chat(
        &self,
        model_id: &str,
        messages: &Messages,
        config: &ChatConfig,
    ) -> Result<ChatResponse, LlmError>;

    /// Generation with tool definitions offered to the model
    async fn chat_with_tools(
        &self,
        model_id: &str,
        messages: &Messages,
        tools: &[Tool],
        config: &ChatConfig,
    ) -> Result<ChatResponse, LlmError>;

    /// Incremental token delivery
    async fn chat_streaming(
        &self,
        model_id: &str,
        messages: &Messages,
        config: &ChatConfig,
    ) -> Result<EventStream, LlmError>;

    /// Single-shot call against the Responses API
    async fn create_response(&self, model_id: &str, input: &str)
        -> Result<ResponsesOutput, LlmError>;

    /// Short label used in logs
    fn provider_name(&self) -> &str;
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Result of a locally executed tool
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Tool calls requested by the assistant in this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `Tool` messages: the call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    /// Assistant turn that requested one or more tool invocations
    pub fn assistant_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(MessageRole::Assistant, text)
        }
    }

    /// Tool output answering `tool_call_id`
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(MessageRole::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Ordered conversation history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Messages {
    pub messages: Vec<Message>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn add_system_message(&mut self, text: &str) {
        self.push(Message::system(text));
    }

    pub fn add_user_message(&mut self, text: &str) {
        self.push(Message::user(text));
    }

    pub fn add_assistant_message(&mut self, text: &str) {
        self.push(Message::assistant(text));
    }
}

impl From<Vec<Message>> for Messages {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Per-request generation parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Omitted from the request when `None`; several hosted reasoning models
    /// reject any non-default temperature.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Extra top-level body fields, copied verbatim
    #[serde(default)]
    pub additional_params: HashMap<String, serde_json::Value>,
}

impl ChatConfig {
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..Self::default()
        }
    }
}

/// Response from a chat completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments; a string when the model emitted invalid JSON
    pub input: serde_json::Value,
}

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Events delivered by [`LlmProvider::chat_streaming`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Next fragment of generated text
    TextDelta(String),
    /// Fully assembled tool call
    ToolCall(ToolCall),
    Usage(Usage),
    /// Stream finished normally
    Done { finish_reason: Option<String> },
    /// Stream aborted; no further events follow
    Error(String),
}

/// Token accounting reported by the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Output of a Responses API call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesOutput {
    pub id: Option<String>,
    pub output_text: String,
    pub usage: Option<Usage>,
}

/// Errors raised by the HTTP collaborators
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Non-2xx answer from the service
    #[error("{provider} returned HTTP {status}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// The request never produced an HTTP response
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// A 2xx response whose body lacks the expected fields
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Stream error: {message}")]
    Stream { message: String },
}

impl LlmError {
    /// HTTP status for `Http` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body for `Http` errors
    pub fn body(&self) -> Option<&str> {
        match self {
            LlmError::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// 404 usually means a misspelled model or deployment name
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
