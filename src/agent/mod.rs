//! Bounded model/tool round-trip loop.
//!
//! [`ToolLoop::run`] sends the conversation plus tool definitions, executes
//! every tool call the model asks for, feeds the results back and repeats
//! until the model answers without tool calls or `max_steps` model round
//! trips have happened.

use crate::llm::traits::{ChatConfig, LlmError, LlmProvider, Message, Messages, ToolCall};
use crate::tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// One tool call made during a loop, in call order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub success: bool,
    /// Why the call failed, when it did
    pub error: Option<String>,
}

/// What a loop produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolLoopOutcome {
    /// Text of the last model reply
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
    /// Model round trips performed
    pub steps: u32,
    /// The loop stopped because `max_steps` was reached while the model was
    /// still requesting tools
    pub step_limit_reached: bool,
}

impl ToolLoopOutcome {
    /// The model asked for `tool_name`, whether or not the call worked
    pub fn invoked(&self, tool_name: &str) -> bool {
        self.invocations.iter().any(|i| i.name == tool_name)
    }

    /// `tool_name` actually ran and returned a successful result
    pub fn succeeded(&self, tool_name: &str) -> bool {
        self.invocations
            .iter()
            .any(|i| i.name == tool_name && i.success)
    }
}

/// Drives tool calling against one model
#[derive(Debug, Clone)]
pub struct ToolLoop {
    provider: Arc<dyn LlmProvider>,
    registry: ToolRegistry,
    model: String,
    config: ChatConfig,
    max_steps: u32,
    system_prompt: Option<String>,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn LlmProvider>, registry: ToolRegistry, model: impl Into<String>) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            config: ChatConfig::default(),
            max_steps: 5,
            system_prompt: None,
        }
    }

    /// Upper bound on model round trips, at least 1
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Runs the loop for a single user prompt.
    ///
    /// Provider errors abort the loop. Tool failures, including arguments
    /// rejected by the schema, are returned to the model as failed tool
    /// results and recorded in [`ToolLoopOutcome::invocations`].
    pub async fn run(&self, prompt: &str) -> Result<ToolLoopOutcome, LlmError> {
        let start_time = Instant::now();
        let tools = self.registry.to_llm_tools().await;

        let mut messages = Messages::new();
        if let Some(system) = &self.system_prompt {
            messages.add_system_message(system);
        }
        messages.add_user_message(prompt);

        let mut outcome = ToolLoopOutcome::default();

        while outcome.steps < self.max_steps {
            let response = self
                .provider
                .chat_with_tools(&self.model, &messages, &tools, &self.config)
                .await?;
            outcome.steps += 1;
            outcome.text = response.content.clone();

            if response.tool_calls.is_empty() {
                tracing::info!(
                    "🔧 tool loop finished after {} step(s) in {:?}",
                    outcome.steps,
                    start_time.elapsed()
                );
                return Ok(outcome);
            }

            tracing::debug!(
                "🔧 step {}: model requested {} tool call(s)",
                outcome.steps,
                response.tool_calls.len()
            );
            messages.push(Message::assistant_tool_calls(
                response.content,
                response.tool_calls.clone(),
            ));

            for call in response.tool_calls {
                let (content, invocation) = self.execute_call(call.clone()).await;
                outcome.invocations.push(invocation);
                messages.push(Message::tool_result(call.id, content));
            }
        }

        tracing::warn!(
            "🔧 tool loop hit the {} step limit with tool calls still pending",
            self.max_steps
        );
        outcome.step_limit_reached = true;
        Ok(outcome)
    }

    async fn execute_call(&self, call: ToolCall) -> (String, ToolInvocation) {
        match self.registry.execute_tool(&call.name, call.input.clone()).await {
            Ok(result) => {
                let content = result.to_message_content();
                let invocation = ToolInvocation {
                    name: call.name,
                    arguments: call.input,
                    success: result.success,
                    error: result.error,
                };
                (content, invocation)
            }
            Err(e) => {
                tracing::debug!("🔧 tool {} failed: {}", call.name, e);
                let content = serde_json::json!({ "error": e.to_string() }).to_string();
                let invocation = ToolInvocation {
                    name: call.name,
                    arguments: call.input,
                    success: false,
                    error: Some(e.to_string()),
                };
                (content, invocation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::traits::{ChatResponse, EventStream, MessageRole, ResponsesOutput, Tool};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records the conversations it saw
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<ChatResponse>>,
        seen: Mutex<Vec<Messages>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<ChatResponse>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _: &str, _: &Messages, _: &ChatConfig) -> Result<ChatResponse, LlmError> {
            unreachable!("tool loop only uses chat_with_tools")
        }

        async fn chat_with_tools(
            &self,
            _model_id: &str,
            messages: &Messages,
            tools: &[Tool],
            _config: &ChatConfig,
        ) -> Result<ChatResponse, LlmError> {
            assert!(!tools.is_empty());
            self.seen.lock().unwrap().push(messages.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::InvalidResponse {
                    message: "script exhausted".to_string(),
                })
        }

        async fn chat_streaming(&self, _: &str, _: &Messages, _: &ChatConfig) -> Result<EventStream, LlmError> {
            unreachable!()
        }

        async fn create_response(&self, _: &str, _: &str) -> Result<ResponsesOutput, LlmError> {
            unreachable!()
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    fn tool_reply(id: &str, input: Value) -> ChatResponse {
        ChatResponse {
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: "get_weather".to_string(),
                input,
            }],
            finish_reason: Some("tool_calls".to_string()),
            ..ChatResponse::default()
        }
    }

    fn text_reply(text: &str) -> ChatResponse {
        ChatResponse {
            content: text.to_string(),
            finish_reason: Some("stop".to_string()),
            ..ChatResponse::default()
        }
    }

    async fn tool_loop(provider: Arc<ScriptedProvider>, max_steps: u32) -> ToolLoop {
        let registry = ToolRegistry::with_builtin_tools().await.unwrap();
        ToolLoop::new(provider, registry, "gpt").with_max_steps(max_steps)
    }

    #[tokio::test]
    async fn test_single_tool_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("call_1", json!({"location": "Paris"})),
            text_reply("It is 22°C and sunny in Paris."),
        ]));
        let outcome = tool_loop(provider.clone(), 5).await.run("Weather in Paris?").await.unwrap();

        assert_eq!(outcome.steps, 2);
        assert!(!outcome.step_limit_reached);
        assert!(outcome.invoked("get_weather"));
        assert!(outcome.invocations[0].success);
        assert!(outcome.text.contains("Paris"));

        // Second request carries the assistant tool call and its result
        let seen = provider.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        assert!(second.messages[1].has_tool_calls());
        assert_eq!(second.messages[2].role, MessageRole::Tool);
        assert_eq!(second.messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert!(second.messages[2].content.contains("sunny"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_reported_back_to_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("call_1", json!({"city": "Paris"})),
            tool_reply("call_2", json!({"location": "Paris"})),
            text_reply("Sunny."),
        ]));
        let outcome = tool_loop(provider.clone(), 5).await.run("Weather?").await.unwrap();

        assert_eq!(outcome.invocations.len(), 2);
        assert!(!outcome.invocations[0].success);
        assert!(outcome.invocations[0]
            .error
            .as_deref()
            .unwrap()
            .contains("location"));
        assert!(outcome.invocations[1].success);
        assert!(outcome.succeeded("get_weather"));

        let seen = provider.seen.lock().unwrap();
        assert!(seen[1].messages[2].content.contains("error"));
    }

    #[tokio::test]
    async fn test_rejected_call_is_invoked_but_not_succeeded() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("call_1", json!({"city": "Paris"})),
            text_reply("It is sunny."),
        ]));
        let outcome = tool_loop(provider, 5).await.run("Weather?").await.unwrap();

        assert!(outcome.invoked("get_weather"));
        assert!(!outcome.succeeded("get_weather"));
    }

    #[tokio::test]
    async fn test_step_limit_stops_the_loop() {
        let replies = (0..10)
            .map(|i| tool_reply(&format!("call_{}", i), json!({"location": "Oslo"})))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(replies));
        let outcome = tool_loop(provider.clone(), 3).await.run("Loop forever").await.unwrap();

        assert_eq!(outcome.steps, 3);
        assert!(outcome.step_limit_reached);
        assert_eq!(outcome.invocations.len(), 3);
        assert_eq!(provider.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let err = tool_loop(provider, 2).await.run("hi").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_system_prompt_is_first_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("ok")]));
        let registry = ToolRegistry::with_builtin_tools().await.unwrap();
        ToolLoop::new(provider.clone(), registry, "gpt")
            .with_system_prompt("Use tools when helpful.")
            .run("hi")
            .await
            .unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].messages[0].role, MessageRole::System);
    }
}
