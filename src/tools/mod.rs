//! Local tools the model may call during the tool-calling check.
//!
//! Each [`Tool`] declares a JSON schema for its arguments. The
//! [`ToolRegistry`] checks incoming arguments against that schema before the
//! tool runs, so a tool body only ever sees well-formed input.
//!
//! # Key Types
//!
//! - [`Tool`] - Trait implemented by every tool
//! - [`ToolRegistry`] - Name-keyed, duplicate-rejecting collection of tools
//! - [`ToolResult`] - Outcome handed back to the model
//! - [`ToolError`] - Why a call could not be carried out

pub mod builtin;
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use builtin::{CalculatorTool, WeatherTool};
pub use schema::SchemaViolation;

/// A callable tool with a declared argument schema
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    /// Name the model uses to call the tool
    fn name(&self) -> &str;

    /// One-line explanation shown to the model
    fn description(&self) -> &str;

    /// JSON schema the arguments must satisfy
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with arguments that already satisfy the schema
    async fn execute(&self, parameters: Value) -> Result<ToolResult, ToolError>;
}

/// What a tool hands back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// `false` when the tool ran but could not answer
    pub success: bool,
    /// The result content
    pub content: Value,
    /// Present only when `success` is false
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(content: Value) -> Self {
        Self {
            success: true,
            content,
            error: None,
        }
    }

    /// A result the model sees as `{"error": message}`
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            content: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Text sent back to the model as the tool message content
    pub fn to_message_content(&self) -> String {
        if self.success {
            match &self.content {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }
        } else {
            serde_json::json!({ "error": self.error.as_deref().unwrap_or("tool failed") })
                .to_string()
        }
    }
}

/// Why a tool call could not be carried out
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// Arguments rejected before the tool ran
    #[error("Invalid parameters for {tool}: {violation}")]
    InvalidParameters {
        tool: String,
        violation: SchemaViolation,
    },

    /// The model asked for a tool that is not registered
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// Another tool already uses this name
    #[error("Duplicate tool name: {name}")]
    DuplicateTool { name: String },

    /// Tool execution failed
    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },
}

/// Thread-safe registry of tools keyed by name.
///
/// Cloning is cheap and clones share the same underlying map.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `get_weather` and `calculator`
    pub async fn with_builtin_tools() -> Result<Self, ToolError> {
        let registry = Self::new();
        registry.register_tool(Box::new(WeatherTool::new())).await?;
        registry.register_tool(Box::new(CalculatorTool::new())).await?;
        Ok(registry)
    }

    /// Register a tool; names must be unique
    pub async fn register_tool(&self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let tool_name = tool.name().to_string();
        let mut tools = self.tools.write().await;

        if tools.contains_key(&tool_name) {
            return Err(ToolError::DuplicateTool { name: tool_name });
        }

        tools.insert(tool_name.clone(), Arc::from(tool));
        tracing::debug!("Registered tool: {}", tool_name);
        Ok(())
    }

    /// Tool definitions for the provider, sorted by name
    pub async fn to_llm_tools(&self) -> Vec<crate::llm::traits::Tool> {
        let tools = self.tools.read().await;
        let mut definitions: Vec<_> = tools
            .values()
            .map(|tool| crate::llm::traits::Tool {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Validates `parameters` against the tool's schema, then runs it.
    ///
    /// # Errors
    ///
    /// - [`ToolError::ToolNotFound`] - Tool name not registered
    /// - [`ToolError::InvalidParameters`] - Arguments failed validation; the
    ///   tool was not invoked
    /// - [`ToolError::ExecutionFailed`] - The tool itself failed
    pub async fn execute_tool(
        &self,
        name: &str,
        parameters: Value,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .get_tool(name)
            .await
            .ok_or_else(|| ToolError::ToolNotFound {
                name: name.to_string(),
            })?;

        schema::validate(&tool.parameters_schema(), &parameters).map_err(|violation| {
            tracing::debug!("Rejected arguments for {}: {}", name, violation);
            ToolError::InvalidParameters {
                tool: name.to_string(),
                violation,
            }
        })?;

        tool.execute(parameters).await
    }

    /// Get all registered tool names, sorted
    pub async fn tool_names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Looks up a tool without validating or running it
    pub async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its text argument"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, parameters: Value) -> Result<ToolResult, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::success(parameters["text"].clone()))
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new();
        registry
            .register_tool(Box::new(CountingTool {
                calls: calls.clone(),
            }))
            .await
            .unwrap();

        assert!(registry.has_tool("echo").await);
        let result = registry
            .execute_tool("echo", json!({"text": "hi"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.to_message_content(), "hi");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = ToolRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register_tool(Box::new(CountingTool {
                calls: calls.clone(),
            }))
            .await
            .unwrap();

        let err = registry
            .register_tool(Box::new(CountingTool { calls }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::DuplicateTool { name } if name == "echo"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_the_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new();
        registry
            .register_tool(Box::new(CountingTool {
                calls: calls.clone(),
            }))
            .await
            .unwrap();

        let err = registry
            .execute_tool("echo", json!({"text": 5}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters { .. }));

        let err = registry.execute_tool("echo", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("missing required property 'text'"));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_builtin_registry_definitions_are_sorted() {
        let registry = ToolRegistry::with_builtin_tools().await.unwrap();
        let names: Vec<String> = registry
            .to_llm_tools()
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["calculator", "get_weather"]);
        assert_eq!(registry.tool_names().await, names);
    }

    #[test]
    fn test_error_result_content() {
        let result = ToolResult::error("city unknown");
        assert_eq!(result.to_message_content(), "{\"error\":\"city unknown\"}");
    }
}
