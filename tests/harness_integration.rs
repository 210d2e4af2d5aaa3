//! End-to-end runs of the harness and the check suite against a scripted
//! in-process provider.

use anyhow::Context;
use async_trait::async_trait;
use foundry_probe::checks::{build_suite, CheckContext, CHECK_NAMES, TOOL_CALLING};
use foundry_probe::config::{ConfigError, HarnessConfig, ENV_API_KEY, ENV_ENDPOINT};
use foundry_probe::harness::{Harness, Outcome, Reporter, SharedBuffer, TestCase, TestSuite};
use foundry_probe::llm::{
    ChatConfig, ChatResponse, EventStream, LlmError, LlmProvider, MessageRole, Messages,
    ResponsesOutput, StreamEvent, Tool, ToolCall, Usage,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// Answers every check the way a healthy endpoint would
#[derive(Debug, Default)]
struct HealthyEndpoint {
    chat_calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for HealthyEndpoint {
    async fn chat(
        &self,
        _model_id: &str,
        messages: &Messages,
        _config: &ChatConfig,
    ) -> Result<ChatResponse, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let content = if last.contains("favorite color?") {
            "Teal."
        } else if last.contains("remember") {
            "Got it, teal."
        } else {
            "Quantum computers use qubits to explore many states at once."
        };
        Ok(ChatResponse {
            content: content.to_string(),
            usage: Some(Usage::new(20, 12)),
            finish_reason: Some("stop".to_string()),
            ..ChatResponse::default()
        })
    }

    async fn chat_with_tools(
        &self,
        _model_id: &str,
        messages: &Messages,
        tools: &[Tool],
        _config: &ChatConfig,
    ) -> Result<ChatResponse, LlmError> {
        assert!(tools.iter().any(|t| t.name == "get_weather"));
        let answered = messages.iter().any(|m| m.role == MessageRole::Tool);
        if answered {
            return Ok(ChatResponse {
                content: "It is 22°C and sunny in Paris.".to_string(),
                finish_reason: Some("stop".to_string()),
                ..ChatResponse::default()
            });
        }
        Ok(ChatResponse {
            tool_calls: vec![ToolCall {
                id: "call_weather".to_string(),
                name: "get_weather".to_string(),
                input: json!({"location": "Paris", "unit": "celsius"}),
            }],
            finish_reason: Some("tool_calls".to_string()),
            ..ChatResponse::default()
        })
    }

    async fn chat_streaming(
        &self,
        _model_id: &str,
        _messages: &Messages,
        _config: &ChatConfig,
    ) -> Result<EventStream, LlmError> {
        let events = vec![
            StreamEvent::TextDelta("1 2".to_string()),
            StreamEvent::TextDelta(" 3 4 5".to_string()),
            StreamEvent::Usage(Usage::new(10, 5)),
            StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
            },
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn create_response(&self, _model_id: &str, input: &str) -> Result<ResponsesOutput, LlmError> {
        assert!(input.contains("fibonacci"));
        Ok(ResponsesOutput {
            id: Some("resp_1".to_string()),
            output_text: "def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)".to_string(),
            usage: Some(Usage::new(15, 30)),
        })
    }

    fn provider_name(&self) -> &str {
        "healthy"
    }
}

/// Model that never stops asking for tools
#[derive(Debug)]
struct ToolHungryEndpoint;

#[async_trait]
impl LlmProvider for ToolHungryEndpoint {
    async fn chat(&self, _: &str, _: &Messages, _: &ChatConfig) -> Result<ChatResponse, LlmError> {
        Err(LlmError::Http {
            provider: "foundry-v1".to_string(),
            status: 429,
            body: r#"{"error":{"code":"RateLimitReached"}}"#.to_string(),
        })
    }

    async fn chat_with_tools(
        &self,
        _: &str,
        messages: &Messages,
        _: &[Tool],
        _: &ChatConfig,
    ) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            tool_calls: vec![ToolCall {
                id: format!("call_{}", messages.len()),
                name: "get_weather".to_string(),
                input: json!({"location": "Oslo"}),
            }],
            ..ChatResponse::default()
        })
    }

    async fn chat_streaming(&self, _: &str, _: &Messages, _: &ChatConfig) -> Result<EventStream, LlmError> {
        Ok(Box::pin(futures::stream::iter(vec![StreamEvent::Error(
            "upstream closed the stream".to_string(),
        )])))
    }

    async fn create_response(&self, _: &str, _: &str) -> Result<ResponsesOutput, LlmError> {
        Err(LlmError::InvalidResponse {
            message: "no output".to_string(),
        })
    }

    fn provider_name(&self) -> &str {
        "tool-hungry"
    }
}

fn capture(timeout: Duration) -> (Harness, SharedBuffer, SharedBuffer) {
    let out = SharedBuffer::new();
    let err = SharedBuffer::new();
    let reporter = Reporter::new(Box::new(out.clone()), Box::new(err.clone()), false);
    (Harness::new(timeout, reporter), out, err)
}

fn test_config() -> HarnessConfig {
    HarnessConfig {
        endpoint: "https://example.openai.azure.com".to_string(),
        api_key: "test-key-0123456789".to_string(),
        responses_model: Some("gpt-5.3-codex".to_string()),
        secondary_model: Some("Kimi-K2.5".to_string()),
        ..HarnessConfig::default()
    }
}

#[tokio::test]
async fn full_suite_passes_against_healthy_endpoint() {
    let provider = Arc::new(HealthyEndpoint::default());
    let (mut harness, out, err) = capture(Duration::from_secs(10));
    let ctx = CheckContext::new(test_config(), provider.clone())
        .with_output(harness.reporter().output());
    let suite = build_suite(Arc::new(ctx), &[]).unwrap();
    assert_eq!(suite.len(), CHECK_NAMES.len());

    let summary = harness.run_all(suite).await;

    let names: Vec<&str> = summary.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, CHECK_NAMES.to_vec());
    assert_eq!(summary.failed(), 0, "stderr: {}", err.contents());
    assert_eq!(summary.passed(), 6);
    assert_eq!(summary.skipped(), 2);
    assert_eq!(summary.exit_code(false), 0);
    let out = out.contents();
    assert!(out.contains("6/8 tests passed (2 skipped)"));
    assert!(err.contents().is_empty());

    // check output sits between its header and its verdict
    let header = out.find("🧪 tool-calling").unwrap();
    let call = out.find("🔧 ✅ get_weather").unwrap();
    let verdict = out.find("✅ tool-calling passed").unwrap();
    assert!(header < call && call < verdict);

    // basic-generation once, secondary-model once, multi-turn twice
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn misbehaving_endpoint_fails_checks_independently() {
    let ctx = Arc::new(CheckContext::new(test_config(), Arc::new(ToolHungryEndpoint)));
    let suite = build_suite(ctx, &[]).unwrap();

    let (mut harness, _, err) = capture(Duration::from_secs(10));
    let summary = harness.run_all(suite).await;

    assert_eq!(summary.total(), CHECK_NAMES.len());
    assert_eq!(summary.passed(), 0);
    assert_eq!(summary.failed(), 6);
    assert_eq!(summary.exit_code(false), 1);
    assert_eq!(summary.exit_code(true), 0);

    let basic = summary.results[0].failure().unwrap();
    assert_eq!(basic.status, Some(429));
    assert!(basic.body.as_deref().unwrap().contains("RateLimitReached"));

    let tools = summary
        .results
        .iter()
        .find(|r| r.name == TOOL_CALLING)
        .and_then(|r| r.failure())
        .unwrap();
    assert!(tools.message.contains("still calling tools after 5 steps"));

    let err = err.contents();
    assert!(err.contains("HTTP status: 429"));
    assert!(err.contains("upstream closed the stream"));
}

#[tokio::test]
async fn one_pass_one_failure_scenario() {
    let (mut harness, out, err) = capture(Duration::from_secs(5));
    let mut suite = TestSuite::new();
    assert_ok!(suite.register(TestCase::new("A", || async { Ok(()) })));
    assert_ok!(suite.register(TestCase::new("B", || async {
        Err(anyhow::anyhow!("boom"))
    })));

    let summary = harness.run_all(suite).await;

    assert_eq!(summary.results.len(), 2);
    assert!(summary.results[0].passed());
    assert!(!summary.results[1].passed());
    assert!(out.contents().contains("1/2 tests passed"));
    assert_eq!(err.contents().matches("boom").count(), 1);
}

#[tokio::test]
async fn deadline_expiry_does_not_stop_the_run() {
    let (mut harness, _, err) = capture(Duration::from_millis(50));
    let mut suite = TestSuite::new();
    suite
        .register(TestCase::new("hangs", || async {
            std::future::pending::<()>().await;
            Ok(())
        }))
        .unwrap();
    suite
        .register(TestCase::new("after", || async { Ok(()) }))
        .unwrap();

    let summary = harness.run_all(suite).await;

    assert_eq!(
        summary.results[0].failure().unwrap().message,
        "timed out after 50ms"
    );
    assert!(summary.results[1].passed());
    assert!(err.contents().contains("timed out after 50ms"));
}

#[tokio::test]
async fn skipped_case_does_not_block_later_cases() {
    let ran = Arc::new(Mutex::new(Vec::new()));
    let (mut harness, _, _) = capture(Duration::from_secs(5));

    let mut suite = TestSuite::new();
    for name in ["before", "image-generation", "after"] {
        let case = if name == "image-generation" {
            TestCase::skipped(name, "image_model not set")
        } else {
            let ran = ran.clone();
            TestCase::new(name, move || async move {
                ran.lock().unwrap().push(name);
                Ok(())
            })
        };
        suite.register(case).unwrap();
    }

    let summary = harness.run_all(suite).await;

    assert_eq!(*ran.lock().unwrap(), vec!["before", "after"]);
    let names: Vec<_> = summary.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["before", "image-generation", "after"]);
    assert!(summary.results[0].passed());
    assert_eq!(
        summary.results[1].outcome,
        Outcome::Skipped("image_model not set".to_string())
    );
    assert!(summary.results[2].passed());
    assert_eq!(summary.summary_line(), "2/3 tests passed (1 skipped)");
}

#[tokio::test]
async fn results_keep_registration_order_despite_failures() {
    let (mut harness, _, _) = capture(Duration::from_secs(5));
    let mut suite = TestSuite::new();
    for i in 0..6 {
        let name = format!("case-{}", i);
        suite
            .register(TestCase::new(name, move || async move {
                if i % 2 == 0 {
                    Ok(())
                } else {
                    Err(LlmError::Stream {
                        message: format!("stream {} dropped", i),
                    })
                    .context("streaming check failed")
                }
            }))
            .unwrap();
    }

    let summary = harness.run_all(suite).await;

    assert_eq!(summary.total(), 6);
    for (i, result) in summary.results.iter().enumerate() {
        assert_eq!(result.name, format!("case-{}", i));
        assert_eq!(result.passed(), i % 2 == 0);
    }
    let cause = summary.results[1].failure().unwrap().cause.clone().unwrap();
    assert!(cause.contains("stream 1 dropped"));
}

#[tokio::test]
async fn harness_runs_are_independent() {
    let (mut harness, _, _) = capture(Duration::from_secs(5));
    for _ in 0..2 {
        let mut suite = TestSuite::new();
        suite
            .register(TestCase::new("only", || async { Ok(()) }))
            .unwrap();
        let summary = harness.run_all(suite).await;
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.passed(), 1);
    }
}

#[test]
fn preflight_rejects_missing_credentials() {
    let empty = HarnessConfig::from_lookup(|_| None).unwrap();
    match assert_err!(empty.validate()) {
        ConfigError::Missing(name) => assert_eq!(name, ENV_ENDPOINT),
        other => panic!("unexpected error: {}", other),
    }

    let vars: HashMap<&str, &str> = [
        (ENV_ENDPOINT, "https://example.openai.azure.com"),
        (ENV_API_KEY, "   "),
    ]
    .into_iter()
    .collect();
    let no_key = HarnessConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
    assert!(matches!(no_key.validate(), Err(ConfigError::Missing(name)) if name == ENV_API_KEY));
}
