//! The checks run by the `foundry-probe` binary.
//!
//! Each check is an `async fn` over a shared [`CheckContext`] returning
//! `anyhow::Result<()>`. [`build_suite`] registers them in a fixed order;
//! checks whose model is not configured are registered as skipped.

use crate::agent::ToolLoop;
use crate::config::HarnessConfig;
use crate::harness::{HarnessError, OutputHandle, TestCase, TestSuite};
use crate::llm::{collect_text, ChatConfig, LlmProvider, Messages, OpenAiCompatibleProvider};
use crate::media::{ImageClient, VideoClient, VideoRequest};
use crate::tools::ToolRegistry;
use crate::utils::logging::preview;
use anyhow::{bail, ensure, Context};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const BASIC_GENERATION: &str = "basic-generation";
pub const MULTI_TURN_CHAT: &str = "multi-turn-chat";
pub const STREAMING: &str = "streaming";
pub const TOOL_CALLING: &str = "tool-calling";
pub const SECONDARY_MODEL: &str = "secondary-model";
pub const RESPONSES_API: &str = "responses-api";
pub const IMAGE_GENERATION: &str = "image-generation";
pub const VIDEO_GENERATION: &str = "video-generation";

/// Every check, in run order
pub const CHECK_NAMES: [&str; 8] = [
    BASIC_GENERATION,
    MULTI_TURN_CHAT,
    STREAMING,
    TOOL_CALLING,
    SECONDARY_MODEL,
    RESPONSES_API,
    IMAGE_GENERATION,
    VIDEO_GENERATION,
];

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const RESPONSES_PREVIEW_CHARS: usize = 500;

/// Collaborators shared read-only by every check
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub config: Arc<HarnessConfig>,
    pub provider: Arc<dyn LlmProvider>,
    pub images: Option<Arc<ImageClient>>,
    pub videos: Option<Arc<VideoClient>>,
    /// Where checks print what the endpoint answered
    pub output: OutputHandle,
}

impl CheckContext {
    /// Context without media clients
    pub fn new(config: HarnessConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            images: None,
            videos: None,
            output: OutputHandle::stdout(),
        }
    }

    /// Sends check output to `output`, usually the reporter's own writer
    pub fn with_output(mut self, output: OutputHandle) -> Self {
        self.output = output;
        self
    }

    /// Builds every collaborator the configuration asks for
    pub fn from_config(config: HarnessConfig) -> anyhow::Result<Self> {
        let provider = OpenAiCompatibleProvider::new(config.connection(), config.request_timeout)
            .context("failed to build chat client")?;
        tracing::debug!("🔵 chat client ready: {:?}", provider.connection());

        let images = match &config.image_model {
            Some(_) => Some(Arc::new(
                ImageClient::new(config.image_connection(), config.request_timeout)
                    .context("failed to build image client")?,
            )),
            None => None,
        };
        let videos = match &config.video_model {
            Some(_) => Some(Arc::new(
                VideoClient::new(config.connection(), config.request_timeout)
                    .context("failed to build video client")?,
            )),
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            provider: Arc::new(provider),
            images,
            videos,
            output: OutputHandle::stdout(),
        })
    }

    fn chat_config(&self) -> ChatConfig {
        ChatConfig::with_max_tokens(self.config.max_tokens)
    }
}

/// Names in `only` that match no check
pub fn unknown_checks(only: &[String]) -> Vec<String> {
    only.iter()
        .filter(|name| !CHECK_NAMES.contains(&name.as_str()))
        .cloned()
        .collect()
}

/// Registers the checks in run order.
///
/// When `only` is non-empty, checks not named in it are left out entirely.
pub fn build_suite(ctx: Arc<CheckContext>, only: &[String]) -> Result<TestSuite, HarnessError> {
    let selected = |name: &str| only.is_empty() || only.iter().any(|o| o == name);
    let config = ctx.config.clone();
    let mut suite = TestSuite::new();

    let mut add = |case: TestCase| -> Result<(), HarnessError> {
        if selected(case.name()) {
            suite.register(case)?;
        }
        Ok(())
    };

    add(check(BASIC_GENERATION, &ctx, basic_generation))?;
    add(check(MULTI_TURN_CHAT, &ctx, multi_turn_chat))?;
    add(check(STREAMING, &ctx, streaming))?;
    add(check(TOOL_CALLING, &ctx, tool_calling))?;
    add(optional(
        SECONDARY_MODEL,
        config.secondary_model.is_some(),
        "secondary_model",
        &ctx,
        secondary_model,
    ))?;
    add(optional(
        RESPONSES_API,
        config.responses_model.is_some(),
        "responses_model",
        &ctx,
        responses_api,
    ))?;
    add(optional(
        IMAGE_GENERATION,
        config.image_model.is_some(),
        "image_model",
        &ctx,
        image_generation,
    ))?;
    add(optional(
        VIDEO_GENERATION,
        config.video_model.is_some(),
        "video_model",
        &ctx,
        video_generation,
    )
    .with_timeout(config.video_timeout))?;

    Ok(suite)
}

fn check<F, Fut>(name: &str, ctx: &Arc<CheckContext>, body: F) -> TestCase
where
    F: FnOnce(Arc<CheckContext>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let ctx = ctx.clone();
    TestCase::new(name, move || body(ctx))
}

fn optional<F, Fut>(
    name: &str,
    configured: bool,
    setting: &str,
    ctx: &Arc<CheckContext>,
    body: F,
) -> TestCase
where
    F: FnOnce(Arc<CheckContext>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    if configured {
        check(name, ctx, body)
    } else {
        TestCase::skipped(name, format!("{} not set", setting))
    }
}

async fn basic_generation(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let model = &ctx.config.primary_model;
    let mut messages = Messages::new();
    messages.add_system_message(SYSTEM_PROMPT);
    messages.add_user_message("Explain quantum computing in one sentence.");

    let response = ctx
        .provider
        .chat(model, &messages, &ctx.chat_config())
        .await
        .with_context(|| format!("chat completion with {} failed", model))?;

    ensure!(
        !response.content.trim().is_empty(),
        "{} returned an empty answer",
        model
    );
    ctx.output.line(format!("✅ {} response: {}", model, response.content.trim()));
    if let Some(usage) = response.usage {
        ctx.output.line(format!("📊 Tokens: {}", usage.total_tokens));
    }
    Ok(())
}

async fn multi_turn_chat(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let model = &ctx.config.primary_model;
    let config = ctx.chat_config();

    let mut messages = Messages::new();
    messages.add_system_message(SYSTEM_PROMPT);
    messages.add_user_message("My favorite color is teal. Please remember that.");

    let first = ctx
        .provider
        .chat(model, &messages, &config)
        .await
        .context("first turn failed")?;
    messages.add_assistant_message(&first.content);
    messages.add_user_message("What is my favorite color? Answer with one word.");

    let second = ctx
        .provider
        .chat(model, &messages, &config)
        .await
        .context("second turn failed")?;

    ctx.output.line(format!("✅ Turn 2 answer: {}", second.content.trim()));
    ensure!(
        second.content.to_lowercase().contains("teal"),
        "model did not recall the fact from turn 1: {:?}",
        preview(second.content.trim(), 200)
    );
    Ok(())
}

async fn streaming(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let model = &ctx.config.primary_model;
    let mut messages = Messages::new();
    messages.add_user_message("Count from 1 to 5, separated by spaces.");

    let stream = ctx
        .provider
        .chat_streaming(model, &messages, &ctx.chat_config())
        .await
        .context("failed to open stream")?;
    let collected = collect_text(stream).await.context("stream failed")?;

    ensure!(collected.fragments > 0, "stream produced no text fragments");
    ctx.output.line(format!(
        "✅ Streamed {} fragment(s): {}",
        collected.fragments,
        collected.text.trim()
    ));
    if let Some(usage) = collected.usage {
        ctx.output.line(format!("📊 Tokens: {}", usage.total_tokens));
    }
    Ok(())
}

async fn tool_calling(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let registry = ToolRegistry::with_builtin_tools().await?;
    let outcome = ToolLoop::new(
        ctx.provider.clone(),
        registry,
        ctx.config.primary_model.clone(),
    )
    .with_max_steps(ctx.config.max_tool_steps)
    .with_config(ctx.chat_config())
    .with_system_prompt("Use the available tools to answer questions about the weather.")
    .run("What's the weather like in Paris right now?")
    .await
    .context("tool loop failed")?;

    for invocation in &outcome.invocations {
        let status = if invocation.success { "✅" } else { "❌" };
        ctx.output.line(format!("🔧 {} {}({})", status, invocation.name, invocation.arguments));
    }

    ensure!(
        outcome.invoked("get_weather"),
        "model never called get_weather"
    );
    ensure!(
        outcome.succeeded("get_weather"),
        "get_weather never ran: every call was rejected ({})",
        outcome
            .invocations
            .iter()
            .filter_map(|i| i.error.as_deref())
            .collect::<Vec<_>>()
            .join("; ")
    );
    if outcome.step_limit_reached {
        bail!(
            "model was still calling tools after {} steps",
            outcome.steps
        );
    }
    ensure!(
        !outcome.text.trim().is_empty(),
        "no final answer after tool use"
    );
    ctx.output.line(format!("✅ Final answer: {}", outcome.text.trim()));
    Ok(())
}

async fn secondary_model(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let model = ctx
        .config
        .secondary_model
        .as_deref()
        .context("secondary_model not set")?;
    let mut messages = Messages::new();
    messages.add_user_message("Write a haiku about artificial intelligence.");

    let response = ctx
        .provider
        .chat(model, &messages, &ctx.chat_config())
        .await
        .with_context(|| format!("chat completion with {} failed", model))?;

    ensure!(
        !response.content.trim().is_empty(),
        "{} returned an empty answer",
        model
    );
    ctx.output.line(format!("✅ {} response:\n{}", model, response.content.trim()));
    if let Some(usage) = response.usage {
        ctx.output.line(format!("📊 Tokens: {}", usage.total_tokens));
    }
    Ok(())
}

async fn responses_api(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let model = ctx
        .config
        .responses_model
        .as_deref()
        .context("responses_model not set")?;

    let output = ctx
        .provider
        .create_response(model, "Write a Python function to calculate fibonacci numbers")
        .await
        .with_context(|| format!("responses request with {} failed", model))?;

    ensure!(
        !output.output_text.trim().is_empty(),
        "{} returned no output text",
        model
    );
    ctx.output.line(format!("✅ {} response:", model));
    ctx.output.line(preview(&output.output_text, RESPONSES_PREVIEW_CHARS));
    if let Some(usage) = output.usage {
        ctx.output.line(format!("📊 Tokens: {}", usage.total_tokens));
    }
    Ok(())
}

async fn image_generation(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let model = ctx
        .config
        .image_model
        .as_deref()
        .context("image_model not set")?;
    let images = ctx.images.as_ref().context("image client not configured")?;

    let image = images
        .generate("A watercolor painting of a lighthouse at sunset", model)
        .await
        .context("image generation failed")?;
    if let Some(revised) = &image.revised_prompt {
        ctx.output.line(format!("🎨 Revised prompt: {}", revised));
    }

    let path = ctx.config.output_dir.join("image-generation.png");
    let written = image
        .save(&path)
        .await
        .context("failed to save generated image")?;
    ensure!(written > 0, "decoded image is empty");
    ctx.output.line(format!("✅ Image saved to {} ({} bytes)", path.display(), written));
    Ok(())
}

async fn video_generation(ctx: Arc<CheckContext>) -> anyhow::Result<()> {
    let model = ctx
        .config
        .video_model
        .as_deref()
        .context("video_model not set")?;
    let videos = ctx.videos.as_ref().context("video client not configured")?;

    let job = videos
        .create(
            &VideoRequest::new("A cute baby polar bear walking in the snow"),
            model,
        )
        .await
        .context("failed to create video job")?;
    ctx.output.line(format!("🎬 Video job {} is {}", job.id, job.status));

    let job = videos
        .wait_for_completion(
            job,
            ctx.config.video_poll_interval,
            polling_deadline(ctx.config.video_timeout, ctx.config.request_timeout),
        )
        .await
        .context("video generation did not complete")?;
    if let Some(progress) = job.progress {
        ctx.output.line(format!("🎬 Progress: {:.0}%", progress));
    }

    let path = ctx.config.output_dir.join("video-generation.mp4");
    let written = videos
        .download(&job.id, &path)
        .await
        .context("failed to download video")?;
    ensure!(written > 0, "downloaded video is empty");
    ctx.output.line(format!("✅ Video saved to {} ({} bytes)", path.display(), written));
    Ok(())
}

/// Leaves one request timeout of the check deadline for the download
fn polling_deadline(video_timeout: Duration, request_timeout: Duration) -> Duration {
    let remaining = video_timeout.saturating_sub(request_timeout);
    if remaining.is_zero() {
        video_timeout
    } else {
        remaining
    }
}
