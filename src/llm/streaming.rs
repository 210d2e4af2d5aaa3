//! Server-Sent Events decoding for streamed chat completions.

use crate::llm::traits::{EventStream, LlmError, StreamEvent, ToolCall, Usage};
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;

/// Tool call whose arguments are still arriving in fragments
#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn finish(self) -> ToolCall {
        let input = if self.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
                tracing::warn!(
                    "Failed to parse streamed tool arguments as JSON: {} | Raw: {}",
                    e,
                    self.arguments
                );
                Value::String(self.arguments.clone())
            })
        };

        ToolCall {
            id: self
                .id
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: self.name,
            input,
        }
    }
}

/// Line-oriented decoder for `chat/completions` streams.
///
/// Tool-call fragments are keyed by their `index` and emitted as complete
/// [`StreamEvent::ToolCall`]s once the choice reports a finish reason or the
/// `[DONE]` marker arrives. At most one `Done` event is produced.
#[derive(Debug, Default)]
pub struct SseParser {
    pending_tools: BTreeMap<u64, PartialToolCall>,
    finish_reason: Option<String>,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decodes one line of the event stream
    pub fn feed_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            // Comments, `event:` fields and blank separators carry nothing for us
            return events;
        };
        let data = data.trim();

        if data == "[DONE]" {
            tracing::debug!("🌊 Received [DONE] marker");
            events.extend(self.finish());
            return events;
        }

        let json: Value = match serde_json::from_str(data) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("⚠️ Failed to parse SSE JSON: {} | Data: {}", e, data);
                self.done = true;
                events.push(StreamEvent::Error(format!(
                    "failed to parse stream chunk: {}",
                    e
                )));
                return events;
            }
        };

        if let Some(error) = json.get("error") {
            self.done = true;
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            events.push(StreamEvent::Error(message));
            return events;
        }

        if let Some(choice) = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        {
            if let Some(delta) = choice.get("delta") {
                if let Some(tool_calls) = delta.get("tool_calls").and_then(|tc| tc.as_array()) {
                    for fragment in tool_calls {
                        self.absorb_tool_fragment(fragment);
                    }
                }

                if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
                    if !content.is_empty() {
                        events.push(StreamEvent::TextDelta(content.to_string()));
                    }
                }
            }

            if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
                tracing::debug!("🌊 Finish reason: {}", reason);
                self.finish_reason = Some(reason.to_string());
                events.extend(self.flush_tools());
            }
        }

        // Usage arrives in a trailing chunk with an empty `choices` array
        if let Some(usage) = json.get("usage").and_then(parse_usage) {
            events.push(StreamEvent::Usage(usage));
        }

        events
    }

    /// Flushes pending tool calls and emits the terminal `Done` event.
    ///
    /// Called on `[DONE]` and when the byte stream ends without one.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        let mut events = self.flush_tools();
        self.done = true;
        events.push(StreamEvent::Done {
            finish_reason: self.finish_reason.take(),
        });
        events
    }

    fn absorb_tool_fragment(&mut self, fragment: &Value) {
        let index = fragment.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
        let partial = self.pending_tools.entry(index).or_default();

        if let Some(id) = fragment.get("id").and_then(|i| i.as_str()) {
            partial.id = Some(id.to_string());
        }
        if let Some(function) = fragment.get("function") {
            if let Some(name) = function.get("name").and_then(|n| n.as_str()) {
                partial.name.push_str(name);
            }
            if let Some(arguments) = function.get("arguments").and_then(|a| a.as_str()) {
                partial.arguments.push_str(arguments);
            }
        }
    }

    fn flush_tools(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.pending_tools)
            .into_values()
            .filter(|partial| !partial.name.is_empty())
            .map(|partial| StreamEvent::ToolCall(partial.finish()))
            .collect()
    }
}

/// Parses an OpenAI `usage` object (chat or Responses naming)
pub(crate) fn parse_usage(usage: &Value) -> Option<Usage> {
    let count = |value: &Value| value.as_u64().and_then(|n| u32::try_from(n).ok());
    let input = count(
        usage
            .get("prompt_tokens")
            .or_else(|| usage.get("input_tokens"))?,
    )?;
    let output = count(
        usage
            .get("completion_tokens")
            .or_else(|| usage.get("output_tokens"))?,
    )?;
    let total = usage
        .get("total_tokens")
        .and_then(count)
        .unwrap_or_else(|| input.saturating_add(output));
    Some(Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: total,
    })
}

/// Turns a byte stream of SSE lines into [`StreamEvent`]s
pub fn sse_event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut parser = SseParser::new();
        // Raw bytes so a UTF-8 sequence split across chunks is decoded whole
        let mut buffer: Vec<u8> = Vec::new();
        let mut bytes = Box::pin(bytes);

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    buffer.extend_from_slice(chunk.as_ref());
                    while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = buffer.drain(..=newline).collect();
                        let line = String::from_utf8_lossy(&raw);
                        for event in parser.feed_line(&line) {
                            yield event;
                        }
                    }
                    if parser.is_done() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("❌ SSE stream error: {}", e);
                    yield StreamEvent::Error(format!("stream interrupted: {}", e));
                    return;
                }
            }
        }

        let rest = String::from_utf8_lossy(&buffer).into_owned();
        if !rest.trim().is_empty() {
            for event in parser.feed_line(&rest) {
                yield event;
            }
        }
        for event in parser.finish() {
            yield event;
        }
    };

    Box::pin(stream)
}

/// Text and bookkeeping gathered by draining a stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedStream {
    pub text: String,
    pub fragments: usize,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// Drains `stream`, concatenating text fragments.
///
/// An in-band `Error` event ends collection with [`LlmError::Stream`].
pub async fn collect_text(mut stream: EventStream) -> Result<CollectedStream, LlmError> {
    let mut collected = CollectedStream::default();

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::TextDelta(text) => {
                collected.fragments += 1;
                collected.text.push_str(&text);
            }
            StreamEvent::ToolCall(call) => collected.tool_calls.push(call),
            StreamEvent::Usage(usage) => collected.usage = Some(usage),
            StreamEvent::Done { finish_reason } => {
                collected.finish_reason = finish_reason;
                break;
            }
            StreamEvent::Error(message) => return Err(LlmError::Stream { message }),
        }
    }

    Ok(collected)
}
