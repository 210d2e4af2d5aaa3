//! Chat collaborators for OpenAI-compatible inference endpoints.
//!
//! ```text
//! checks → LlmProvider (trait) → OpenAiCompatibleProvider
//!                                      ↓
//!                         Connection (ClientStrategy: url + auth)
//! ```
//!
//! - [`traits`] defines the provider contract and the wire-independent types.
//! - [`strategy`] resolves how requests are addressed and authenticated.
//! - [`streaming`] decodes Server-Sent Events into [`StreamEvent`]s.
//! - [`providers`] holds the HTTP implementation.

pub mod providers;
pub mod strategy;
pub mod streaming;
pub mod traits;

pub use providers::OpenAiCompatibleProvider;
pub use strategy::{ApiRoute, ClientStrategy, Connection};
pub use streaming::{collect_text, CollectedStream, SseParser};
pub use traits::{
    ChatConfig, ChatResponse, EventStream, LlmError, LlmProvider, Message, MessageRole, Messages,
    ResponsesOutput, StreamEvent, Tool, ToolCall, Usage,
};
