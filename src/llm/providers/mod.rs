//! Provider implementations.
//!
//! Every supported endpoint speaks the OpenAI wire protocol, so a single
//! implementation covers them; see [`crate::llm::strategy`] for the variants.

pub mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleProvider;
