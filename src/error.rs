//! Failure reports shown for a failed test.
//!
//! Check bodies return `anyhow::Result` and decorate errors with
//! `.context(...)`. [`FailureReport::from_error`] flattens whatever chain
//! comes back into the four pieces the reporter prints: the outermost
//! message, the innermost distinct cause, and the upstream HTTP status and
//! body when the chain contains an HTTP failure.

use crate::llm::traits::LlmError;
use crate::media::MediaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized description of why a test failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Outermost error message
    pub message: String,
    /// Innermost source message, when it differs from `message`
    pub cause: Option<String>,
    /// Upstream HTTP status
    pub status: Option<u16>,
    /// Upstream response body
    pub body: Option<String>,
}

impl FailureReport {
    /// Report carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            status: None,
            body: None,
        }
    }

    /// Walks the error chain of `error`.
    ///
    /// The first [`LlmError::Http`] found, either directly or wrapped in
    /// [`MediaError::Api`], supplies `status` and `body`.
    pub fn from_error(error: &anyhow::Error) -> Self {
        let message = error.to_string();
        let root = error.root_cause().to_string();
        let cause = (root != message).then_some(root);

        let http = error.chain().find_map(|source| {
            source
                .downcast_ref::<LlmError>()
                .or_else(|| match source.downcast_ref::<MediaError>() {
                    Some(MediaError::Api(inner)) => Some(inner),
                    _ => None,
                })
                .filter(|e| e.status().is_some())
        });

        Self {
            message,
            cause,
            status: http.and_then(LlmError::status),
            body: http.and_then(|e| e.body()).map(str::to_string),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

impl From<&anyhow::Error> for FailureReport {
    fn from(error: &anyhow::Error) -> Self {
        Self::from_error(error)
    }
}
