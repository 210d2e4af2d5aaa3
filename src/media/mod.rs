//! Image and video generation clients.
//!
//! Both reuse the chat [`Connection`](crate::llm::strategy::Connection) so
//! addressing and authentication follow the configured strategy.

pub mod image;
pub mod video;

use crate::llm::traits::LlmError;
use std::path::PathBuf;

pub use image::{GeneratedImage, ImageClient, ImageRequest};
pub use video::{VideoClient, VideoJob, VideoRequest, VideoStatus};

/// Errors raised by the media clients
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// The HTTP exchange itself failed
    #[error("{0}")]
    Api(#[from] LlmError),

    /// A 2xx response lacked the expected payload
    #[error("Missing payload: {0}")]
    MissingPayload(String),

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job reached a terminal state other than `completed`
    #[error("Video job {id} ended with status {status}{}", format_detail(.detail))]
    JobFailed {
        id: String,
        status: String,
        detail: Option<String>,
    },

    /// The job was still running when the polling deadline passed
    #[error("Video job {id} still {status} after {waited_secs}s")]
    TimedOut {
        id: String,
        status: String,
        waited_secs: u64,
    },
}

fn format_detail(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

impl MediaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MediaError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Creates the parent directory of `path` when it has one
pub(crate) async fn ensure_parent(path: &std::path::Path) -> Result<(), MediaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MediaError::io(parent, e))?;
    }
    Ok(())
}

pub(crate) fn build_http_client(timeout: std::time::Duration) -> Result<reqwest::Client, MediaError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            MediaError::Api(LlmError::Network {
                message: "failed to build HTTP client".to_string(),
                source: e,
            })
        })
}
