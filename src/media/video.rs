//! Asynchronous video generation: create a job, poll it, download the result.

use crate::llm::strategy::{ApiRoute, Connection};
use crate::media::{build_http_client, ensure_parent, MediaError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

/// Lifecycle state reported by the videos API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    /// Any state this client does not know about
    Other(String),
}

impl VideoStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" | "pending" => VideoStatus::Queued,
            "in_progress" | "processing" | "running" => VideoStatus::InProgress,
            "completed" | "succeeded" => VideoStatus::Completed,
            "failed" => VideoStatus::Failed,
            "cancelled" | "canceled" => VideoStatus::Cancelled,
            other => VideoStatus::Other(other.to_string()),
        }
    }

    /// No further transitions will happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoStatus::Completed | VideoStatus::Failed | VideoStatus::Cancelled
        )
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoStatus::Queued => f.write_str("queued"),
            VideoStatus::InProgress => f.write_str("in_progress"),
            VideoStatus::Completed => f.write_str("completed"),
            VideoStatus::Failed => f.write_str("failed"),
            VideoStatus::Cancelled => f.write_str("cancelled"),
            VideoStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// Snapshot of a generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: String,
    pub status: VideoStatus,
    /// Percent complete, when reported
    pub progress: Option<f64>,
    /// Service-provided failure detail
    pub error: Option<String>,
}

impl VideoJob {
    pub fn from_json(value: &Value) -> Result<Self, MediaError> {
        let id = value
            .get("id")
            .and_then(|i| i.as_str())
            .ok_or_else(|| MediaError::MissingPayload("video job has no id".to_string()))?;
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .ok_or_else(|| MediaError::MissingPayload("video job has no status".to_string()))?;

        let error = value.get("error").and_then(|e| match e {
            Value::Null => None,
            Value::String(message) => Some(message.clone()),
            other => other
                .get("message")
                .or_else(|| other.get("code"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .or_else(|| Some(other.to_string())),
        });

        Ok(Self {
            id: id.to_string(),
            status: VideoStatus::parse(status),
            progress: value.get("progress").and_then(|p| p.as_f64()),
            error,
        })
    }
}

/// Parameters of a generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
    /// `WIDTHxHEIGHT`
    pub size: String,
    /// Clip length; the API takes it as a string
    pub seconds: String,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: "720x1280".to_string(),
            seconds: "4".to_string(),
        }
    }
}

/// Client for the videos API
#[derive(Debug, Clone)]
pub struct VideoClient {
    connection: Connection,
    client: reqwest::Client,
}

impl VideoClient {
    pub fn new(connection: Connection, request_timeout: Duration) -> Result<Self, MediaError> {
        Ok(Self {
            connection,
            client: build_http_client(request_timeout)?,
        })
    }

    /// Submits a generation job
    pub async fn create(&self, request: &VideoRequest, model: &str) -> Result<VideoJob, MediaError> {
        tracing::info!(
            "🎬 creating video job with {} ({}, {}s)",
            model,
            request.size,
            request.seconds
        );
        let body = json!({
            "model": model,
            "prompt": request.prompt,
            "size": request.size,
            "seconds": request.seconds,
        });
        let http = self
            .connection
            .request(&self.client, reqwest::Method::POST, &ApiRoute::Videos, model)
            .json(&body);

        let response = self.connection.send_json(http).await?;
        VideoJob::from_json(&response)
    }

    /// Fetches the current state of job `id`
    pub async fn retrieve(&self, id: &str) -> Result<VideoJob, MediaError> {
        let http = self.connection.request(
            &self.client,
            reqwest::Method::GET,
            &ApiRoute::Video(id.to_string()),
            "",
        );
        let response = self.connection.send_json(http).await?;
        VideoJob::from_json(&response)
    }

    /// Polls until the job is terminal; only `completed` is success
    pub async fn wait_for_completion(
        &self,
        job: VideoJob,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<VideoJob, MediaError> {
        poll_until_terminal(job, poll_interval, deadline, |id| async move {
            self.retrieve(&id).await
        })
        .await
    }

    /// Streams the rendered video of job `id` to `path`, returning bytes written
    pub async fn download(&self, id: &str, path: impl AsRef<Path>) -> Result<u64, MediaError> {
        let path = path.as_ref();
        let http = self
            .connection
            .request(
                &self.client,
                reqwest::Method::GET,
                &ApiRoute::VideoContent(id.to_string()),
                "",
            )
            .query(&[("variant", "video")]);
        let response = self.connection.send(http).await?;

        ensure_parent(path).await?;
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| MediaError::io(path, e))?;

        let mut written = 0u64;
        let mut body = Box::pin(response.bytes_stream());
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                MediaError::Api(crate::llm::traits::LlmError::Network {
                    message: "video download interrupted".to_string(),
                    source: e,
                })
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| MediaError::io(path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| MediaError::io(path, e))?;

        tracing::info!("🎬 wrote {} bytes to {}", written, path.display());
        Ok(written)
    }
}

/// Re-fetches `job` every `poll_interval` until it reaches a terminal state.
///
/// Gives up with [`MediaError::TimedOut`] once another wait would pass
/// `deadline`. Terminal states other than `completed` become
/// [`MediaError::JobFailed`].
pub async fn poll_until_terminal<F, Fut>(
    mut job: VideoJob,
    poll_interval: Duration,
    deadline: Duration,
    mut fetch: F,
) -> Result<VideoJob, MediaError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<VideoJob, MediaError>>,
{
    let started = Instant::now();

    while !job.status.is_terminal() {
        if started.elapsed() + poll_interval > deadline {
            return Err(MediaError::TimedOut {
                id: job.id,
                status: job.status.to_string(),
                waited_secs: started.elapsed().as_secs(),
            });
        }

        tokio::time::sleep(poll_interval).await;
        job = fetch(job.id.clone()).await?;
        tracing::info!(
            "🎬 video job {} is {}{}",
            job.id,
            job.status,
            job.progress
                .map(|p| format!(" ({:.0}%)", p))
                .unwrap_or_default()
        );
    }

    match job.status {
        VideoStatus::Completed => Ok(job),
        _ => Err(MediaError::JobFailed {
            status: job.status.to_string(),
            id: job.id,
            detail: job.error,
        }),
    }
}
