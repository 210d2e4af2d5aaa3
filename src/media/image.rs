//! `images/generations` client returning base64 payloads.

use crate::llm::strategy::{ApiRoute, Connection};
use crate::media::{build_http_client, ensure_parent, MediaError};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// Options for a single generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
    pub quality: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: "1024x1024".to_string(),
            quality: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}

/// One generated image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub b64_json: String,
    /// Prompt as rewritten by the service, when it reports one
    pub revised_prompt: Option<String>,
}

impl GeneratedImage {
    pub fn decode(&self) -> Result<Vec<u8>, MediaError> {
        Ok(base64::engine::general_purpose::STANDARD.decode(self.b64_json.trim())?)
    }

    /// Decodes the payload and writes it to `path`, returning the byte count
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<usize, MediaError> {
        let path = path.as_ref();
        let bytes = self.decode()?;
        ensure_parent(path).await?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| MediaError::io(path, e))?;
        tracing::info!("🎨 wrote {} bytes to {}", bytes.len(), path.display());
        Ok(bytes.len())
    }
}

/// Image generation client
#[derive(Debug, Clone)]
pub struct ImageClient {
    connection: Connection,
    client: reqwest::Client,
}

impl ImageClient {
    pub fn new(connection: Connection, request_timeout: Duration) -> Result<Self, MediaError> {
        Ok(Self {
            connection,
            client: build_http_client(request_timeout)?,
        })
    }

    /// Generates one image for `prompt` with the default size
    pub async fn generate(&self, prompt: &str, model: &str) -> Result<GeneratedImage, MediaError> {
        self.generate_with(&ImageRequest::new(prompt), model).await
    }

    pub async fn generate_with(
        &self,
        request: &ImageRequest,
        model: &str,
    ) -> Result<GeneratedImage, MediaError> {
        tracing::info!("🎨 generating image with {} ({})", model, request.size);
        let body = self.request_body(request, model);
        let http = self
            .connection
            .request(
                &self.client,
                reqwest::Method::POST,
                &ApiRoute::ImageGenerations,
                model,
            )
            .json(&body);

        let response = self.connection.send_json(http).await?;
        parse_image_response(&response)
    }

    fn request_body(&self, request: &ImageRequest, model: &str) -> Value {
        let mut body = json!({
            "prompt": request.prompt,
            "n": 1,
            "size": request.size,
        });
        if self.connection.model_in_body(&ApiRoute::ImageGenerations) {
            body["model"] = json!(model);
        }
        if let Some(quality) = &request.quality {
            body["quality"] = json!(quality);
        }
        body
    }
}

/// Extracts `data[0].b64_json` from a generation response
pub fn parse_image_response(response: &Value) -> Result<GeneratedImage, MediaError> {
    let first = response
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| MediaError::MissingPayload("response has no data entries".to_string()))?;

    let b64_json = match first.get("b64_json").and_then(|b| b.as_str()) {
        Some(b64) if !b64.is_empty() => b64.to_string(),
        _ if first.get("url").is_some() => {
            return Err(MediaError::MissingPayload(
                "image returned as URL, expected b64_json".to_string(),
            ))
        }
        _ => return Err(MediaError::MissingPayload("data[0] has no b64_json".to_string())),
    };

    Ok(GeneratedImage {
        b64_json,
        revised_prompt: first
            .get("revised_prompt")
            .and_then(|p| p.as_str())
            .map(str::to_string),
    })
}
