//! Client-construction strategies.
//!
//! The three hosted flavors of the OpenAI wire protocol differ only in how the
//! URL is built and how the key is sent. [`Connection`] captures one resolved
//! choice and is shared by the chat provider and the media clients.

use crate::config::ConfigError;
use crate::llm::traits::LlmError;
use std::fmt;
use std::str::FromStr;

/// How requests are addressed and authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientStrategy {
    /// `{endpoint}/chat/completions` with `Authorization: Bearer`
    #[default]
    OpenAiCompatible,
    /// `{endpoint}/openai/deployments/{model}/...?api-version=V` with `api-key`
    AzureDeployment,
    /// `{endpoint}/openai/v1/...` with `api-key`
    FoundryV1,
}

impl ClientStrategy {
    pub const ALL: [ClientStrategy; 3] = [
        ClientStrategy::OpenAiCompatible,
        ClientStrategy::AzureDeployment,
        ClientStrategy::FoundryV1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStrategy::OpenAiCompatible => "openai-compatible",
            ClientStrategy::AzureDeployment => "azure-deployment",
            ClientStrategy::FoundryV1 => "foundry-v1",
        }
    }
}

impl fmt::Display for ClientStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai-compatible" | "openai" => Ok(ClientStrategy::OpenAiCompatible),
            "azure-deployment" | "azure" => Ok(ClientStrategy::AzureDeployment),
            "foundry-v1" | "foundry" | "v1" => Ok(ClientStrategy::FoundryV1),
            other => Err(ConfigError::Validation(format!(
                "unknown client strategy '{}', expected one of: openai-compatible, azure-deployment, foundry-v1",
                other
            ))),
        }
    }
}

/// Remote operation being addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRoute {
    ChatCompletions,
    Responses,
    ImageGenerations,
    Videos,
    Video(String),
    VideoContent(String),
}

impl ApiRoute {
    fn path(&self) -> String {
        match self {
            ApiRoute::ChatCompletions => "chat/completions".to_string(),
            ApiRoute::Responses => "responses".to_string(),
            ApiRoute::ImageGenerations => "images/generations".to_string(),
            ApiRoute::Videos => "videos".to_string(),
            ApiRoute::Video(id) => format!("videos/{}", id),
            ApiRoute::VideoContent(id) => format!("videos/{}/content", id),
        }
    }

    /// Routes served under a per-deployment path on classic Azure resources
    fn is_deployment_scoped(&self) -> bool {
        matches!(self, ApiRoute::ChatCompletions | ApiRoute::ImageGenerations)
    }
}

/// Endpoint, credential and strategy resolved once at startup
#[derive(Clone)]
pub struct Connection {
    strategy: ClientStrategy,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("strategy", &self.strategy)
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &crate::utils::logging::obscure_credential(&self.api_key),
            )
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl Connection {
    pub fn new(
        strategy: ClientStrategy,
        endpoint: &str,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            strategy,
            base_url: normalize_endpoint(strategy, endpoint),
            api_key: api_key.into(),
            api_version: api_version.into(),
        }
    }

    pub fn strategy(&self) -> ClientStrategy {
        self.strategy
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for `route`, without query parameters
    pub fn endpoint_url(&self, route: &ApiRoute, model: &str) -> String {
        let path = route.path();
        match self.strategy {
            ClientStrategy::OpenAiCompatible => format!("{}/{}", self.base_url, path),
            ClientStrategy::AzureDeployment if route.is_deployment_scoped() => format!(
                "{}/openai/deployments/{}/{}",
                self.base_url, model, path
            ),
            ClientStrategy::AzureDeployment => format!("{}/openai/{}", self.base_url, path),
            ClientStrategy::FoundryV1 => format!("{}/openai/v1/{}", self.base_url, path),
        }
    }

    /// Authentication header name and value
    pub fn auth_header(&self) -> (&'static str, String) {
        match self.strategy {
            ClientStrategy::OpenAiCompatible => {
                ("Authorization", format!("Bearer {}", self.api_key))
            }
            ClientStrategy::AzureDeployment | ClientStrategy::FoundryV1 => {
                ("api-key", self.api_key.clone())
            }
        }
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self.strategy {
            ClientStrategy::AzureDeployment => vec![("api-version", self.api_version.clone())],
            _ => Vec::new(),
        }
    }

    /// Whether the request body must name the model.
    ///
    /// Deployment-scoped Azure routes carry it in the path instead.
    pub fn model_in_body(&self, route: &ApiRoute) -> bool {
        !(self.strategy == ClientStrategy::AzureDeployment && route.is_deployment_scoped())
    }

    /// Addressed and authenticated request builder for `route`
    pub fn request(
        &self,
        client: &reqwest::Client,
        method: reqwest::Method,
        route: &ApiRoute,
        model: &str,
    ) -> reqwest::RequestBuilder {
        let url = self.endpoint_url(route, model);
        tracing::trace!("🔵 {} {} {}", self.strategy, method, url);
        let (header, value) = self.auth_header();
        client
            .request(method, url)
            .header(header, value)
            .query(&self.query_params())
    }

    /// Sends `request` and maps transport failures and non-2xx statuses
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, LlmError> {
        let response = request.send().await.map_err(|e| {
            tracing::debug!("❌ {} request failed before a response: {}", self.strategy, e);
            LlmError::Network {
                message: format!("request to {} failed", self.base_url),
                source: e,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::debug!("❌ {} returned {}: {}", self.strategy, status, body);
            return Err(LlmError::Http {
                provider: self.strategy.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Sends `request` and parses a JSON body
    pub async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, LlmError> {
        let response = self.send(request).await?;
        let text = response.text().await.map_err(|e| LlmError::Network {
            message: "failed to read response body".to_string(),
            source: e,
        })?;
        tracing::trace!("🔵 raw response: {}", text);
        serde_json::from_str(&text).map_err(|e| LlmError::Serialization {
            message: format!("failed to parse JSON response: {}", e),
        })
    }
}

/// Trims trailing slashes and any API suffix the strategy appends itself
fn normalize_endpoint(strategy: ClientStrategy, endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let stripped = match strategy {
        ClientStrategy::FoundryV1 => trimmed.strip_suffix("/openai/v1").unwrap_or(trimmed),
        ClientStrategy::AzureDeployment => trimmed.strip_suffix("/openai").unwrap_or(trimmed),
        ClientStrategy::OpenAiCompatible => trimmed,
    };
    stripped.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(strategy: ClientStrategy, endpoint: &str) -> Connection {
        Connection::new(strategy, endpoint, "secret-key-123", "2024-10-21")
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "openai-compatible".parse::<ClientStrategy>().unwrap(),
            ClientStrategy::OpenAiCompatible
        );
        assert_eq!(
            "Azure-Deployment".parse::<ClientStrategy>().unwrap(),
            ClientStrategy::AzureDeployment
        );
        assert_eq!(
            "foundry-v1".parse::<ClientStrategy>().unwrap(),
            ClientStrategy::FoundryV1
        );
        assert!(matches!(
            "bedrock".parse::<ClientStrategy>(),
            Err(ConfigError::Validation(_))
        ));

        for strategy in ClientStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<ClientStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_openai_compatible_urls() {
        let conn = connection(ClientStrategy::OpenAiCompatible, "https://host.example/v1/");
        assert_eq!(
            conn.endpoint_url(&ApiRoute::ChatCompletions, "gpt"),
            "https://host.example/v1/chat/completions"
        );
        assert_eq!(
            conn.auth_header(),
            ("Authorization", "Bearer secret-key-123".to_string())
        );
        assert!(conn.query_params().is_empty());
        assert!(conn.model_in_body(&ApiRoute::ChatCompletions));
    }

    #[test]
    fn test_azure_deployment_urls() {
        let conn = connection(ClientStrategy::AzureDeployment, "https://res.openai.azure.com");
        assert_eq!(
            conn.endpoint_url(&ApiRoute::ChatCompletions, "gpt-5.2-chat"),
            "https://res.openai.azure.com/openai/deployments/gpt-5.2-chat/chat/completions"
        );
        assert_eq!(
            conn.endpoint_url(&ApiRoute::ImageGenerations, "img"),
            "https://res.openai.azure.com/openai/deployments/img/images/generations"
        );
        assert_eq!(
            conn.endpoint_url(&ApiRoute::Video("v1".to_string()), "sora"),
            "https://res.openai.azure.com/openai/videos/v1"
        );
        assert_eq!(conn.auth_header().0, "api-key");
        assert_eq!(
            conn.query_params(),
            vec![("api-version", "2024-10-21".to_string())]
        );
        assert!(!conn.model_in_body(&ApiRoute::ChatCompletions));
        assert!(conn.model_in_body(&ApiRoute::Responses));
    }

    #[test]
    fn test_foundry_v1_normalizes_suffix() {
        for endpoint in [
            "https://res.openai.azure.com",
            "https://res.openai.azure.com/",
            "https://res.openai.azure.com/openai/v1/",
        ] {
            let conn = connection(ClientStrategy::FoundryV1, endpoint);
            assert_eq!(conn.base_url(), "https://res.openai.azure.com");
            assert_eq!(
                conn.endpoint_url(&ApiRoute::VideoContent("abc".to_string()), "sora-2"),
                "https://res.openai.azure.com/openai/v1/videos/abc/content"
            );
        }
    }

    #[test]
    fn test_debug_masks_key() {
        let conn = connection(ClientStrategy::FoundryV1, "https://res");
        let rendered = format!("{:?}", conn);
        assert!(!rendered.contains("secret-key-123"));
    }
}
