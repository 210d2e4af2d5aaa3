//! Harness configuration.
//!
//! A single [`HarnessConfig`] is built in `main` from defaults, an optional
//! TOML file and `FOUNDRY_*` environment variables (environment wins), then
//! validated before any test runs. Nothing reads the environment afterwards.

use crate::llm::strategy::{ClientStrategy, Connection};
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

pub const ENV_ENDPOINT: &str = "FOUNDRY_ENDPOINT";
pub const ENV_API_KEY: &str = "FOUNDRY_API_KEY";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent or empty
    #[error("Missing required setting: {0}")]
    Missing(String),
    #[error("Environment variable parsing error: {0}")]
    EnvVarParse(String),
    #[error("File parsing error: {0}")]
    FileParse(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the checks and collaborators need, resolved once
#[derive(Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Base URL of the inference resource
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Model (or deployment) used by the core chat checks
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub secondary_model: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub responses_model: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub image_model: Option<String>,
    /// Image generation is often hosted on a separate resource
    #[serde(default, deserialize_with = "blank_as_none")]
    pub image_endpoint: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub video_model: Option<String>,
    #[serde(default, with = "strategy_name")]
    pub strategy: ClientStrategy,
    /// Only sent by the `azure-deployment` strategy
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Deadline for one test action
    #[serde(with = "duration_seconds", default = "default_test_timeout")]
    pub test_timeout: Duration,
    /// Deadline for one HTTP request
    #[serde(with = "duration_seconds", default = "default_request_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_max_tool_steps")]
    pub max_tool_steps: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Where generated images and videos are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(with = "duration_seconds", default = "default_video_poll_interval")]
    pub video_poll_interval: Duration,
    /// Deadline for the video check, which outlives ordinary tests
    #[serde(with = "duration_seconds", default = "default_video_timeout")]
    pub video_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            primary_model: default_primary_model(),
            secondary_model: None,
            responses_model: None,
            image_model: None,
            image_endpoint: None,
            video_model: None,
            strategy: ClientStrategy::default(),
            api_version: default_api_version(),
            test_timeout: default_test_timeout(),
            request_timeout: default_request_timeout(),
            max_tool_steps: default_max_tool_steps(),
            max_tokens: default_max_tokens(),
            output_dir: default_output_dir(),
            video_poll_interval: default_video_poll_interval(),
            video_timeout: default_video_timeout(),
        }
    }
}

impl fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("endpoint", &self.endpoint)
            .field(
                "api_key",
                &crate::utils::logging::obscure_credential(&self.api_key),
            )
            .field("primary_model", &self.primary_model)
            .field("secondary_model", &self.secondary_model)
            .field("responses_model", &self.responses_model)
            .field("image_model", &self.image_model)
            .field("image_endpoint", &self.image_endpoint)
            .field("video_model", &self.video_model)
            .field("strategy", &self.strategy)
            .field("api_version", &self.api_version)
            .field("test_timeout", &self.test_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_tool_steps", &self.max_tool_steps)
            .field("max_tokens", &self.max_tokens)
            .field("output_dir", &self.output_dir)
            .field("video_poll_interval", &self.video_poll_interval)
            .field("video_timeout", &self.video_timeout)
            .finish()
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            _ => Err(ConfigError::FileParse(format!(
                "unsupported file format for {}, use .toml",
                path.display()
            ))),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Defaults overridden by whatever `lookup` resolves
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().apply_overrides(lookup)
    }

    /// Merge configuration with environment variable overrides
    pub fn merge_with_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(env_lookup)
    }

    /// Applies every variable `lookup` resolves to a non-empty value
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(api_key) = get(ENV_API_KEY) {
            self.api_key = api_key;
        }
        if let Some(model) = get("FOUNDRY_MODEL") {
            self.primary_model = model;
        }
        if let Some(model) = get("FOUNDRY_SECONDARY_MODEL") {
            self.secondary_model = Some(model);
        }
        if let Some(model) = get("FOUNDRY_RESPONSES_MODEL") {
            self.responses_model = Some(model);
        }
        if let Some(model) = get("FOUNDRY_IMAGE_MODEL") {
            self.image_model = Some(model);
        }
        if let Some(endpoint) = get("FOUNDRY_IMAGE_ENDPOINT") {
            self.image_endpoint = Some(endpoint);
        }
        if let Some(model) = get("FOUNDRY_VIDEO_MODEL") {
            self.video_model = Some(model);
        }
        if let Some(strategy) = get("FOUNDRY_CLIENT_STRATEGY") {
            self.strategy = ClientStrategy::from_str(&strategy).map_err(|e| {
                ConfigError::EnvVarParse(format!("FOUNDRY_CLIENT_STRATEGY: {}", e))
            })?;
        }
        if let Some(version) = get("FOUNDRY_API_VERSION") {
            self.api_version = version;
        }
        if let Some(secs) = get("FOUNDRY_TEST_TIMEOUT_SECS") {
            self.test_timeout = parse_secs("FOUNDRY_TEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = get("FOUNDRY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = parse_secs("FOUNDRY_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(steps) = get("FOUNDRY_MAX_TOOL_STEPS") {
            self.max_tool_steps = parse_value("FOUNDRY_MAX_TOOL_STEPS", &steps)?;
        }
        if let Some(tokens) = get("FOUNDRY_MAX_TOKENS") {
            self.max_tokens = parse_value("FOUNDRY_MAX_TOKENS", &tokens)?;
        }
        if let Some(dir) = get("FOUNDRY_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(secs) = get("FOUNDRY_VIDEO_POLL_SECS") {
            self.video_poll_interval = parse_secs("FOUNDRY_VIDEO_POLL_SECS", &secs)?;
        }
        if let Some(secs) = get("FOUNDRY_VIDEO_TIMEOUT_SECS") {
            self.video_timeout = parse_secs("FOUNDRY_VIDEO_TIMEOUT_SECS", &secs)?;
        }

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_ENDPOINT.to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_API_KEY.to_string()));
        }
        if self.primary_model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Primary model cannot be empty".to_string(),
            ));
        }
        if self.test_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "Test timeout must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.video_timeout.is_zero() || self.video_poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "Video timeout and poll interval must be greater than 0".to_string(),
            ));
        }
        if self.max_tool_steps == 0 {
            return Err(ConfigError::Validation(
                "Max tool steps must be at least 1".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "Max tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Connection for the chat, responses and video routes
    pub fn connection(&self) -> Connection {
        Connection::new(
            self.strategy,
            &self.endpoint,
            self.api_key.clone(),
            self.api_version.clone(),
        )
    }

    /// Connection for image generation, honoring `image_endpoint`
    pub fn image_connection(&self) -> Connection {
        let endpoint = self.image_endpoint.as_deref().unwrap_or(&self.endpoint);
        Connection::new(
            self.strategy,
            endpoint,
            self.api_key.clone(),
            self.api_version.clone(),
        )
    }
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::EnvVarParse(format!("{}: {}", key, e)))
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    parse_value::<u64>(key, raw).map(Duration::from_secs)
}

/// Custom serialization for Duration as seconds
mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// An empty or whitespace-only value means the setting is not configured
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Strategy names as they appear on the command line
mod strategy_name {
    use crate::llm::strategy::ClientStrategy;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(strategy: &ClientStrategy, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(strategy.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ClientStrategy, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(D::Error::custom)
    }
}

fn default_primary_model() -> String {
    "gpt-5.2-chat".to_string()
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_test_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_tool_steps() -> u32 {
    5
}

fn default_max_tokens() -> u32 {
    256
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_video_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_video_timeout() -> Duration {
    Duration::from_secs(600)
}
