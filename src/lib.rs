//! Probe an Azure AI Foundry or OpenAI-compatible inference endpoint.
//!
//! foundry-probe runs an ordered list of named checks against a hosted
//! model endpoint: plain generation, multi-turn chat, streaming, tool
//! calling, a secondary model, the Responses API, image generation and
//! asynchronous video generation. Each check is isolated from the others
//! and the run ends with a pass/fail/skip summary.
//!
//! # Quick Start
//!
//! ```no_run
//! use foundry_probe::checks::{build_suite, CheckContext};
//! use foundry_probe::config::HarnessConfig;
//! use foundry_probe::harness::{Harness, Reporter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarnessConfig::from_env()?;
//!     config.validate()?;
//!
//!     let timeout = config.test_timeout;
//!     let ctx = Arc::new(CheckContext::from_config(config)?);
//!     let suite = build_suite(ctx, &[])?;
//!
//!     let summary = Harness::new(timeout, Reporter::stdio(true))
//!         .run_all(suite)
//!         .await;
//!     std::process::exit(summary.exit_code(false).into());
//! }
//! ```
//!
//! # Client strategies
//!
//! The same OpenAI-compatible wire format is addressed three ways, selected
//! by [`ClientStrategy`]:
//!
//! - `openai-compatible` - Bearer token, `{endpoint}/{route}`
//! - `azure-deployment` - `api-key` header, deployment-scoped routes and an
//!   `api-version` query parameter
//! - `foundry-v1` - `api-key` header, `{endpoint}/openai/v1/{route}`
//!
//! # Modules
//!
//! - [`harness`] - Sequential test runner and report
//! - [`checks`] - The concrete checks run by the binary
//! - [`config`] - [`HarnessConfig`] loading and validation
//! - [`llm`] - Provider trait, HTTP client and SSE decoding
//! - [`tools`] / [`agent`] - Schema-validated tools and the bounded tool loop
//! - [`media`] - Image and video generation clients

pub mod agent;
pub mod checks;
pub mod config;
pub mod error;
pub mod harness;
pub mod llm;
pub mod media;
pub mod tools;
pub mod utils;

pub use config::{ConfigError, HarnessConfig};
pub use error::FailureReport;
pub use harness::{Harness, Outcome, RunSummary, TestCase, TestResult, TestSuite};
pub use llm::{ClientStrategy, LlmError, LlmProvider};
