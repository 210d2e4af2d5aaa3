//! foundry-probe - run the endpoint checks and report.
//!
//! Exit status: 0 when no check failed, 1 when at least one did, 2 when the
//! configuration is unusable and nothing ran.

use clap::Parser;
use colored::Colorize;
use foundry_probe::checks::{build_suite, unknown_checks, CheckContext};
use foundry_probe::config::{ConfigError, HarnessConfig};
use foundry_probe::harness::{Harness, Reporter};
use foundry_probe::llm::ClientStrategy;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "foundry-probe")]
#[command(version, about = "Probe an Azure AI Foundry / OpenAI-compatible endpoint")]
struct Cli {
    /// How requests are addressed and authenticated
    /// (openai-compatible, azure-deployment, foundry-v1)
    #[arg(long)]
    strategy: Option<ClientStrategy>,

    /// Run only the named check; repeat to select several
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,

    /// Per-test deadline in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// TOML configuration file; FOUNDRY_* variables still take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exit 0 after a run even when checks failed
    #[arg(long)]
    lenient: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log at debug level (overrides RUST_LOG)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Configuration error:".bright_red().bold(), e);
            eprintln!(
                "{}",
                "Set FOUNDRY_ENDPOINT and FOUNDRY_API_KEY (a .env file works too).".dimmed()
            );
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    tracing::debug!("resolved configuration: {:?}", config);

    let color = !cli.no_color;
    print_banner(&config, color);

    let test_timeout = config.test_timeout;
    let reporter = Reporter::stdio(color).with_secret(config.api_key.clone());
    let ctx = match CheckContext::from_config(config) {
        Ok(ctx) => Arc::new(ctx.with_output(reporter.output())),
        Err(e) => {
            eprintln!("{} {:#}", "Setup error:".bright_red().bold(), e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let suite = match build_suite(ctx, &cli.only) {
        Ok(suite) => suite,
        Err(e) => {
            eprintln!("{} {}", "Setup error:".bright_red().bold(), e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let mut harness = Harness::new(test_timeout, reporter).with_cancellation(cancel);
    let summary = harness.run_all(suite).await;

    ExitCode::from(summary.exit_code(cli.lenient))
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Defaults, then the TOML file, then the environment, then CLI flags
fn load_config(cli: &Cli) -> Result<HarnessConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)?.merge_with_env()?,
        None => HarnessConfig::from_env()?,
    };

    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(secs) = cli.timeout {
        config.test_timeout = Duration::from_secs(secs);
    }

    let unknown = unknown_checks(&cli.only);
    if !unknown.is_empty() {
        return Err(ConfigError::Validation(format!(
            "unknown check name(s): {}",
            unknown.join(", ")
        )));
    }

    config.validate()?;
    Ok(config)
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("⛔ Ctrl+C received, cancelling remaining tests");
                cancel.cancel();
            }
            Err(e) => tracing::error!("❌ unable to listen for Ctrl+C: {}", e),
        }
    });
}

fn print_banner(config: &HarnessConfig, color: bool) {
    let title = "Foundry Probe";
    let rule = "=".repeat(60);
    println!("{}", rule);
    if color {
        println!("{}", title.bright_cyan().bold());
    } else {
        println!("{}", title);
    }
    println!("{}", rule);
    println!("Endpoint: {}", config.endpoint);
    println!("Strategy: {}", config.strategy);
    println!("Model:    {}", config.primary_model);
}
