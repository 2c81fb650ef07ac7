//! testsmith - synthesize and verify pytest tests for Python sources
//!
//! ## Commands
//!
//! - `generate`: one candidate test per function, no execution
//! - `verify`: generate, run in a sandbox and regenerate until each test passes
//! - `classify`: classify captured pytest output

mod source;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use testsmith_core::{classify, GeneratorAdapter, SynthConfig, Synthesizer};
use testsmith_llm::AnthropicClient;
use testsmith_sandbox::PytestSandbox;

#[derive(Parser)]
#[command(name = "testsmith")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Synthesize and verify pytest tests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "TESTSMITH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one candidate test per function without running it
    Generate {
        /// Source file path, or github:owner/repo:path[@ref]
        source: String,
    },

    /// Generate tests and regenerate until they pass
    Verify {
        /// Source file path, or github:owner/repo:path[@ref]
        source: String,

        /// Attempts per function (overrides configuration)
        #[arg(short, long)]
        max_attempts: Option<u32>,

        /// Functions verified at the same time (overrides configuration)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Classify pytest output read from a file or stdin
    Classify {
        /// File with captured output (default: stdin)
        path: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct VerifySummary<'a> {
    verdicts: &'a [testsmith_core::UnitVerdict],
    succeeded: usize,
    failed: usize,
    input_tokens: u64,
    output_tokens: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    testsmith_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Generate { source } => cmd_generate(cli.config.as_deref(), &source).await,
        Commands::Verify {
            source,
            max_attempts,
            concurrency,
        } => cmd_verify(cli.config.as_deref(), &source, max_attempts, concurrency).await,
        Commands::Classify { path } => cmd_classify(path.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<SynthConfig> {
    let base = match path {
        Some(path) => SynthConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SynthConfig::default(),
    };
    base.with_env_overrides(|key| std::env::var(key).ok())
        .context("Invalid environment configuration")
}

fn build_synthesizer(config: &SynthConfig) -> Result<Synthesizer> {
    let client = AnthropicClient::new(config.llm.clone()).context("Failed to build LLM client")?;
    if !client.is_configured() {
        tracing::warn!("ANTHROPIC_API_KEY is not set; every function will fail with GeneratorUnavailable");
    }
    Ok(Synthesizer::new(
        Arc::new(GeneratorAdapter::new(client)),
        Arc::new(PytestSandbox::from_settings(&config.sandbox)),
    )
    .with_policy(config.policy.clone())
    .with_execution_timeout(config.execution_timeout()))
}

async fn read_source(location: &str) -> Result<String> {
    source::fetch_source(location)
        .await
        .with_context(|| format!("Failed to fetch source {}", location))
}

async fn cmd_generate(config: Option<&Path>, location: &str) -> Result<()> {
    let config = load_config(config)?;
    let text = read_source(location).await?;
    let synthesizer = build_synthesizer(&config)?;

    let tests = synthesizer.synthesize_once(&text).await?;
    info!(functions = tests.len(), "generation finished");
    println!("{}", serde_json::to_string_pretty(&tests)?);
    Ok(())
}

async fn cmd_verify(
    config: Option<&Path>,
    location: &str,
    max_attempts: Option<u32>,
    concurrency: Option<usize>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(max_attempts) = max_attempts {
        config.policy.max_attempts = max_attempts;
    }
    if let Some(concurrency) = concurrency {
        config.policy.max_concurrent_units = concurrency;
    }
    config.validate()?;

    let text = read_source(location).await?;
    let synthesizer = build_synthesizer(&config)?;
    let verdicts = synthesizer.verify(&text).await?;

    let succeeded = verdicts.iter().filter(|v| v.is_success()).count();
    let summary = VerifySummary {
        verdicts: &verdicts,
        succeeded,
        failed: verdicts.len() - succeeded,
        input_tokens: verdicts.iter().map(|v| v.input_tokens).sum(),
        output_tokens: verdicts.iter().map(|v| v.output_tokens).sum(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.failed > 0 {
        anyhow::bail!("{} of {} functions have no passing test", summary.failed, verdicts.len());
    }
    Ok(())
}

fn cmd_classify(path: Option<&Path>) -> Result<()> {
    let output = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    println!("{}", serde_json::to_string_pretty(&classify(&output))?);
    Ok(())
}
