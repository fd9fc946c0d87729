//! kubecheck - validate the Kubernetes manifests changed by a pull request
//!
//! Reads one GitHub webhook delivery (event name + JSON payload, as exposed to
//! GitHub Actions through `GITHUB_EVENT_NAME` / `GITHUB_EVENT_PATH`) and runs
//! the check-run pipeline for it:
//!
//! - `check_suite` (created / requested / rerequested): validate and report a check run
//! - `pull_request` (opened): request a check suite for the head commit
//! - anything else: ignored

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use kubecheck_core::{
    init_tracing, Event, ManifestConfig, Pipeline, RepositoryConfigSource, DEFAULT_CONCURRENCY,
    DEFAULT_CONFIG_PATH,
};
use kubecheck_github::{GitHubClient, GitHubConfig, DEFAULT_API_URL, DEFAULT_CHECK_NAME};

#[derive(Parser, Debug)]
#[command(name = "kubecheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kubernetes manifest validation for pull requests", long_about = None)]
struct Cli {
    /// GitHub token used for the REST API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub REST API root
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Name of the webhook event being handled
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    event_name: String,

    /// Path to the webhook payload (JSON)
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: PathBuf,

    /// Location of the validation config inside the repository
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config_path: String,

    /// Local config file used when the repository has none
    #[arg(long)]
    default_config: Option<PathBuf>,

    /// Name of the created check runs
    #[arg(long, default_value = DEFAULT_CHECK_NAME)]
    check_name: String,

    /// Maximum number of manifests fetched at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let event = load_event(&cli.event_name, &cli.event_path)?;
    let default_config = load_default_config(cli.default_config.as_deref(), &cli.config_path)?;
    let pipeline = build_pipeline(&cli, default_config)?;

    info!(event = %cli.event_name, "Handling event");
    pipeline.process(event).await;
    Ok(())
}

/// Decode the webhook payload stored at `path`.
fn load_event(event_name: &str, path: &Path) -> Result<Event> {
    let payload =
        std::fs::read(path).with_context(|| format!("Failed to read event payload {:?}", path))?;
    Event::from_webhook(event_name, &payload)
        .with_context(|| format!("Failed to decode {} event from {:?}", event_name, path))
}

/// Read the fallback configuration and reject it up front if it is unusable.
fn load_default_config(path: Option<&Path>, config_path: &str) -> Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read default config {:?}", path))?;
    ManifestConfig::from_yaml(config_path, &text)
        .with_context(|| format!("Invalid default config {:?}", path))?;
    Ok(Some(text))
}

fn build_pipeline(cli: &Cli, default_config: Option<String>) -> Result<Pipeline> {
    let mut config = GitHubConfig::new(&cli.api_url).with_check_name(&cli.check_name);
    if let Some(token) = &cli.github_token {
        config = config.with_token(token);
    }
    let github = Arc::new(GitHubClient::new(config).context("Failed to create GitHub client")?);

    let mut source = RepositoryConfigSource::new(github.clone()).with_path(cli.config_path.as_str());
    if let Some(text) = default_config {
        source = source.with_default(text);
    }

    Ok(Pipeline::new(github.clone(), github, Arc::new(source)).with_concurrency(cli.concurrency))
}
