//! Base Image Agent
//!
//! Audits deployed services' base images against the container catalog and
//! triggers upgrade pipelines for outdated ones.

use agent_common::AgentConfig;
use anyhow::Result;
use base_image_agent::BaseImageAgent;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "base-image-agent")]
#[command(about = "Base image compliance audit and remediation agent")]
struct Cli {
    /// Telemetry export (OTLP JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Branch remediation pipelines run on (defaults to PIPELINE_BRANCH)
    #[arg(short, long)]
    branch: Option<String>,

    /// Trigger pipelines for real instead of a dry run
    #[arg(short, long)]
    trigger: bool,

    /// Path to a .env file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only audit services on this platform (overrides TARGET_PLATFORM)
    #[arg(long)]
    platform: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.to_lowercase().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Base Image Agent");

    // Load configuration
    let mut config = AgentConfig::from_env(cli.config.as_deref())?;
    if let Some(platform) = &cli.platform {
        config.discovery.target_platform = platform.to_lowercase();
    }

    let dry_run = config.dry_run && !cli.trigger;
    let branch = cli
        .branch
        .clone()
        .unwrap_or_else(|| config.pipeline_branch.clone());

    info!("Configuration loaded");
    info!("  GitLab: {}", config.gitlab.base_url());
    info!("  Catalog: {}", config.compliance.catalog_api_url);
    info!("  Output: {}", config.output_dir.display());
    info!("  Branch: {}", branch);
    info!("  Dry run: {}", dry_run);

    let mut agent = BaseImageAgent::from_config(&config, &branch, dry_run)?;

    match agent.run_file(&cli.input).await? {
        Some(run) => {
            info!("JSON report written to {}", run.json_path.display());
            info!("CSV report written to {}", run.csv_path.display());
        }
        None => warn!("Nothing to audit in {}", cli.input.display()),
    }

    Ok(())
}
