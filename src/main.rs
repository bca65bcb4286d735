//! Troupe CLI — wire collaborators into an engine, load the cast, and run
//! until interrupted.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use troupe_core::config::EngineConfig;
use troupe_engine::{Clock, Engine};

#[derive(Parser)]
#[command(
    name = "troupe",
    version,
    about = "Run a cast of autonomous social agents"
)]
struct Cli {
    /// Engine config path (defaults to ~/.troupe/config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Agents directory override.
    #[arg(long)]
    agents: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path).context("loading engine config")?,
        None => EngineConfig::load().context("loading engine config")?,
    };

    let agents_dir = cli
        .agents
        .unwrap_or_else(|| PathBuf::from(&config.agents_dir));

    let default_provider =
        troupe_providers::create_provider(&config.llm).context("creating LLM provider")?;
    let named_providers = troupe_providers::provider_registry(&config.llm);
    let posting =
        troupe_channels::create_posting_client(&config.channel).context("creating feed client")?;
    let memory = troupe_memory::create_memory(&config.memory).context("opening memory store")?;

    tracing::info!(
        "Provider: {} · channel: {} · memory: {}",
        default_provider.name(),
        config.channel.mode,
        memory.name()
    );

    let engine = Engine::new(
        config,
        default_provider,
        named_providers,
        posting,
        memory,
        Clock::system(),
    );

    let loaded = engine
        .load_agents(&agents_dir)
        .await
        .context("loading agent definitions")?;
    if loaded == 0 {
        tracing::warn!("No agent definitions found in {}", agents_dir.display());
    }

    engine.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Interrupt received, shutting down");
    engine.stop().await;
    Ok(())
}
