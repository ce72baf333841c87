//! node-agent
//!
//! Per-node control agent. Requests arrive as length-prefixed JSON on stdin;
//! responses and heartbeats leave the same way on stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use node_agent::action::ActionRegistry;
use node_agent::agent::Agent;
use node_agent::apply_spec::SpecStore;
use node_agent::config::Settings;
use node_agent::mbus::StdioHandler;
use node_agent::platform::HostStatsCollector;
use node_agent::task::TaskRegistry;

#[derive(Parser, Debug)]
#[command(name = "node-agent")]
#[command(about = "Per-node control agent: runs bus commands and emits heartbeats")]
struct Args {
    /// Settings JSON file (defaults to the NODE_AGENT_SETTINGS env var)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the heartbeat interval from settings, in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for the bus protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = match &args.settings {
        Some(path) => Settings::from_file(path),
        None => Settings::from_env(),
    }
    .context("Failed to load settings")?;

    info!(agent_id = %settings.agent_id, "Loaded settings");

    let heartbeat_interval = args
        .heartbeat_interval
        .map_or_else(|| settings.heartbeat_interval(), Duration::from_secs);

    let settings = Arc::new(settings);
    let tasks = Arc::new(TaskRegistry::new());
    let specs = Arc::new(SpecStore::new());
    let actions = ActionRegistry::with_defaults(
        Arc::clone(&settings),
        tasks.clone(),
        Arc::clone(&specs),
    );
    info!(methods = ?actions.methods(), "Registered actions");

    let handler = Arc::new(StdioHandler::stdio());
    let agent = Agent::new(
        settings,
        handler.clone(),
        Arc::new(HostStatsCollector::new()),
        tasks,
        Arc::new(actions),
        specs,
    )
    .with_heartbeat_interval(heartbeat_interval);

    agent.run()?;

    tokio::select! {
        () = handler.closed() => info!("Bus closed, shutting down"),
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for shutdown signal")?;
            info!("Interrupted, shutting down");
        }
    }

    agent.stop();
    Ok(())
}
