//! Minimal game server wired to the Agones sidecar.
//!
//! Connects, logs every GameServer update, marks itself Ready and keeps the
//! heartbeat going until Ctrl-C (or `--run-secs`), then asks for shutdown.
//!
//! ```text
//! cargo run --example game_server -- --endpoint http://localhost:9357
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agones_sdk::{SdkClient, SdkConfig, SdkEvent};

#[derive(Parser, Debug)]
#[command(name = "game-server")]
#[command(about = "Example game server using the Agones sidecar")]
struct Cli {
    /// Sidecar endpoint; defaults to the address the sidecar injects into the environment
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Optional TOML file with a full SDK configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Heartbeat period in milliseconds
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Stop after this many seconds (0 = wait for Ctrl-C)
    #[arg(long, default_value_t = 0)]
    run_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(cli: &Cli) -> anyhow::Result<SdkConfig> {
    let mut config: SdkConfig = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {path:?}"))?;
            toml::from_str(&raw).with_context(|| format!("failed to parse {path:?}"))?
        }
        None => SdkConfig::from_env(),
    };

    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(period) = cli.heartbeat_ms {
        config.heartbeat.period_ms = period;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();

    let config = load_config(&cli)?;
    info!("Using Agones sidecar at {}", config.endpoint);

    let client = SdkClient::from_config(config).with_event_hook(|event| {
        if let SdkEvent::Reconnected { stream, .. } = event {
            warn!("{} stream came back, updates may have been missed", stream);
        }
    });

    client.connect().await?;
    client.register_listener(|gs| {
        info!(
            "Game server update: name={} phase={} address={}",
            gs.name, gs.phase, gs.address
        );
        Ok(())
    })?;

    client.mark_ready().await?;
    info!("Marked Ready, heartbeat running");

    if cli.run_secs == 0 {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C");
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.run_secs)) => {}
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        }
    }

    if let Err(e) = client.request_shutdown().await {
        warn!("Shutdown request failed: {}", e);
    }
    client.close().await;
    Ok(())
}
