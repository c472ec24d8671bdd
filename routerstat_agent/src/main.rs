//! Entry point for routerstat_agent.

use anyhow::{Context, Result};
use clap::Parser;
use routerstat_agent::config::CliArgs;
use routerstat_agent::{server, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting routerstat_agent v{}", env!("CARGO_PKG_VERSION"));

    let config = args.resolve().context("Failed to load configuration")?;
    info!(
        interface = %config.interface,
        interval_ms = config.interval_ms,
        proc_root = %config.proc_root.display(),
        "configuration loaded"
    );
    if !config.proc_root.join("net/dev").exists() {
        warn!(
            "{} not found; every tick will be skipped until it appears",
            config.proc_root.join("net/dev").display()
        );
    }

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    let state = AppState::procfs(config);
    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
