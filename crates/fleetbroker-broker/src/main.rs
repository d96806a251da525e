//! Fleetbroker service broker.

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetbroker_broker::{http, AppState, Config};

/// Fleetbroker service broker.
#[derive(Parser, Debug)]
#[command(name = "fleetbroker-broker", about = "Service broker backed by a deployment director")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, short)]
    config: Option<String>,

    /// HTTP server address (overrides the config file)
    #[arg(long)]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fleetbroker=info".parse()?))
        .with_target(true)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }

    let addr: SocketAddr = config.bind_addr.parse()?;
    let plans = config.service_catalog.plans.len();
    let offering = config.service_catalog.id.clone();

    let state = AppState::from_config(config)?;
    let router = http::create_router(state);

    info!(http_addr = %addr, offering = %offering, plans = plans, "Starting Fleetbroker broker");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
