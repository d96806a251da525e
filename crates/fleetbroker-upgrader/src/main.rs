//! upgrade-all: upgrade every instance of a service offering.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleetbroker_clients::{BrokerClient, RegistryClient};
use fleetbroker_upgrader::{Args, FleetUpgradeScheduler, SchedulerConfig, UpgraderConfig};

fn main() {
    let args = Args::parse();

    // Sweep log goes to stdout; tracing goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetbroker=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "upgrade-all failed");
            println!("[upgrade-all] error: {}", e);
            1
        }
    };
    process::exit(code);
}

fn run(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let config = UpgraderConfig::try_from(args)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("[upgrade-all] Received signal, finishing the current instance");
        flag.store(true, Ordering::SeqCst);
    })?;

    let registry = RegistryClient::new(
        &config.registry_url,
        &config.registry_token,
        config.request_timeout,
    )?;
    let broker = BrokerClient::new(
        &config.broker_url,
        &config.broker_username,
        &config.broker_password,
        config.request_timeout,
    )?;

    let scheduler = FleetUpgradeScheduler::new(
        Arc::new(registry),
        Arc::new(broker),
        SchedulerConfig::from(&config),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    info!(offering_id = %config.service_offering_id, "Starting upgrade-all");
    let counters = runtime.block_on(scheduler.run(&shutdown))?;

    println!("{}", counters);
    Ok(counters.exit_code())
}
