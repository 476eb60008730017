//! portmgrd - port graph manager daemon
//!
//! Loads the static port configuration, mirrors port changes to the dataplane
//! work queue and polls OS link state until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dp_portmgrd::{
    DpReceiver, DpSender, OsLinkProbe, PortManager, PortRegistry, PortmgrConfig,
    DEFAULT_CONFIG_PATH,
};

#[derive(Debug, Parser)]
#[command(name = "portmgrd", version, about = "Dataplane port graph manager")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, overrides the config file (e.g. "debug")
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Initializes tracing. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))
}

/// Stands in for the dataplane: logs every work item it receives.
async fn run_dp_consumer(mut rx: DpReceiver) {
    while let Some(item) = rx.recv().await {
        info!("dataplane <- {}", item);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PortmgrConfig::load_or_default(&cli.config)?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level))?;

    info!("--- Starting portmgrd ---");
    // Loading ran before the subscriber existed, so report the source here.
    if cli.config.exists() {
        info!("Using configuration {}", cli.config.display());
    } else {
        info!("Config file {} not found, using defaults", cli.config.display());
    }
    config.validate()?;

    let (dp, dp_rx) = DpSender::channel();
    let consumer = tokio::spawn(run_dp_consumer(dp_rx));

    let mut registry =
        PortRegistry::with_config(config.zone_table()?, dp, config.registry_config())?;
    let added = config.apply_static_ports(&mut registry);
    info!("Added {} of {} static ports", added, config.ports.len());

    let mgr = PortManager::from_registry(registry);

    let ticker = if config.ticker.enabled {
        Some(mgr.spawn_link_ticker(Arc::new(OsLinkProbe), config.poll_interval()))
    } else {
        info!("Link ticker disabled");
        None
    };

    signal::ctrl_c().await.context("failed to wait for ctrl-c")?;
    info!("Shutting down");

    if let Some(ticker) = ticker {
        ticker.abort();
        let _ = ticker.await;
    }
    mgr.destroy_all();

    // The consumer drains until the last sender (inside the registry) is gone.
    drop(mgr);
    if let Err(e) = consumer.await {
        error!("Dataplane consumer failed: {}", e);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => {
            info!("portmgrd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("portmgrd error: {:#}", e);
            eprintln!("portmgrd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
