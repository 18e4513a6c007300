//! canon-ssdp daemon
//!
//! Runs a configured command whenever a known device (typically a Canon
//! camera looking for a PTP/IP host) announces itself over SSDP, and
//! advertises this host as a UPnP device so the camera can find it.
//!
//! ## Startup
//!
//! 1. Parse options and environment settings
//! 2. Load the device configuration (fatal on error)
//! 3. Resolve the interface, create or load the device description
//! 4. Start the description server, self advertisement and discovery
//! 5. Run the dispatcher until Ctrl-C

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use canon_ssdpd::advertiser::{AdvertiserConfig, SelfAdvertiser};
use canon_ssdpd::cli::Cli;
use canon_ssdpd::config::Config;
use canon_ssdpd::description::{self, DESCRIPTION_HTTP_PATH};
use canon_ssdpd::discovery::{DiscoveryListener, ListenerConfig};
use canon_ssdpd::{net, ActionDispatcher, CommandLauncher, DeviceRegistry};

/// Announcements buffered between discovery and the dispatcher.
const ANNOUNCEMENT_QUEUE: usize = 64;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    match run(cli, config).await {
        Ok(()) => {
            info!("canon-ssdp shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "canon-ssdp failed");
            for cause in e.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    info!(
        config_file = %cli.config.display(),
        interface = ?cli.interface,
        "Starting canon-ssdp"
    );

    let registry = DeviceRegistry::load(&cli.config)
        .with_context(|| format!("Error loading config file {}", cli.config.display()))?;
    if registry.is_empty() {
        warn!("No complete device sections configured");
    }
    info!(devices = registry.len(), "Device configuration loaded");

    let interface = net::resolve_interface(cli.interface.as_deref())?;
    info!(interface = %interface.name, addr = %interface.addr, "Using interface");

    let description = description::ensure(&config.description_file).with_context(|| {
        format!(
            "Error creating the device description {}",
            config.description_file.display()
        )
    })?;
    info!(udn = %description.udn, "Device description ready");

    let http = TcpListener::bind((interface.addr, config.http_port))
        .await
        .context("Failed to bind the description server")?;
    let location = format!("http://{}{}", http.local_addr()?, DESCRIPTION_HTTP_PATH);

    let discovery = DiscoveryListener::new(
        net::multicast_socket(interface.addr).context("Failed to create the SSDP listener socket")?,
        net::unicast_socket(interface.addr)
            .await
            .context("Failed to create the SSDP search socket")?,
        ListenerConfig {
            search_target: config.search_target.clone(),
            search_interval: config.search_interval(),
        },
    );

    let advertiser = SelfAdvertiser::new(
        net::multicast_socket(interface.addr).context("Failed to create the SSDP advertiser socket")?,
        &description.udn,
        location,
        AdvertiserConfig {
            server_id: config.server_id.clone(),
            max_age: config.max_age_secs,
            announce_interval: config.announce_interval(),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (announcement_tx, announcement_rx) = mpsc::channel(ANNOUNCEMENT_QUEUE);

    let http_handle = tokio::spawn(description::serve(
        http,
        Arc::from(description.document.as_str()),
        shutdown_rx.clone(),
    ));
    let advertiser_handle = tokio::spawn(advertiser.run(shutdown_rx.clone()));
    let discovery_handle = tokio::spawn(discovery.run(announcement_tx, shutdown_rx.clone()));

    let mut dispatcher = ActionDispatcher::new(registry, Arc::new(CommandLauncher));
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = dispatcher.run(announcement_rx, shutdown_rx) => {
            warn!("Dispatcher stopped");
        }
    }

    // Running actions are left alone
    let _ = shutdown_tx.send(true);

    let mut failure = None;
    for (name, handle) in [
        ("discovery", discovery_handle),
        ("advertiser", advertiser_handle),
        ("description server", http_handle),
    ] {
        match handle.await {
            Ok(Ok(())) => info!(task = name, "Task exited normally"),
            Ok(Err(e)) => {
                error!(task = name, error = %e, "Task failed");
                failure.get_or_insert(anyhow::Error::new(e).context(format!("{name} failed")));
            }
            Err(e) => error!(task = name, error = %e, "Task panicked"),
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
