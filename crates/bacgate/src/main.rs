//! bacgate daemon
//!
//! Spawned as an Erlang port: stdin/stdout carry the control channel, so
//! human-readable logs go to stderr only.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::Serialized;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bacgate::GatewayConfig;
use bacgate::device::Registry;
use bacgate::dispatch::Dispatcher;
use bacgate::field::{FieldService, FieldSocket, spawn_listener};
use bacgate::port::{Notifier, Outbound, Port, PortLogLayer, spawn_heartbeat};

/// How long runtime shutdown waits for blocked stdin reads
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Routed BACnet/IP gateway driven over an Erlang port
#[derive(Parser, Debug, Serialize)]
#[command(name = "bacgate")]
#[command(about = "Routed BACnet/IP gateway driven over an Erlang port", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    #[serde(skip)]
    config: Option<PathBuf>,

    /// Address the BACnet/IP socket binds to
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    interface: Option<IpAddr>,

    /// BACnet/IP UDP port
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,

    /// Network number of the virtual network
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    network_id: Option<u16>,
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?;
    let result = runtime.block_on(async_main());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn async_main() -> Result<()> {
    let log_layer = PortLogLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bacgate=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(log_layer.clone())
        .init();

    let args = Args::parse();
    info!("Starting bacgate v{}", env!("CARGO_PKG_VERSION"));

    let figment = GatewayConfig::figment(args.config.as_deref())?.merge(Serialized::defaults(&args));
    let config = GatewayConfig::extract(figment)?;
    info!(
        "Virtual network {} on {}:{}",
        config.network_id, config.interface, config.port
    );

    let socket = FieldSocket::bind(&config.listener_settings())
        .with_context(|| format!("Failed to bind {}:{}", config.interface, config.port))?;
    let registry = Registry::new(config.registry_settings(socket.link_address()?)).into_shared();

    let outbound = Outbound::new(tokio::io::stdout());
    let (notifier, forwarder) = Notifier::spawn(outbound.clone());
    log_layer.attach(notifier.clone());
    let heartbeat = spawn_heartbeat(outbound.clone(), config.heartbeat_period());

    let listener = spawn_listener(socket, FieldService::new(registry.clone()), notifier.clone())
        .context("Failed to start the field listener")?;

    let port = Port::new(
        tokio::io::stdin(),
        outbound,
        Dispatcher::new(registry),
        config.max_frame_len,
    );

    let result = tokio::select! {
        result = port.run() => result.context("Control channel failed"),
        _ = shutdown_signal() => Ok(()),
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }

    info!("Shutting down");
    log_layer.detach();
    if tokio::task::spawn_blocking(move || listener.stop()).await.is_err() {
        warn!("Field listener did not stop cleanly");
    }
    heartbeat.abort();
    drop(notifier);
    forwarder.abort();

    result
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
