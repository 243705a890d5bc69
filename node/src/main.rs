// Copyright (c) 2026 EIN Registry Contributors. MIT License.
// See LICENSE for details.

//! # EIN Registry Node
//!
//! Entry point for the `ein-node` binary. Parses CLI arguments, loads
//! configuration, initializes logging and metrics, and serves the registry
//! over HTTP/WS.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — host a registry and serve the API
//! - `keygen`  — generate a secp256k1 keypair
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod config;
mod executor;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal;
use tokio::sync::broadcast;

use ein_protocol::crypto::SigningKeypair;

use cli::{Commands, EinNodeCli};
use config::NodeConfig;
use executor::Ledger;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EinNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Hosts the registry: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = NodeConfig::load(args.config.as_deref())?.resolve(&args)?;
    logging::init_logging(logging::DEFAULT_FILTER, config.log_format);

    tracing::info!(
        rpc_port = config.rpc_port,
        metrics_port = config.metrics_port,
        registry = %config.registry.registry_address,
        max_associated_addresses = config.registry.max_associated_addresses,
        recovery_timelock_secs = config.registry.recovery_timelock_secs,
        "starting ein-node"
    );
    if config.registry.registry_address.is_zero() {
        tracing::warn!("registry address is zero; signatures will not be bound to a deployment");
    }

    let ledger = Arc::new(Ledger::new(config.registry.clone()).context("invalid registry configuration")?);
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            ein_protocol::config::PROTOCOL_VERSION,
        ),
        ledger,
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = SocketAddr::from(([0, 0, 0, 0], config.rpc_port));
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {api_addr}"))?;
    tracing::info!(addr = %api_addr, "RPC/API server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("ein-node stopped");
    Ok(())
}

/// Generates a keypair. Prints the address, and either prints the secret
/// or writes it to a 0600 file.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = SigningKeypair::generate();
    println!("Address    : {}", keypair.address());

    match args.output {
        Some(path) => {
            std::fs::write(&path, keypair.secret_key_hex())
                .with_context(|| format!("failed to write key to {}", path.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                    .with_context(|| format!("failed to restrict {}", path.display()))?;
            }
            println!("Secret key : written to {}", path.display());
        }
        None => println!("Secret key : {}", keypair.secret_key_hex()),
    }
    Ok(())
}

/// Queries a running node's status endpoint and prints the body.
///
/// Speaks just enough HTTP/1.1 for one GET with `Connection: close`.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let mut stream = tokio::net::TcpStream::connect(args.rpc_addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.rpc_addr))?;

    let request = format!(
        "GET /status HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        args.rpc_addr
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b)
        .unwrap_or(response.as_ref());
    println!("{body}");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("ein-node  {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", ein_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => res.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;

    Ok(())
}
