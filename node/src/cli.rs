//! # CLI Interface
//!
//! Defines the command-line argument structure for `ein-node` using
//! `clap` derive. Supports four subcommands: `run`, `keygen`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// EIN identity registry node.
///
/// Hosts one identity registry in memory, accepts signed registry calls
/// over JSON-RPC, answers queries, pushes registry events over WebSocket,
/// and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "ein-node",
    about = "EIN identity registry node",
    version,
    propagate_version = true
)]
pub struct EinNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the registry node.
    Run(RunArgs),
    /// Generate a secp256k1 keypair and print its address.
    Keygen(KeygenArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
///
/// Flags override the config file, which overrides the built-in defaults.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "EIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "EIN_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "EIN_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// The registry's own address, bound into every permission digest.
    #[arg(long, env = "EIN_REGISTRY_ADDRESS")]
    pub registry_address: Option<String>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "EIN_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Write the hex secret key to this file (mode 0600) instead of
    /// printing it.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API address of the running node.
    #[arg(long, default_value = "127.0.0.1:8484")]
    pub rpc_addr: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        EinNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_are_optional_overrides() {
        let cli = EinNodeCli::try_parse_from(["ein-node", "run", "--rpc-port", "9000"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.rpc_port, Some(9000));
                assert!(args.metrics_port.is_none());
                assert!(args.registry_address.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
