//! # Node Configuration
//!
//! Three layers, later ones winning: built-in defaults, an optional TOML
//! file, and CLI flags (which clap also fills from `EIN_*` env vars).
//!
//! ```toml
//! rpc_port = 8484
//! metrics_port = 8485
//! log_format = "json"
//!
//! [registry]
//! registry_address = "0x5c1c0e3f0b3c1e9a3e1bd5f7b1a2c3d4e5f60718"
//! max_associated_addresses = 20
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use ein_protocol::config::{RegistryConfig, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use ein_protocol::identity::Address;
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;
use crate::logging::LogFormat;

/// Everything `ein-node run` needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub rpc_port: u16,
    pub metrics_port: u16,
    pub log_format: LogFormat,
    pub registry: RegistryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_port: DEFAULT_RPC_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: LogFormat::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Reads `path` if given, otherwise starts from the defaults.
    ///
    /// A path that was asked for but can't be read is an error, not a
    /// silent fallback.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Applies CLI overrides, then validates the result.
    pub fn resolve(mut self, args: &RunArgs) -> Result<Self> {
        if let Some(port) = args.rpc_port {
            self.rpc_port = port;
        }
        if let Some(port) = args.metrics_port {
            self.metrics_port = port;
        }
        if let Some(format) = &args.log_format {
            self.log_format = LogFormat::from_str_lossy(format);
        }
        if let Some(address) = &args.registry_address {
            self.registry.registry_address = address
                .parse::<Address>()
                .with_context(|| format!("invalid registry address {address}"))?;
        }
        self.registry
            .validate()
            .context("invalid registry configuration")?;
        Ok(self)
    }
}
