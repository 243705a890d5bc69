//! # Protocol Configuration & Constants
//!
//! Every magic number in the registry lives here. The limits below bound
//! the work any single call can do, and the time windows below are what the
//! recovery protocol's security argument rests on. Change them with care.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the registry protocol.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Permission Encoding
// ---------------------------------------------------------------------------

/// First byte of every permission preimage. `0x19` can never start a valid
/// RLP-encoded transaction, so a permission can't double as one.
pub const PERMISSION_MAGIC: u8 = 0x19;

/// Second byte of every permission preimage: "version 0, data with intended
/// validator". The validator is the registry's own address, appended next.
pub const PERMISSION_VERSION: u8 = 0x00;

/// Prefix mixed into personal-message signatures before hashing.
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Account addresses are exactly 20 bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Keccak-256 output length in bytes.
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Set Limits
// ---------------------------------------------------------------------------

/// Upper bound on the associated addresses of a single identity. Enumeration
/// and destruction walk this set, so it must stay small.
pub const MAX_ASSOCIATED_ADDRESSES: usize = 50;

/// Upper bound on the providers of a single identity.
pub const MAX_PROVIDERS: usize = 128;

/// Upper bound on the resolvers of a single identity.
pub const MAX_RESOLVERS: usize = 128;

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// Recovery timelock: how long a recovery-address change blocks the next
/// one, how long the previous recovery address may countermand it, and how
/// long displaced addresses may trigger destruction after a recovery.
pub const RECOVERY_TIMELOCK: Duration = Duration::from_secs(60 * 60 * 24 * 14);

/// Freshness window for timestamped permissions. A signature older than this
/// is stale, and so is one dated in the future.
pub const SIGNATURE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default JSON-RPC / REST API port.
pub const DEFAULT_RPC_PORT: u16 = 8484;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 8485;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors raised while validating a [`RegistryConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("max_associated_addresses {value} exceeds the protocol maximum of {max}")]
    AssociatedAddressCapTooLarge { value: usize, max: usize },
}

/// Runtime parameters of one registry instance.
///
/// Defaults come straight from the constants above; a deployment may tighten
/// the set limits or shorten the windows (devnets do), but never raise the
/// associated-address cap beyond [`MAX_ASSOCIATED_ADDRESSES`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// The registry's own address. Bound into every permission digest.
    pub registry_address: Address,
    /// Cap on associated addresses per identity.
    pub max_associated_addresses: usize,
    /// Cap on providers per identity.
    pub max_providers: usize,
    /// Cap on resolvers per identity.
    pub max_resolvers: usize,
    /// Recovery timelock in seconds.
    pub recovery_timelock_secs: u64,
    /// Timestamp freshness window in seconds.
    pub signature_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_address: Address::ZERO,
            max_associated_addresses: MAX_ASSOCIATED_ADDRESSES,
            max_providers: MAX_PROVIDERS,
            max_resolvers: MAX_RESOLVERS,
            recovery_timelock_secs: RECOVERY_TIMELOCK.as_secs(),
            signature_timeout_secs: SIGNATURE_TIMEOUT.as_secs(),
        }
    }
}

impl RegistryConfig {
    /// Default configuration bound to the given registry address.
    pub fn for_registry(registry_address: Address) -> Self {
        Self {
            registry_address,
            ..Self::default()
        }
    }

    /// Checks that every limit and window is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("max_associated_addresses", self.max_associated_addresses as u64),
            ("max_providers", self.max_providers as u64),
            ("max_resolvers", self.max_resolvers as u64),
            ("recovery_timelock_secs", self.recovery_timelock_secs),
            ("signature_timeout_secs", self.signature_timeout_secs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        if self.max_associated_addresses > MAX_ASSOCIATED_ADDRESSES {
            return Err(ConfigError::AssociatedAddressCapTooLarge {
                value: self.max_associated_addresses,
                max: MAX_ASSOCIATED_ADDRESSES,
            });
        }

        Ok(())
    }
}
