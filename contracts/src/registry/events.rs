//! Registry events.
//!
//! One event per committed state transition, appended only when the whole
//! call succeeds. Off-chain observers (and the node's WebSocket feed) read
//! the registry's history from these.

use ein_protocol::identity::{Address, Ein};
use serde::{Deserialize, Serialize};

/// A committed registry state transition.
///
/// `initiator` is the address that submitted the call; `delegated` is set
/// when the action rode on somebody else's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    IdentityCreated {
        initiator: Address,
        ein: Ein,
        recovery_address: Address,
        associated_address: Address,
        providers: Vec<Address>,
        resolvers: Vec<Address>,
        delegated: bool,
    },
    AssociatedAddressAdded {
        initiator: Address,
        ein: Ein,
        approving_address: Address,
        added_address: Address,
        delegated: bool,
    },
    AssociatedAddressRemoved {
        initiator: Address,
        ein: Ein,
        removed_address: Address,
        delegated: bool,
    },
    ProviderAdded {
        initiator: Address,
        ein: Ein,
        provider: Address,
        delegated: bool,
    },
    ProviderRemoved {
        initiator: Address,
        ein: Ein,
        provider: Address,
        delegated: bool,
    },
    ResolverAdded {
        initiator: Address,
        ein: Ein,
        resolver: Address,
        delegated: bool,
    },
    ResolverRemoved {
        initiator: Address,
        ein: Ein,
        resolver: Address,
        delegated: bool,
    },
    RecoveryAddressChangeTriggered {
        initiator: Address,
        ein: Ein,
        old_recovery_address: Address,
        new_recovery_address: Address,
        delegated: bool,
    },
    /// Carries the displaced associated addresses, which are the only
    /// addresses allowed to destroy the identity afterwards.
    RecoveryTriggered {
        initiator: Address,
        ein: Ein,
        displaced: Vec<Address>,
        new_associated_address: Address,
    },
    IdentityDestroyed {
        initiator: Address,
        ein: Ein,
        recovery_address: Address,
        resolvers_cleared: bool,
    },
}

impl RegistryEvent {
    pub fn ein(&self) -> Ein {
        match self {
            RegistryEvent::IdentityCreated { ein, .. }
            | RegistryEvent::AssociatedAddressAdded { ein, .. }
            | RegistryEvent::AssociatedAddressRemoved { ein, .. }
            | RegistryEvent::ProviderAdded { ein, .. }
            | RegistryEvent::ProviderRemoved { ein, .. }
            | RegistryEvent::ResolverAdded { ein, .. }
            | RegistryEvent::ResolverRemoved { ein, .. }
            | RegistryEvent::RecoveryAddressChangeTriggered { ein, .. }
            | RegistryEvent::RecoveryTriggered { ein, .. }
            | RegistryEvent::IdentityDestroyed { ein, .. } => *ein,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::IdentityCreated { .. } => "identity_created",
            RegistryEvent::AssociatedAddressAdded { .. } => "associated_address_added",
            RegistryEvent::AssociatedAddressRemoved { .. } => "associated_address_removed",
            RegistryEvent::ProviderAdded { .. } => "provider_added",
            RegistryEvent::ProviderRemoved { .. } => "provider_removed",
            RegistryEvent::ResolverAdded { .. } => "resolver_added",
            RegistryEvent::ResolverRemoved { .. } => "resolver_removed",
            RegistryEvent::RecoveryAddressChangeTriggered { .. } => {
                "recovery_address_change_triggered"
            }
            RegistryEvent::RecoveryTriggered { .. } => "recovery_triggered",
            RegistryEvent::IdentityDestroyed { .. } => "identity_destroyed",
        }
    }
}
