//! Registry errors and their classification.

use std::fmt;

use ein_protocol::identity::{Address, Ein};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address_set::AddressSetError;

/// The broad class a [`RegistryError`] falls into.
///
/// Clients branch on this rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An identity or address does not exist where required, or exists
    /// where it must not.
    Existence,
    /// Wrong caller, or a signature that does not recover to the signer.
    Authorization,
    /// Timestamp outside the window, replayed digest, or stale nonce.
    Freshness,
    /// A member set is full.
    Capacity,
    /// A recovery timelock has not elapsed yet.
    Timelock,
    /// A destruction request does not match the recorded displaced set.
    Integrity,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Existence,
        ErrorKind::Authorization,
        ErrorKind::Freshness,
        ErrorKind::Capacity,
        ErrorKind::Timelock,
        ErrorKind::Integrity,
    ];

    /// Stable small integer for wire error codes.
    pub fn code(&self) -> i64 {
        match self {
            ErrorKind::Existence => 0,
            ErrorKind::Authorization => 1,
            ErrorKind::Freshness => 2,
            ErrorKind::Capacity => 3,
            ErrorKind::Timelock => 4,
            ErrorKind::Integrity => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Existence => "existence",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Freshness => "freshness",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Timelock => "timelock",
            ErrorKind::Integrity => "integrity",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of an identity's three member sets an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberSet {
    AssociatedAddresses,
    Providers,
    Resolvers,
}

impl fmt::Display for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberSet::AssociatedAddresses => write!(f, "associated addresses"),
            MemberSet::Providers => write!(f, "providers"),
            MemberSet::Resolvers => write!(f, "resolvers"),
        }
    }
}

/// Every reason a registry call can be refused.
///
/// A refused call never leaves partial state behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    // -- existence ----------------------------------------------------------
    #[error("identity {0} does not exist")]
    IdentityNotFound(Ein),

    #[error("the address {0} does not have an identity")]
    AddressHasNoIdentity(Address),

    #[error("the address {0} already has an identity")]
    AddressHasIdentity(Address),

    #[error("EIN space exhausted")]
    EinOverflow,

    // -- authorization ------------------------------------------------------
    #[error("{address} is not an associated address of identity {ein}")]
    NotAssociatedAddress { ein: Ein, address: Address },

    #[error("{address} is not a provider for identity {ein}")]
    NotProvider { ein: Ein, address: Address },

    #[error("Permission denied.")]
    PermissionDenied,

    #[error("the caller must be either the approving or the added address")]
    NotAParty,

    #[error("only the recently removed recovery address can trigger recovery")]
    OnlyPreviousRecoveryAddress,

    #[error("only the current recovery address can trigger recovery")]
    OnlyCurrentRecoveryAddress,

    #[error("the zero address cannot be used here")]
    ZeroAddress,

    // -- freshness ----------------------------------------------------------
    #[error("Timestamp is not valid.")]
    TimestampNotValid,

    #[error("this permission has already been used")]
    PermissionReplayed,

    #[error("stale nonce: expected {expected}, got {provided}")]
    StaleNonce { expected: u64, provided: u64 },

    // -- capacity -----------------------------------------------------------
    #[error("too many {set}: capacity is {capacity}")]
    SetFull { set: MemberSet, capacity: usize },

    #[error("{address} is already one of the {set}")]
    AlreadyMember { set: MemberSet, address: Address },

    #[error("cannot remove your last associated address")]
    LastAssociatedAddress,

    // -- timelock -----------------------------------------------------------
    #[error("Cannot trigger a change in recovery address yet.")]
    RecoveryAddressChangePending,

    #[error("cannot trigger recovery yet: a recent recovery is still open to destruction")]
    RecoveryCooldown,

    #[error("recovery has not recently been triggered")]
    NoRecentRecovery,

    // -- integrity ----------------------------------------------------------
    #[error(
        "cannot destroy an EIN from an address that was not recently removed from said EIN via recovery"
    )]
    NotRecentlyDisplaced,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        use RegistryError::*;
        match self {
            IdentityNotFound(_) | AddressHasNoIdentity(_) | AddressHasIdentity(_) | EinOverflow => {
                ErrorKind::Existence
            }
            NotAssociatedAddress { .. }
            | NotProvider { .. }
            | PermissionDenied
            | NotAParty
            | OnlyPreviousRecoveryAddress
            | OnlyCurrentRecoveryAddress
            | ZeroAddress => ErrorKind::Authorization,
            TimestampNotValid | PermissionReplayed | StaleNonce { .. } => ErrorKind::Freshness,
            SetFull { .. } | AlreadyMember { .. } | LastAssociatedAddress => ErrorKind::Capacity,
            RecoveryAddressChangePending | RecoveryCooldown | NoRecentRecovery => {
                ErrorKind::Timelock
            }
            NotRecentlyDisplaced => ErrorKind::Integrity,
        }
    }

    /// Attaches set context to an [`AddressSetError`].
    pub(crate) fn from_set(set: MemberSet, error: AddressSetError) -> Self {
        match error {
            AddressSetError::AlreadyMember(address) => RegistryError::AlreadyMember { set, address },
            AddressSetError::CapacityReached { capacity } => {
                RegistryError::SetFull { set, capacity }
            }
        }
    }
}
