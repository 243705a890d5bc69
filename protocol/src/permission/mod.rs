//! # Permission Codec
//!
//! Turns the *intent* of a delegated action into the exact 32-byte digest
//! its signer must sign. Whoever relays the signature can't stretch it to
//! cover anything else: not another action, not another identity, not
//! another address list, not another registry.
//!
//! ## Preimage layout
//!
//! ```text
//! 0x19 || 0x00 || registry_address(20) || action_phrase || fields...
//! ```
//!
//! - `0x19 0x00` plus the registry's own address pins the signature to one
//!   deployed registry; a signature for a testnet registry is garbage on
//!   mainnet.
//! - The action phrase is a human-readable sentence. The set of phrases is
//!   prefix-free, so no two actions can produce the same preimage even when
//!   their fields line up byte-for-byte.
//! - Fields are packed tightly: addresses as 20 raw bytes, integers (EINs,
//!   timestamps, nonces) as 32-byte big-endian words. An address list is a
//!   length word followed by one left-padded 32-byte word per element, so
//!   two adjacent lists can't trade elements across their boundary.
//!
//! ## Freshness
//!
//! Every permission ends in a freshness token. Actions whose signer may not
//! yet belong to the identity (creation, joining, leaving, recovery) carry
//! a Unix timestamp; actions signed by a standing member carry that
//! identity's next action nonce. The registry enforces both.

use serde::{Deserialize, Serialize};

use crate::config::{PERMISSION_MAGIC, PERMISSION_VERSION};
use crate::crypto::hash::keccak256;
use crate::identity::{Address, Ein};

/// Encode an unsigned integer as a 32-byte big-endian word.
pub fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Which kind of freshness token an action carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessClass {
    /// A Unix timestamp inside the signature window.
    Timestamp,
    /// A strictly increasing counter.
    Nonce,
}

/// Every action a permission can authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    CreateIdentity,
    ApproveAddress,
    AcceptAddress,
    RemoveAddress,
    AddProviders,
    RemoveProviders,
    AddResolvers,
    RemoveResolvers,
    Recover,
    SubmitCall,
}

impl PermissionAction {
    pub const ALL: [PermissionAction; 10] = [
        PermissionAction::CreateIdentity,
        PermissionAction::ApproveAddress,
        PermissionAction::AcceptAddress,
        PermissionAction::RemoveAddress,
        PermissionAction::AddProviders,
        PermissionAction::RemoveProviders,
        PermissionAction::AddResolvers,
        PermissionAction::RemoveResolvers,
        PermissionAction::Recover,
        PermissionAction::SubmitCall,
    ];

    /// The sentence a signer is shown and the codec hashes in.
    pub fn phrase(&self) -> &'static str {
        match self {
            PermissionAction::CreateIdentity => {
                "I authorize the creation of an Identity on my behalf."
            }
            PermissionAction::ApproveAddress => "I authorize adding this address to my Identity.",
            PermissionAction::AcceptAddress => "I authorize being added to this Identity.",
            PermissionAction::RemoveAddress => {
                "I authorize removing this address from my Identity."
            }
            PermissionAction::AddProviders => {
                "I authorize that these Providers be added to my Identity."
            }
            PermissionAction::RemoveProviders => {
                "I authorize that these Providers be removed from my Identity."
            }
            PermissionAction::AddResolvers => {
                "I authorize that these Resolvers be added to my Identity."
            }
            PermissionAction::RemoveResolvers => {
                "I authorize that these Resolvers be removed from my Identity."
            }
            PermissionAction::Recover => "I authorize being added to this Identity via recovery.",
            PermissionAction::SubmitCall => "I submit this call to the Identity Registry.",
        }
    }

    pub fn freshness_class(&self) -> FreshnessClass {
        match self {
            PermissionAction::AddProviders
            | PermissionAction::RemoveProviders
            | PermissionAction::AddResolvers
            | PermissionAction::RemoveResolvers
            | PermissionAction::SubmitCall => FreshnessClass::Nonce,
            _ => FreshnessClass::Timestamp,
        }
    }
}

/// The semantic content of one permission.
///
/// `timestamp` fields are Unix seconds; `nonce` fields are the counter value
/// the signer expects to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission<'a> {
    CreateIdentity {
        recovery_address: Address,
        associated_address: Address,
        providers: &'a [Address],
        resolvers: &'a [Address],
        timestamp: u64,
    },
    /// Signed by an existing associated address.
    ApproveAddress {
        ein: Ein,
        address: Address,
        timestamp: u64,
    },
    /// Signed by the address joining the identity.
    AcceptAddress {
        ein: Ein,
        address: Address,
        timestamp: u64,
    },
    RemoveAddress {
        ein: Ein,
        address: Address,
        timestamp: u64,
    },
    AddProviders {
        ein: Ein,
        providers: &'a [Address],
        nonce: u64,
    },
    RemoveProviders {
        ein: Ein,
        providers: &'a [Address],
        nonce: u64,
    },
    AddResolvers {
        ein: Ein,
        resolvers: &'a [Address],
        nonce: u64,
    },
    RemoveResolvers {
        ein: Ein,
        resolvers: &'a [Address],
        nonce: u64,
    },
    Recover {
        ein: Ein,
        new_address: Address,
        timestamp: u64,
    },
    /// Authenticates a sender's call envelope.
    SubmitCall {
        sender: Address,
        nonce: u64,
        payload_hash: [u8; 32],
    },
}

impl Permission<'_> {
    pub fn action(&self) -> PermissionAction {
        match self {
            Permission::CreateIdentity { .. } => PermissionAction::CreateIdentity,
            Permission::ApproveAddress { .. } => PermissionAction::ApproveAddress,
            Permission::AcceptAddress { .. } => PermissionAction::AcceptAddress,
            Permission::RemoveAddress { .. } => PermissionAction::RemoveAddress,
            Permission::AddProviders { .. } => PermissionAction::AddProviders,
            Permission::RemoveProviders { .. } => PermissionAction::RemoveProviders,
            Permission::AddResolvers { .. } => PermissionAction::AddResolvers,
            Permission::RemoveResolvers { .. } => PermissionAction::RemoveResolvers,
            Permission::Recover { .. } => PermissionAction::Recover,
            Permission::SubmitCall { .. } => PermissionAction::SubmitCall,
        }
    }
}

/// Packed preimage builder.
struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    fn new(registry: &Address, action: PermissionAction) -> Self {
        let phrase = action.phrase().as_bytes();
        let mut buf = Vec::with_capacity(2 + 20 + phrase.len() + 4 * 32);
        buf.push(PERMISSION_MAGIC);
        buf.push(PERMISSION_VERSION);
        buf.extend_from_slice(registry.as_bytes());
        buf.extend_from_slice(phrase);
        Self { buf }
    }

    fn address(mut self, address: &Address) -> Self {
        self.buf.extend_from_slice(address.as_bytes());
        self
    }

    fn addresses(mut self, addresses: &[Address]) -> Self {
        self.buf.extend_from_slice(&uint_word(addresses.len() as u64));
        for address in addresses {
            self.buf.extend_from_slice(&address.to_word());
        }
        self
    }

    fn uint(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&uint_word(value));
        self
    }

    fn ein(self, ein: Ein) -> Self {
        self.word(&ein.to_word())
    }

    fn word(mut self, word: &[u8; 32]) -> Self {
        self.buf.extend_from_slice(word);
        self
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Builds permission preimages and digests for one registry instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionCodec {
    registry: Address,
}

impl PermissionCodec {
    pub fn new(registry: Address) -> Self {
        Self { registry }
    }

    /// The registry address this codec binds signatures to.
    pub fn registry(&self) -> Address {
        self.registry
    }

    /// The full packed preimage of a permission.
    pub fn encode(&self, permission: &Permission<'_>) -> Vec<u8> {
        let packer = Packer::new(&self.registry, permission.action());
        match permission {
            Permission::CreateIdentity {
                recovery_address,
                associated_address,
                providers,
                resolvers,
                timestamp,
            } => packer
                .address(recovery_address)
                .address(associated_address)
                .addresses(providers)
                .addresses(resolvers)
                .uint(*timestamp),
            Permission::ApproveAddress {
                ein,
                address,
                timestamp,
            }
            | Permission::AcceptAddress {
                ein,
                address,
                timestamp,
            }
            | Permission::RemoveAddress {
                ein,
                address,
                timestamp,
            } => packer.ein(*ein).address(address).uint(*timestamp),
            Permission::AddProviders {
                ein,
                providers: members,
                nonce,
            }
            | Permission::RemoveProviders {
                ein,
                providers: members,
                nonce,
            }
            | Permission::AddResolvers {
                ein,
                resolvers: members,
                nonce,
            }
            | Permission::RemoveResolvers {
                ein,
                resolvers: members,
                nonce,
            } => packer.ein(*ein).addresses(members).uint(*nonce),
            Permission::Recover {
                ein,
                new_address,
                timestamp,
            } => packer.ein(*ein).address(new_address).uint(*timestamp),
            Permission::SubmitCall {
                sender,
                nonce,
                payload_hash,
            } => packer.address(sender).uint(*nonce).word(payload_hash),
        }
        .finish()
    }

    /// The 32-byte digest a signer must sign to grant `permission`.
    pub fn digest(&self, permission: &Permission<'_>) -> [u8; 32] {
        keccak256(&self.encode(permission))
    }
}
