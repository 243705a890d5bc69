//! # Identity Registry
//!
//! The single authoritative ledger of identities. Each identity, keyed by a
//! sequential EIN, holds:
//!
//! - a **recovery address**, the owner of last resort;
//! - its **associated addresses**, which control it;
//! - its **providers**, which may act for it without per-call signatures;
//! - its **resolvers**, the external contracts it has opted into.
//!
//! A global directory maps every associated address back to its EIN, so an
//! address belongs to at most one identity at a time.
//!
//! ## Execution model
//!
//! Calls run one at a time against `&mut IdentityRegistry`. Each call checks
//! every precondition first and mutates only once nothing can fail, so a
//! refused call leaves the registry exactly as it found it. Events are
//! appended on commit and nowhere else.
//!
//! ## Layout
//!
//! - this module: state, queries, creation, and the shared authorization path
//! - `membership`: associated addresses, providers, resolvers
//! - `recovery`: recovery-address changes, recovery, destruction

mod error;
mod events;
mod membership;
mod recovery;

use std::collections::HashMap;

use ein_protocol::config::{ConfigError, RegistryConfig};
use ein_protocol::crypto::{self, RecoverableSignature};
use ein_protocol::identity::{Address, Ein};
use ein_protocol::permission::{Permission, PermissionCodec};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address_set::AddressSet;
use crate::authorization::{
    Authorization, CallContext, Freshness, Grant, ReplayGuard, Ticket,
};

pub use error::{ErrorKind, MemberSet, RegistryError};
pub use events::RegistryEvent;
pub use recovery::RecoveryPhase;

// ---------------------------------------------------------------------------
// Identity records
// ---------------------------------------------------------------------------

/// The last change of an identity's recovery address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecoveryChange {
    pub(crate) timestamp: u64,
    pub(crate) previous: Address,
}

/// The last recovery of an identity, kept for the destruction window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecoveryLog {
    pub(crate) timestamp: u64,
    pub(crate) displaced: Vec<Address>,
}

#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) recovery_address: Address,
    pub(crate) associated: AddressSet,
    pub(crate) providers: AddressSet,
    pub(crate) resolvers: AddressSet,
    pub(crate) action_nonce: u64,
    pub(crate) recovery_change: Option<RecoveryChange>,
    pub(crate) recovery_log: Option<RecoveryLog>,
}

impl Identity {
    fn new(recovery_address: Address, config: &RegistryConfig) -> Self {
        Self {
            recovery_address,
            associated: AddressSet::new(config.max_associated_addresses),
            providers: AddressSet::new(config.max_providers),
            resolvers: AddressSet::new(config.max_resolvers),
            action_nonce: 0,
            recovery_change: None,
            recovery_log: None,
        }
    }

    /// An identity exists while it has at least one associated address.
    pub(crate) fn exists(&self) -> bool {
        !self.associated.is_empty()
    }
}

/// A snapshot of one identity, as returned by [`IdentityRegistry::get_details`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDetails {
    pub ein: Ein,
    pub recovery_address: Address,
    pub associated_addresses: Vec<Address>,
    pub providers: Vec<Address>,
    pub resolvers: Vec<Address>,
}

// ---------------------------------------------------------------------------
// IdentityRegistry
// ---------------------------------------------------------------------------

/// The registry state machine.
#[derive(Debug)]
pub struct IdentityRegistry {
    config: RegistryConfig,
    codec: PermissionCodec,
    identities: HashMap<Ein, Identity>,
    directory: HashMap<Address, Ein>,
    next_ein: Ein,
    replay: ReplayGuard,
    events: Vec<RegistryEvent>,
}

impl IdentityRegistry {
    /// Creates an empty registry.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] if `config` fails validation.
    pub fn new(config: RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            registry = %config.registry_address,
            max_associated_addresses = config.max_associated_addresses,
            recovery_timelock_secs = config.recovery_timelock_secs,
            "identity registry initialized"
        );
        Ok(Self {
            codec: PermissionCodec::new(config.registry_address),
            config,
            identities: HashMap::new(),
            directory: HashMap::new(),
            next_ein: Ein::FIRST,
            replay: ReplayGuard::default(),
            events: Vec::new(),
        })
    }

    // -- queries ------------------------------------------------------------

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The address every permission digest is bound to.
    pub fn registry_address(&self) -> Address {
        self.config.registry_address
    }

    /// The codec that builds this registry's permission digests.
    pub fn codec(&self) -> &PermissionCodec {
        &self.codec
    }

    pub fn max_associated_addresses(&self) -> usize {
        self.config.max_associated_addresses
    }

    pub fn identity_exists(&self, ein: Ein) -> bool {
        self.identities.get(&ein).is_some_and(Identity::exists)
    }

    pub fn has_identity(&self, address: &Address) -> bool {
        self.directory.contains_key(address)
    }

    /// The EIN `address` is associated with.
    pub fn get_ein(&self, address: &Address) -> Result<Ein, RegistryError> {
        self.directory
            .get(address)
            .copied()
            .ok_or(RegistryError::AddressHasNoIdentity(*address))
    }

    pub fn is_address_for(&self, ein: Ein, address: &Address) -> bool {
        self.identity(ein)
            .is_ok_and(|identity| identity.associated.contains(address))
    }

    pub fn is_provider_for(&self, ein: Ein, address: &Address) -> bool {
        self.identity(ein)
            .is_ok_and(|identity| identity.providers.contains(address))
    }

    pub fn is_resolver_for(&self, ein: Ein, address: &Address) -> bool {
        self.identity(ein)
            .is_ok_and(|identity| identity.resolvers.contains(address))
    }

    pub fn get_details(&self, ein: Ein) -> Result<IdentityDetails, RegistryError> {
        let identity = self.identity(ein)?;
        Ok(IdentityDetails {
            ein,
            recovery_address: identity.recovery_address,
            associated_addresses: identity.associated.members().to_vec(),
            providers: identity.providers.members().to_vec(),
            resolvers: identity.resolvers.members().to_vec(),
        })
    }

    /// Whether `signer` signed `hash`, under either signing convention.
    pub fn is_signed(&self, signer: &Address, hash: &[u8; 32], signature: &RecoverableSignature) -> bool {
        crypto::is_signed(signer, hash, signature)
    }

    /// The nonce the next nonce-class permission for `ein` must carry.
    pub fn action_nonce(&self, ein: Ein) -> Result<u64, RegistryError> {
        Ok(self.identity(ein)?.action_nonce)
    }

    /// How many identities currently exist.
    pub fn live_identities(&self) -> usize {
        self.identities.values().filter(|identity| identity.exists()).count()
    }

    /// How many EINs have ever been assigned.
    pub fn assigned_eins(&self) -> u64 {
        self.next_ein.value() - Ein::FIRST.value()
    }

    /// Drains the events committed since the last call.
    pub fn take_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    // -- creation -----------------------------------------------------------

    /// Creates an identity whose sole associated address is the caller.
    pub fn create_identity(
        &mut self,
        ctx: &CallContext,
        recovery_address: Address,
        providers: &[Address],
        resolvers: &[Address],
    ) -> Result<Ein, RegistryError> {
        self.create(
            ctx,
            recovery_address,
            providers,
            resolvers,
            Authorization::DirectCaller(ctx.caller),
        )
    }

    /// Creates an identity for `associated_address`, which signed a
    /// CreateIdentity permission at `timestamp`. Anyone may submit it.
    #[allow(clippy::too_many_arguments)]
    pub fn create_identity_delegated(
        &mut self,
        ctx: &CallContext,
        recovery_address: Address,
        associated_address: Address,
        providers: &[Address],
        resolvers: &[Address],
        signature: RecoverableSignature,
        timestamp: u64,
    ) -> Result<Ein, RegistryError> {
        self.create(
            ctx,
            recovery_address,
            providers,
            resolvers,
            Authorization::DelegatedSignature {
                signer: associated_address,
                signature,
                freshness: Freshness::Timestamp(timestamp),
            },
        )
    }

    fn create(
        &mut self,
        ctx: &CallContext,
        recovery_address: Address,
        providers: &[Address],
        resolvers: &[Address],
        auth: Authorization,
    ) -> Result<Ein, RegistryError> {
        let associated = auth.party();
        let ticket = self.open(ctx, &auth, None, |timestamp| Permission::CreateIdentity {
            recovery_address,
            associated_address: associated,
            providers,
            resolvers,
            timestamp,
        })?;

        if recovery_address.is_zero() || associated.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        if self.has_identity(&associated) {
            return Err(RegistryError::AddressHasIdentity(associated));
        }
        self.check_consent(&auth, &associated, ticket.as_ref())?;

        let ein = self.next_ein;
        let next_ein = ein.checked_next().ok_or(RegistryError::EinOverflow)?;

        let mut identity = Identity::new(recovery_address, &self.config);
        identity
            .associated
            .insert(associated)
            .map_err(|e| RegistryError::from_set(MemberSet::AssociatedAddresses, e))?;
        for provider in providers {
            identity
                .providers
                .insert(*provider)
                .map_err(|e| RegistryError::from_set(MemberSet::Providers, e))?;
        }
        for resolver in resolvers {
            identity
                .resolvers
                .insert(*resolver)
                .map_err(|e| RegistryError::from_set(MemberSet::Resolvers, e))?;
        }

        // Commit.
        self.consume(ctx, ticket);
        self.next_ein = next_ein;
        self.directory.insert(associated, ein);
        self.identities.insert(ein, identity);

        info!(
            ein = %ein,
            associated = %associated,
            recovery = %recovery_address,
            delegated = auth.is_delegated(),
            "identity created"
        );
        self.events.push(RegistryEvent::IdentityCreated {
            initiator: ctx.caller,
            ein,
            recovery_address,
            associated_address: associated,
            providers: providers.to_vec(),
            resolvers: resolvers.to_vec(),
            delegated: auth.is_delegated(),
        });
        Ok(ein)
    }

    // -- shared internals ---------------------------------------------------

    /// An identity that currently exists.
    pub(crate) fn identity(&self, ein: Ein) -> Result<&Identity, RegistryError> {
        self.identities
            .get(&ein)
            .filter(|identity| identity.exists())
            .ok_or(RegistryError::IdentityNotFound(ein))
    }

    pub(crate) fn identity_mut(&mut self, ein: Ein) -> Result<&mut Identity, RegistryError> {
        self.identities
            .get_mut(&ein)
            .filter(|identity| identity.exists())
            .ok_or(RegistryError::IdentityNotFound(ein))
    }

    /// First half of checking an authorization: freshness.
    ///
    /// Runs before the state preconditions of a call, so a replayed call is
    /// always refused as stale rather than for whatever its first run
    /// changed. `permission` builds the intent from the freshness token; it
    /// is only evaluated for delegated authorizations. Direct callers pass
    /// straight through with no ticket.
    pub(crate) fn open<'p>(
        &self,
        ctx: &CallContext,
        auth: &Authorization,
        ein: Option<Ein>,
        permission: impl FnOnce(u64) -> Permission<'p>,
    ) -> Result<Option<Ticket>, RegistryError> {
        let Authorization::DelegatedSignature { freshness, .. } = auth else {
            return Ok(None);
        };

        let ticket = match *freshness {
            Freshness::Timestamp(timestamp) => {
                let digest = self.codec.digest(&permission(timestamp));
                self.replay.check(
                    &digest,
                    timestamp,
                    ctx.timestamp,
                    self.config.signature_timeout_secs,
                )?;
                Ticket {
                    digest,
                    grant: Grant::Timestamp(timestamp),
                }
            }
            Freshness::Nonce(nonce) => {
                let ein = ein.ok_or(RegistryError::PermissionDenied)?;
                let expected = self.identity(ein)?.action_nonce;
                if nonce != expected {
                    return Err(RegistryError::StaleNonce {
                        expected,
                        provided: nonce,
                    });
                }
                Ticket {
                    digest: self.codec.digest(&permission(nonce)),
                    grant: Grant::ActionNonce(ein),
                }
            }
        };
        Ok(Some(ticket))
    }

    /// Second half: whether `auth` carries `party`'s consent.
    ///
    /// A direct caller consents by being `party`. A delegated signature
    /// consents if it names `party` and recovers to it over the ticket's
    /// digest.
    pub(crate) fn check_consent(
        &self,
        auth: &Authorization,
        party: &Address,
        ticket: Option<&Ticket>,
    ) -> Result<(), RegistryError> {
        let consented = match (auth, ticket) {
            (Authorization::DirectCaller(caller), _) => caller == party,
            (
                Authorization::DelegatedSignature {
                    signer, signature, ..
                },
                Some(ticket),
            ) => signer == party && crypto::is_signed(signer, &ticket.digest, signature),
            (Authorization::DelegatedSignature { .. }, None) => false,
        };
        if consented {
            Ok(())
        } else {
            debug!(party = %party, "consent check failed");
            Err(RegistryError::PermissionDenied)
        }
    }

    /// Uses up a ticket. Only called once the rest of the call has committed.
    pub(crate) fn consume(&mut self, ctx: &CallContext, ticket: Option<Ticket>) {
        let Some(ticket) = ticket else {
            return;
        };
        match ticket.grant {
            Grant::Timestamp(timestamp) => self.replay.consume(
                ticket.digest,
                timestamp,
                ctx.timestamp,
                self.config.signature_timeout_secs,
            ),
            Grant::ActionNonce(ein) => {
                if let Some(identity) = self.identities.get_mut(&ein) {
                    identity.action_nonce = identity.action_nonce.saturating_add(1);
                }
            }
        }
    }

    pub(crate) fn emit(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }
}
