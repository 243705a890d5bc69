//! Recovery-address changes, recovery, and destruction.
//!
//! ## Recovery address
//!
//! An associated address (or a provider, on the identity's behalf) may
//! swap the recovery address. The swap takes effect at once, but for one
//! timelock period afterwards:
//!
//! - no further swap is allowed, and
//! - only the *previous* recovery address may trigger recovery.
//!
//! So an attacker who captures the providers and swaps in their own
//! recovery address still loses the race: the rightful old address gets a
//! full timelock to recover first.
//!
//! ## Recovery
//!
//! The entitled recovery address replaces the whole associated set with one
//! new address that consented by signature. Providers are cleared.
//! Resolvers stay, since they are records rather than control. The
//! displaced addresses are logged.
//!
//! ## Destruction
//!
//! For one timelock after a recovery, any displaced address may destroy the
//! identity outright. This is the dead-man's switch against an attacker who
//! held the recovery address too: if the rightful owners can't win control
//! back, they can at least make sure nobody keeps it.

use ein_protocol::crypto::RecoverableSignature;
use ein_protocol::identity::{Address, Ein};
use ein_protocol::permission::Permission;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{IdentityRegistry, MemberSet, RecoveryChange, RecoveryLog, RegistryError, RegistryEvent};
use crate::address_set::AddressSet;
use crate::authorization::{Authorization, CallContext, Freshness};

/// Where an identity stands in the recovery-address lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RecoveryPhase {
    /// No change inside the timelock; the current recovery address is in
    /// charge and a new change may be made.
    Stable,
    /// A change happened less than a timelock ago. Before
    /// `countermand_until`, only `previous_recovery_address` may recover.
    ChangePending {
        previous_recovery_address: Address,
        countermand_until: u64,
    },
}

impl IdentityRegistry {
    /// The first instant at which a timelock started at `since` has elapsed.
    fn timelock_end(&self, since: u64) -> u64 {
        since.saturating_add(self.config.recovery_timelock_secs)
    }

    /// The recovery change still inside its timelock at `now`, if any.
    fn pending_change(&self, ein: Ein, now: u64) -> Result<Option<RecoveryChange>, RegistryError> {
        Ok(self
            .identity(ein)?
            .recovery_change
            .filter(|change| now < self.timelock_end(change.timestamp)))
    }

    pub fn recovery_phase(&self, ein: Ein, now: u64) -> Result<RecoveryPhase, RegistryError> {
        Ok(match self.pending_change(ein, now)? {
            Some(change) => RecoveryPhase::ChangePending {
                previous_recovery_address: change.previous,
                countermand_until: self.timelock_end(change.timestamp),
            },
            None => RecoveryPhase::Stable,
        })
    }

    // -- recovery address ---------------------------------------------------

    /// Sets a new recovery address for the caller's identity.
    pub fn initiate_recovery_address_change(
        &mut self,
        ctx: &CallContext,
        new_recovery_address: Address,
    ) -> Result<(), RegistryError> {
        let ein = self.get_ein(&ctx.caller)?;
        self.change_recovery_address(ctx, ein, new_recovery_address, false)
    }

    /// Sets a new recovery address for `ein`; the caller must be one of its
    /// providers.
    pub fn trigger_recovery_address_change_for(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        new_recovery_address: Address,
    ) -> Result<(), RegistryError> {
        if !self.identity(ein)?.providers.contains(&ctx.caller) {
            return Err(RegistryError::NotProvider {
                ein,
                address: ctx.caller,
            });
        }
        self.change_recovery_address(ctx, ein, new_recovery_address, true)
    }

    fn change_recovery_address(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        new_recovery_address: Address,
        delegated: bool,
    ) -> Result<(), RegistryError> {
        if new_recovery_address.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        if self.pending_change(ein, ctx.timestamp)?.is_some() {
            return Err(RegistryError::RecoveryAddressChangePending);
        }

        // Commit.
        let identity = self.identity_mut(ein)?;
        let old = identity.recovery_address;
        identity.recovery_change = Some(RecoveryChange {
            timestamp: ctx.timestamp,
            previous: old,
        });
        identity.recovery_address = new_recovery_address;

        info!(
            ein = %ein,
            old = %old,
            new = %new_recovery_address,
            delegated,
            "recovery address changed"
        );
        self.emit(RegistryEvent::RecoveryAddressChangeTriggered {
            initiator: ctx.caller,
            ein,
            old_recovery_address: old,
            new_recovery_address,
            delegated,
        });
        Ok(())
    }

    // -- recovery -----------------------------------------------------------

    /// Replaces every associated address of `ein` with
    /// `new_associated_address`, which signed a Recover permission at
    /// `timestamp`. Returns the displaced addresses.
    ///
    /// While a recovery-address change is inside its timelock only the
    /// previous recovery address may call; otherwise only the current one.
    pub fn trigger_recovery(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        new_associated_address: Address,
        signature: RecoverableSignature,
        timestamp: u64,
    ) -> Result<Vec<Address>, RegistryError> {
        self.identity(ein)?;
        let auth = Authorization::DelegatedSignature {
            signer: new_associated_address,
            signature,
            freshness: Freshness::Timestamp(timestamp),
        };
        let ticket = self.open(ctx, &auth, Some(ein), |timestamp| Permission::Recover {
            ein,
            new_address: new_associated_address,
            timestamp,
        })?;

        if new_associated_address.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        if self.has_identity(&new_associated_address) {
            return Err(RegistryError::AddressHasIdentity(new_associated_address));
        }

        let identity = self.identity(ein)?;
        // A second recovery would overwrite the displaced set that the
        // previous one left open to destruction.
        if let Some(log) = &identity.recovery_log {
            if ctx.timestamp < self.timelock_end(log.timestamp) {
                return Err(RegistryError::RecoveryCooldown);
            }
        }
        match self.pending_change(ein, ctx.timestamp)? {
            Some(change) if ctx.caller != change.previous => {
                return Err(RegistryError::OnlyPreviousRecoveryAddress);
            }
            None if ctx.caller != identity.recovery_address => {
                return Err(RegistryError::OnlyCurrentRecoveryAddress);
            }
            _ => {}
        }
        self.check_consent(&auth, &new_associated_address, ticket.as_ref())?;

        let mut associated = AddressSet::new(self.config.max_associated_addresses);
        associated
            .insert(new_associated_address)
            .map_err(|e| RegistryError::from_set(MemberSet::AssociatedAddresses, e))?;

        // Commit.
        let identity = self.identity_mut(ein)?;
        let displaced = std::mem::replace(&mut identity.associated, associated).take_members();
        identity.providers.reset();
        identity.recovery_address = ctx.caller;
        identity.recovery_log = Some(RecoveryLog {
            timestamp: ctx.timestamp,
            displaced: displaced.clone(),
        });
        for address in &displaced {
            self.directory.remove(address);
        }
        self.directory.insert(new_associated_address, ein);
        self.consume(ctx, ticket);

        warn!(
            ein = %ein,
            recovery = %ctx.caller,
            new_address = %new_associated_address,
            displaced = displaced.len(),
            "recovery triggered"
        );
        self.emit(RegistryEvent::RecoveryTriggered {
            initiator: ctx.caller,
            ein,
            displaced: displaced.clone(),
            new_associated_address,
        });
        Ok(displaced)
    }

    // -- destruction --------------------------------------------------------

    /// Destroys `ein`. The caller must be one of the addresses displaced by
    /// its most recent recovery, and `first_chunk ++ [caller] ++ last_chunk`
    /// must name exactly that displaced set.
    ///
    /// Providers and associated addresses are cleared, resolvers only if
    /// `clear_resolvers` is set, and the recovery address is zeroed. The EIN
    /// is never handed out again.
    pub fn trigger_destruction(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        first_chunk: &[Address],
        last_chunk: &[Address],
        clear_resolvers: bool,
    ) -> Result<(), RegistryError> {
        let identity = self.identity(ein)?;
        let log = identity
            .recovery_log
            .as_ref()
            .filter(|log| ctx.timestamp < self.timelock_end(log.timestamp))
            .ok_or(RegistryError::NoRecentRecovery)?;

        let mut claimed: Vec<Address> = first_chunk
            .iter()
            .copied()
            .chain(std::iter::once(ctx.caller))
            .chain(last_chunk.iter().copied())
            .collect();
        let mut recorded = log.displaced.clone();
        claimed.sort_unstable();
        recorded.sort_unstable();
        // `recorded` has no duplicates, so equality also rules them out in
        // `claimed`.
        if claimed != recorded {
            return Err(RegistryError::NotRecentlyDisplaced);
        }

        // Commit.
        let identity = self.identity_mut(ein)?;
        let released = identity.associated.take_members();
        identity.providers.reset();
        if clear_resolvers {
            identity.resolvers.reset();
        }
        let recovery_address = identity.recovery_address;
        identity.recovery_address = Address::ZERO;
        for address in &released {
            self.directory.remove(address);
        }

        warn!(
            ein = %ein,
            caller = %ctx.caller,
            clear_resolvers,
            "identity destroyed"
        );
        self.emit(RegistryEvent::IdentityDestroyed {
            initiator: ctx.caller,
            ein,
            recovery_address,
            resolvers_cleared: clear_resolvers,
        });
        Ok(())
    }
}
