//! Associated addresses, providers, and resolvers.
//!
//! Associated addresses join with the consent of both sides: an existing
//! member approves, the newcomer accepts. Either side may submit the call
//! directly with the other's signature, or a third party may relay both.
//! Leaving needs only the consent of the address that leaves.
//!
//! Providers and resolvers are edited in batches. An associated address
//! edits them directly; a provider may relay an edit signed by an
//! associated address, authorized by the identity's action nonce.

use ein_protocol::crypto::RecoverableSignature;
use ein_protocol::identity::{Address, Ein};
use ein_protocol::permission::Permission;
use tracing::info;

use super::{IdentityRegistry, MemberSet, RegistryError, RegistryEvent};
use crate::address_set::AddressSet;
use crate::authorization::{Authorization, CallContext, Freshness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Add,
    Remove,
}

/// The two batch-edited member sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Roster {
    Providers,
    Resolvers,
}

impl Roster {
    fn set(self) -> MemberSet {
        match self {
            Roster::Providers => MemberSet::Providers,
            Roster::Resolvers => MemberSet::Resolvers,
        }
    }

    fn permission(self, op: SetOp, ein: Ein, members: &[Address], nonce: u64) -> Permission<'_> {
        match (self, op) {
            (Roster::Providers, SetOp::Add) => Permission::AddProviders {
                ein,
                providers: members,
                nonce,
            },
            (Roster::Providers, SetOp::Remove) => Permission::RemoveProviders {
                ein,
                providers: members,
                nonce,
            },
            (Roster::Resolvers, SetOp::Add) => Permission::AddResolvers {
                ein,
                resolvers: members,
                nonce,
            },
            (Roster::Resolvers, SetOp::Remove) => Permission::RemoveResolvers {
                ein,
                resolvers: members,
                nonce,
            },
        }
    }

    fn event(
        self,
        op: SetOp,
        initiator: Address,
        ein: Ein,
        member: Address,
        delegated: bool,
    ) -> RegistryEvent {
        match (self, op) {
            (Roster::Providers, SetOp::Add) => RegistryEvent::ProviderAdded {
                initiator,
                ein,
                provider: member,
                delegated,
            },
            (Roster::Providers, SetOp::Remove) => RegistryEvent::ProviderRemoved {
                initiator,
                ein,
                provider: member,
                delegated,
            },
            (Roster::Resolvers, SetOp::Add) => RegistryEvent::ResolverAdded {
                initiator,
                ein,
                resolver: member,
                delegated,
            },
            (Roster::Resolvers, SetOp::Remove) => RegistryEvent::ResolverRemoved {
                initiator,
                ein,
                resolver: member,
                delegated,
            },
        }
    }
}

impl IdentityRegistry {
    // -- associated addresses -----------------------------------------------

    /// Adds `address_to_add` to the identity of `approving_address`.
    ///
    /// The caller must be one of the two parties; the other one's signature
    /// comes along. If the caller approves, `address_to_add` must have
    /// signed AcceptAddress; if the caller is joining, `approving_address`
    /// must have signed ApproveAddress.
    pub fn add_associated_address(
        &mut self,
        ctx: &CallContext,
        approving_address: Address,
        address_to_add: Address,
        signature: RecoverableSignature,
        timestamp: u64,
    ) -> Result<(), RegistryError> {
        let freshness = Freshness::Timestamp(timestamp);
        let (approval, acceptance) = if ctx.caller == approving_address {
            (
                Authorization::DirectCaller(ctx.caller),
                Authorization::DelegatedSignature {
                    signer: address_to_add,
                    signature,
                    freshness,
                },
            )
        } else if ctx.caller == address_to_add {
            (
                Authorization::DelegatedSignature {
                    signer: approving_address,
                    signature,
                    freshness,
                },
                Authorization::DirectCaller(ctx.caller),
            )
        } else {
            return Err(RegistryError::NotAParty);
        };
        self.add_address(ctx, approval, acceptance)
    }

    /// Adds `address_to_add` with both parties' signatures. Anyone may relay.
    pub fn add_associated_address_delegated(
        &mut self,
        ctx: &CallContext,
        approving_address: Address,
        address_to_add: Address,
        approving_signature: RecoverableSignature,
        accepting_signature: RecoverableSignature,
        timestamp: u64,
    ) -> Result<(), RegistryError> {
        let freshness = Freshness::Timestamp(timestamp);
        self.add_address(
            ctx,
            Authorization::DelegatedSignature {
                signer: approving_address,
                signature: approving_signature,
                freshness,
            },
            Authorization::DelegatedSignature {
                signer: address_to_add,
                signature: accepting_signature,
                freshness,
            },
        )
    }

    fn add_address(
        &mut self,
        ctx: &CallContext,
        approval: Authorization,
        acceptance: Authorization,
    ) -> Result<(), RegistryError> {
        let approving = approval.party();
        let to_add = acceptance.party();
        let ein = self.get_ein(&approving)?;

        let approval_ticket = self.open(ctx, &approval, Some(ein), |timestamp| {
            Permission::ApproveAddress {
                ein,
                address: to_add,
                timestamp,
            }
        })?;
        let acceptance_ticket = self.open(ctx, &acceptance, Some(ein), |timestamp| {
            Permission::AcceptAddress {
                ein,
                address: to_add,
                timestamp,
            }
        })?;

        if to_add.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        if self.has_identity(&to_add) {
            return Err(RegistryError::AddressHasIdentity(to_add));
        }
        self.check_consent(&approval, &approving, approval_ticket.as_ref())?;
        self.check_consent(&acceptance, &to_add, acceptance_ticket.as_ref())?;

        self.identity_mut(ein)?
            .associated
            .insert(to_add)
            .map_err(|e| RegistryError::from_set(MemberSet::AssociatedAddresses, e))?;

        // Commit.
        self.consume(ctx, approval_ticket);
        self.consume(ctx, acceptance_ticket);
        self.directory.insert(to_add, ein);

        let delegated = approval.is_delegated() && acceptance.is_delegated();
        info!(ein = %ein, approving = %approving, added = %to_add, delegated, "associated address added");
        self.emit(RegistryEvent::AssociatedAddressAdded {
            initiator: ctx.caller,
            ein,
            approving_address: approving,
            added_address: to_add,
            delegated,
        });
        Ok(())
    }

    /// Removes the caller from its identity.
    pub fn remove_associated_address(&mut self, ctx: &CallContext) -> Result<(), RegistryError> {
        self.remove_address(ctx, Authorization::DirectCaller(ctx.caller))
    }

    /// Removes `address_to_remove`, which signed RemoveAddress at `timestamp`.
    pub fn remove_associated_address_delegated(
        &mut self,
        ctx: &CallContext,
        address_to_remove: Address,
        signature: RecoverableSignature,
        timestamp: u64,
    ) -> Result<(), RegistryError> {
        self.remove_address(
            ctx,
            Authorization::DelegatedSignature {
                signer: address_to_remove,
                signature,
                freshness: Freshness::Timestamp(timestamp),
            },
        )
    }

    fn remove_address(&mut self, ctx: &CallContext, auth: Authorization) -> Result<(), RegistryError> {
        let address = auth.party();
        let ein = self.get_ein(&address)?;
        let ticket = self.open(ctx, &auth, Some(ein), |timestamp| Permission::RemoveAddress {
            ein,
            address,
            timestamp,
        })?;

        if self.identity(ein)?.associated.len() <= 1 {
            return Err(RegistryError::LastAssociatedAddress);
        }
        self.check_consent(&auth, &address, ticket.as_ref())?;

        // Commit.
        self.identity_mut(ein)?.associated.remove(&address);
        self.directory.remove(&address);
        self.consume(ctx, ticket);

        info!(ein = %ein, removed = %address, delegated = auth.is_delegated(), "associated address removed");
        self.emit(RegistryEvent::AssociatedAddressRemoved {
            initiator: ctx.caller,
            ein,
            removed_address: address,
            delegated: auth.is_delegated(),
        });
        Ok(())
    }

    // -- providers ----------------------------------------------------------

    /// Adds providers to the caller's identity.
    pub fn add_providers(&mut self, ctx: &CallContext, providers: &[Address]) -> Result<(), RegistryError> {
        self.edit_direct(ctx, Roster::Providers, SetOp::Add, providers)
    }

    /// Removes providers from the caller's identity.
    pub fn remove_providers(&mut self, ctx: &CallContext, providers: &[Address]) -> Result<(), RegistryError> {
        self.edit_direct(ctx, Roster::Providers, SetOp::Remove, providers)
    }

    /// Adds providers to `ein`, relayed by one of its providers.
    pub fn add_providers_for(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        approving_address: Address,
        providers: &[Address],
        signature: RecoverableSignature,
        nonce: u64,
    ) -> Result<(), RegistryError> {
        self.edit_delegated(
            ctx,
            ein,
            Roster::Providers,
            SetOp::Add,
            providers,
            approving_address,
            signature,
            nonce,
        )
    }

    /// Removes providers from `ein`, relayed by one of its providers.
    pub fn remove_providers_for(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        approving_address: Address,
        providers: &[Address],
        signature: RecoverableSignature,
        nonce: u64,
    ) -> Result<(), RegistryError> {
        self.edit_delegated(
            ctx,
            ein,
            Roster::Providers,
            SetOp::Remove,
            providers,
            approving_address,
            signature,
            nonce,
        )
    }

    // -- resolvers ----------------------------------------------------------

    pub fn add_resolvers(&mut self, ctx: &CallContext, resolvers: &[Address]) -> Result<(), RegistryError> {
        self.edit_direct(ctx, Roster::Resolvers, SetOp::Add, resolvers)
    }

    pub fn remove_resolvers(&mut self, ctx: &CallContext, resolvers: &[Address]) -> Result<(), RegistryError> {
        self.edit_direct(ctx, Roster::Resolvers, SetOp::Remove, resolvers)
    }

    pub fn add_resolvers_for(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        approving_address: Address,
        resolvers: &[Address],
        signature: RecoverableSignature,
        nonce: u64,
    ) -> Result<(), RegistryError> {
        self.edit_delegated(
            ctx,
            ein,
            Roster::Resolvers,
            SetOp::Add,
            resolvers,
            approving_address,
            signature,
            nonce,
        )
    }

    pub fn remove_resolvers_for(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        approving_address: Address,
        resolvers: &[Address],
        signature: RecoverableSignature,
        nonce: u64,
    ) -> Result<(), RegistryError> {
        self.edit_delegated(
            ctx,
            ein,
            Roster::Resolvers,
            SetOp::Remove,
            resolvers,
            approving_address,
            signature,
            nonce,
        )
    }

    // -- shared batch edit --------------------------------------------------

    fn edit_direct(
        &mut self,
        ctx: &CallContext,
        roster: Roster,
        op: SetOp,
        members: &[Address],
    ) -> Result<(), RegistryError> {
        let ein = self.get_ein(&ctx.caller)?;
        self.edit_members(ctx, ein, roster, op, members, Authorization::DirectCaller(ctx.caller))
    }

    #[allow(clippy::too_many_arguments)]
    fn edit_delegated(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        roster: Roster,
        op: SetOp,
        members: &[Address],
        approving_address: Address,
        signature: RecoverableSignature,
        nonce: u64,
    ) -> Result<(), RegistryError> {
        self.edit_members(
            ctx,
            ein,
            roster,
            op,
            members,
            Authorization::DelegatedSignature {
                signer: approving_address,
                signature,
                freshness: Freshness::Nonce(nonce),
            },
        )
    }

    fn edit_members(
        &mut self,
        ctx: &CallContext,
        ein: Ein,
        roster: Roster,
        op: SetOp,
        members: &[Address],
        auth: Authorization,
    ) -> Result<(), RegistryError> {
        self.identity(ein)?;
        let ticket = self.open(ctx, &auth, Some(ein), |nonce| roster.permission(op, ein, members, nonce))?;

        let identity = self.identity(ein)?;
        // Delegated edits may only be relayed by a provider.
        if auth.is_delegated() && !identity.providers.contains(&ctx.caller) {
            return Err(RegistryError::NotProvider {
                ein,
                address: ctx.caller,
            });
        }
        let party = auth.party();
        if !identity.associated.contains(&party) {
            return Err(RegistryError::NotAssociatedAddress { ein, address: party });
        }
        self.check_consent(&auth, &party, ticket.as_ref())?;

        let mut staged: AddressSet = match roster {
            Roster::Providers => identity.providers.clone(),
            Roster::Resolvers => identity.resolvers.clone(),
        };
        let mut changed = Vec::with_capacity(members.len());
        for member in members {
            match op {
                SetOp::Add => {
                    staged
                        .insert(*member)
                        .map_err(|e| RegistryError::from_set(roster.set(), e))?;
                    changed.push(*member);
                }
                SetOp::Remove => {
                    if staged.remove(member) {
                        changed.push(*member);
                    }
                }
            }
        }

        // Commit.
        let identity = self.identity_mut(ein)?;
        match roster {
            Roster::Providers => identity.providers = staged,
            Roster::Resolvers => identity.resolvers = staged,
        }
        self.consume(ctx, ticket);

        let delegated = auth.is_delegated();
        info!(
            ein = %ein,
            set = %roster.set(),
            op = ?op,
            changed = changed.len(),
            delegated,
            "member set edited"
        );
        for member in changed {
            self.emit(roster.event(op, ctx.caller, ein, member, delegated));
        }
        Ok(())
    }
}
