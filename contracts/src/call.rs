//! # Signed Calls
//!
//! The envelope a host uses to submit registry calls on a sender's behalf.
//!
//! A [`RegistryCall`] names one mutating entry point and its arguments. A
//! [`SignedCall`] wraps it with the sender's address, the sender's call
//! nonce, and a signature over a SubmitCall permission binding all three
//! (the call by the Keccak-256 hash of its bincode encoding). Once the host
//! has checked the signature and the nonce, the sender becomes the call's
//! `caller`.

use ein_protocol::crypto::{is_signed, keccak256, RecoverableSignature, SignatureScheme, SigningKeypair};
use ein_protocol::identity::{Address, Ein};
use ein_protocol::permission::{Permission, PermissionCodec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authorization::CallContext;
use crate::registry::{IdentityRegistry, RegistryError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while building or checking a [`SignedCall`].
#[derive(Debug, Error)]
pub enum CallError {
    /// The call could not be encoded for hashing.
    #[error("call encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    /// The envelope signature does not recover to `from`.
    #[error("call signature does not match sender {0}")]
    BadSignature(Address),
}

// ---------------------------------------------------------------------------
// RegistryCall
// ---------------------------------------------------------------------------

/// Every mutating registry entry point, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryCall {
    CreateIdentity {
        recovery_address: Address,
        providers: Vec<Address>,
        resolvers: Vec<Address>,
    },
    CreateIdentityDelegated {
        recovery_address: Address,
        associated_address: Address,
        providers: Vec<Address>,
        resolvers: Vec<Address>,
        signature: RecoverableSignature,
        timestamp: u64,
    },
    AddAssociatedAddress {
        approving_address: Address,
        address_to_add: Address,
        signature: RecoverableSignature,
        timestamp: u64,
    },
    AddAssociatedAddressDelegated {
        approving_address: Address,
        address_to_add: Address,
        approving_signature: RecoverableSignature,
        accepting_signature: RecoverableSignature,
        timestamp: u64,
    },
    RemoveAssociatedAddress,
    RemoveAssociatedAddressDelegated {
        address_to_remove: Address,
        signature: RecoverableSignature,
        timestamp: u64,
    },
    AddProviders {
        providers: Vec<Address>,
    },
    AddProvidersFor {
        ein: Ein,
        approving_address: Address,
        providers: Vec<Address>,
        signature: RecoverableSignature,
        nonce: u64,
    },
    RemoveProviders {
        providers: Vec<Address>,
    },
    RemoveProvidersFor {
        ein: Ein,
        approving_address: Address,
        providers: Vec<Address>,
        signature: RecoverableSignature,
        nonce: u64,
    },
    AddResolvers {
        resolvers: Vec<Address>,
    },
    AddResolversFor {
        ein: Ein,
        approving_address: Address,
        resolvers: Vec<Address>,
        signature: RecoverableSignature,
        nonce: u64,
    },
    RemoveResolvers {
        resolvers: Vec<Address>,
    },
    RemoveResolversFor {
        ein: Ein,
        approving_address: Address,
        resolvers: Vec<Address>,
        signature: RecoverableSignature,
        nonce: u64,
    },
    InitiateRecoveryAddressChange {
        new_recovery_address: Address,
    },
    TriggerRecoveryAddressChangeFor {
        ein: Ein,
        new_recovery_address: Address,
    },
    TriggerRecovery {
        ein: Ein,
        new_associated_address: Address,
        signature: RecoverableSignature,
        timestamp: u64,
    },
    TriggerDestruction {
        ein: Ein,
        first_chunk: Vec<Address>,
        last_chunk: Vec<Address>,
        clear_resolvers: bool,
    },
}

/// What a committed call produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    /// A new identity was created.
    Created { ein: Ein },
    /// A recovery displaced these addresses.
    Recovered { displaced: Vec<Address> },
    /// Anything else.
    Committed,
}

impl RegistryCall {
    /// The entry point's name, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            RegistryCall::CreateIdentity { .. } => "create_identity",
            RegistryCall::CreateIdentityDelegated { .. } => "create_identity_delegated",
            RegistryCall::AddAssociatedAddress { .. } => "add_associated_address",
            RegistryCall::AddAssociatedAddressDelegated { .. } => "add_associated_address_delegated",
            RegistryCall::RemoveAssociatedAddress => "remove_associated_address",
            RegistryCall::RemoveAssociatedAddressDelegated { .. } => {
                "remove_associated_address_delegated"
            }
            RegistryCall::AddProviders { .. } => "add_providers",
            RegistryCall::AddProvidersFor { .. } => "add_providers_for",
            RegistryCall::RemoveProviders { .. } => "remove_providers",
            RegistryCall::RemoveProvidersFor { .. } => "remove_providers_for",
            RegistryCall::AddResolvers { .. } => "add_resolvers",
            RegistryCall::AddResolversFor { .. } => "add_resolvers_for",
            RegistryCall::RemoveResolvers { .. } => "remove_resolvers",
            RegistryCall::RemoveResolversFor { .. } => "remove_resolvers_for",
            RegistryCall::InitiateRecoveryAddressChange { .. } => {
                "initiate_recovery_address_change"
            }
            RegistryCall::TriggerRecoveryAddressChangeFor { .. } => {
                "trigger_recovery_address_change_for"
            }
            RegistryCall::TriggerRecovery { .. } => "trigger_recovery",
            RegistryCall::TriggerDestruction { .. } => "trigger_destruction",
        }
    }

    /// Runs the call against `registry` as `ctx.caller`.
    pub fn execute(
        &self,
        registry: &mut IdentityRegistry,
        ctx: &CallContext,
    ) -> Result<CallOutcome, RegistryError> {
        use RegistryCall::*;
        match self {
            CreateIdentity {
                recovery_address,
                providers,
                resolvers,
            } => registry
                .create_identity(ctx, *recovery_address, providers, resolvers)
                .map(|ein| CallOutcome::Created { ein }),
            CreateIdentityDelegated {
                recovery_address,
                associated_address,
                providers,
                resolvers,
                signature,
                timestamp,
            } => registry
                .create_identity_delegated(
                    ctx,
                    *recovery_address,
                    *associated_address,
                    providers,
                    resolvers,
                    *signature,
                    *timestamp,
                )
                .map(|ein| CallOutcome::Created { ein }),
            AddAssociatedAddress {
                approving_address,
                address_to_add,
                signature,
                timestamp,
            } => registry
                .add_associated_address(ctx, *approving_address, *address_to_add, *signature, *timestamp)
                .map(|()| CallOutcome::Committed),
            AddAssociatedAddressDelegated {
                approving_address,
                address_to_add,
                approving_signature,
                accepting_signature,
                timestamp,
            } => registry
                .add_associated_address_delegated(
                    ctx,
                    *approving_address,
                    *address_to_add,
                    *approving_signature,
                    *accepting_signature,
                    *timestamp,
                )
                .map(|()| CallOutcome::Committed),
            RemoveAssociatedAddress => registry
                .remove_associated_address(ctx)
                .map(|()| CallOutcome::Committed),
            RemoveAssociatedAddressDelegated {
                address_to_remove,
                signature,
                timestamp,
            } => registry
                .remove_associated_address_delegated(ctx, *address_to_remove, *signature, *timestamp)
                .map(|()| CallOutcome::Committed),
            AddProviders { providers } => registry
                .add_providers(ctx, providers)
                .map(|()| CallOutcome::Committed),
            AddProvidersFor {
                ein,
                approving_address,
                providers,
                signature,
                nonce,
            } => registry
                .add_providers_for(ctx, *ein, *approving_address, providers, *signature, *nonce)
                .map(|()| CallOutcome::Committed),
            RemoveProviders { providers } => registry
                .remove_providers(ctx, providers)
                .map(|()| CallOutcome::Committed),
            RemoveProvidersFor {
                ein,
                approving_address,
                providers,
                signature,
                nonce,
            } => registry
                .remove_providers_for(ctx, *ein, *approving_address, providers, *signature, *nonce)
                .map(|()| CallOutcome::Committed),
            AddResolvers { resolvers } => registry
                .add_resolvers(ctx, resolvers)
                .map(|()| CallOutcome::Committed),
            AddResolversFor {
                ein,
                approving_address,
                resolvers,
                signature,
                nonce,
            } => registry
                .add_resolvers_for(ctx, *ein, *approving_address, resolvers, *signature, *nonce)
                .map(|()| CallOutcome::Committed),
            RemoveResolvers { resolvers } => registry
                .remove_resolvers(ctx, resolvers)
                .map(|()| CallOutcome::Committed),
            RemoveResolversFor {
                ein,
                approving_address,
                resolvers,
                signature,
                nonce,
            } => registry
                .remove_resolvers_for(ctx, *ein, *approving_address, resolvers, *signature, *nonce)
                .map(|()| CallOutcome::Committed),
            InitiateRecoveryAddressChange {
                new_recovery_address,
            } => registry
                .initiate_recovery_address_change(ctx, *new_recovery_address)
                .map(|()| CallOutcome::Committed),
            TriggerRecoveryAddressChangeFor {
                ein,
                new_recovery_address,
            } => registry
                .trigger_recovery_address_change_for(ctx, *ein, *new_recovery_address)
                .map(|()| CallOutcome::Committed),
            TriggerRecovery {
                ein,
                new_associated_address,
                signature,
                timestamp,
            } => registry
                .trigger_recovery(ctx, *ein, *new_associated_address, *signature, *timestamp)
                .map(|displaced| CallOutcome::Recovered { displaced }),
            TriggerDestruction {
                ein,
                first_chunk,
                last_chunk,
                clear_resolvers,
            } => registry
                .trigger_destruction(ctx, *ein, first_chunk, last_chunk, *clear_resolvers)
                .map(|()| CallOutcome::Committed),
        }
    }

    /// Keccak-256 of the call's bincode encoding.
    pub fn payload_hash(&self) -> Result<[u8; 32], CallError> {
        Ok(keccak256(&bincode::serialize(self)?))
    }
}

// ---------------------------------------------------------------------------
// SignedCall
// ---------------------------------------------------------------------------

/// A [`RegistryCall`] authenticated by its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCall {
    pub from: Address,
    /// The sender's call nonce; the host accepts each value once, in order.
    pub nonce: u64,
    pub call: RegistryCall,
    pub signature: RecoverableSignature,
}

impl SignedCall {
    /// Signs `call` as `keypair` for the registry at `registry`.
    pub fn sign(
        keypair: &SigningKeypair,
        registry: Address,
        nonce: u64,
        call: RegistryCall,
    ) -> Result<Self, CallError> {
        let from = keypair.address();
        let digest = Self::digest_for(registry, from, nonce, &call)?;
        Ok(Self {
            from,
            nonce,
            call,
            signature: keypair.sign_hash(&digest, SignatureScheme::Raw),
        })
    }

    fn digest_for(
        registry: Address,
        sender: Address,
        nonce: u64,
        call: &RegistryCall,
    ) -> Result<[u8; 32], CallError> {
        let payload_hash = call.payload_hash()?;
        Ok(PermissionCodec::new(registry).digest(&Permission::SubmitCall {
            sender,
            nonce,
            payload_hash,
        }))
    }

    /// The digest the envelope signature covers.
    pub fn digest(&self, registry: Address) -> Result<[u8; 32], CallError> {
        Self::digest_for(registry, self.from, self.nonce, &self.call)
    }

    /// Checks that `from` signed this exact envelope for `registry`.
    ///
    /// The nonce is only bound here; whether it is the sender's next one is
    /// for the host to decide.
    pub fn verify(&self, registry: Address) -> Result<(), CallError> {
        let digest = self.digest(registry)?;
        if is_signed(&self.from, &digest, &self.signature) {
            Ok(())
        } else {
            Err(CallError::BadSignature(self.from))
        }
    }

    /// The context the call runs under once verified.
    pub fn context(&self, timestamp: u64) -> CallContext {
        CallContext::new(self.from, timestamp)
    }
}
