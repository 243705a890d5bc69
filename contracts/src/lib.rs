// Copyright (c) 2026 EIN Registry Contributors. MIT License.
// See LICENSE for details.

//! # EIN Identity Registry
//!
//! The registry state machine: who controls which identity, who may act
//! for it, and how control is won back when keys are lost or stolen.
//!
//! - **Address Set** — capacity-bounded membership sets with O(1) insert,
//!   swap-remove, and lookup.
//! - **Authorization** — one path for both direct callers and relayed
//!   signatures, with timestamp windows and nonces against replay.
//! - **Registry** — creation, membership, providers and resolvers, the
//!   recovery timelock, recovery, and destruction.
//! - **Call** — the signed envelope a host uses to submit calls.
//!
//! ## Design Principles
//!
//! 1. A refused call changes nothing. Every precondition is checked before
//!    the first write.
//! 2. A signature authorizes one intent once.
//! 3. The registry never reads a clock; time comes in with the call.
//! 4. Every refusal names its reason, and every reason has a kind.

pub mod address_set;
pub mod authorization;
pub mod call;
pub mod registry;

pub use address_set::{AddressSet, AddressSetError};
pub use authorization::{Authorization, CallContext, Freshness};
pub use call::{CallError, CallOutcome, RegistryCall, SignedCall};
pub use registry::{
    ErrorKind, IdentityDetails, IdentityRegistry, MemberSet, RecoveryPhase, RegistryError,
    RegistryEvent,
};
