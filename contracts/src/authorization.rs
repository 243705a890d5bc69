//! # Authorization
//!
//! Every mutating registry call is authorized one of two ways:
//!
//! - **DirectCaller** — the address submitting the call is the party whose
//!   consent is needed. Nothing else to check.
//! - **DelegatedSignature** — the party signed a permission digest and
//!   somebody else is submitting it. The signature must recover to the
//!   party, and its freshness token must pass.
//!
//! The registry checks both shapes through one path, so the "self" and
//! "delegated" forms of an entry point share all their logic.
//!
//! ## Replay protection
//!
//! Timestamp-class permissions are single-use: the registry remembers every
//! consumed digest until its timestamp drops out of the freshness window,
//! after which the window check alone rejects it. Nonce-class permissions
//! are single-use by construction, since consuming one advances the nonce.

use std::collections::{BTreeMap, HashSet};

use ein_protocol::crypto::RecoverableSignature;
use ein_protocol::identity::{Address, Ein};
use serde::{Deserialize, Serialize};

use crate::registry::RegistryError;

/// Who is submitting a call, and when.
///
/// Stands in for the ledger's transaction sender and block time. The
/// registry never reads a clock of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    /// Unix seconds.
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}

/// The freshness token a delegated permission carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Unix seconds; must fall inside the signature window.
    Timestamp(u64),
    /// Must equal the identity's next action nonce.
    Nonce(u64),
}

/// How one party consents to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    DirectCaller(Address),
    DelegatedSignature {
        signer: Address,
        signature: RecoverableSignature,
        freshness: Freshness,
    },
}

impl Authorization {
    /// The address whose consent this represents.
    pub fn party(&self) -> Address {
        match self {
            Authorization::DirectCaller(caller) => *caller,
            Authorization::DelegatedSignature { signer, .. } => *signer,
        }
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self, Authorization::DelegatedSignature { .. })
    }
}

impl Freshness {
    /// The raw token, as it appears in the permission preimage.
    pub fn value(&self) -> u64 {
        match self {
            Freshness::Timestamp(value) | Freshness::Nonce(value) => *value,
        }
    }
}

/// What a verified delegated authorization uses up once its call commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    /// Remember the digest until `timestamp` leaves the window.
    Timestamp(u64),
    /// Advance this identity's action nonce.
    ActionNonce(Ein),
}

/// A delegated authorization that passed its freshness check, along with
/// the digest its signature must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub(crate) digest: [u8; 32],
    pub(crate) grant: Grant,
}

// ---------------------------------------------------------------------------
// ReplayGuard
// ---------------------------------------------------------------------------

/// Remembers consumed timestamp-class digests while they could still pass
/// the window check.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplayGuard {
    consumed: HashSet<[u8; 32]>,
    by_timestamp: BTreeMap<u64, Vec<[u8; 32]>>,
}

impl ReplayGuard {
    /// Whether `timestamp` is inside `[now - window, now]` and `digest` is
    /// unused.
    pub(crate) fn check(
        &self,
        digest: &[u8; 32],
        timestamp: u64,
        now: u64,
        window: u64,
    ) -> Result<(), RegistryError> {
        if timestamp > now || timestamp < now.saturating_sub(window) {
            return Err(RegistryError::TimestampNotValid);
        }
        if self.consumed.contains(digest) {
            return Err(RegistryError::PermissionReplayed);
        }
        Ok(())
    }

    pub(crate) fn consume(&mut self, digest: [u8; 32], timestamp: u64, now: u64, window: u64) {
        self.prune(now, window);
        if self.consumed.insert(digest) {
            self.by_timestamp.entry(timestamp).or_default().push(digest);
        }
    }

    /// Forgets digests whose timestamp can no longer pass the window check.
    fn prune(&mut self, now: u64, window: u64) {
        let horizon = now.saturating_sub(window);
        let live = self.by_timestamp.split_off(&horizon);
        for digest in std::mem::replace(&mut self.by_timestamp, live)
            .into_values()
            .flatten()
        {
            self.consumed.remove(&digest);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.consumed.len()
    }
}
