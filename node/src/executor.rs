//! # Call Executor
//!
//! The node's single writer. A [`Ledger`] owns the registry and the
//! per-sender call nonces behind one lock, so calls commit strictly one at
//! a time and every query sees a state between two calls, never inside one.
//!
//! Applying a [`SignedCall`]:
//!
//! 1. Verify the envelope signature (outside the lock).
//! 2. Check `call.nonce == expected nonce of the sender`.
//! 3. Run the call against the registry as the sender, at the current time.
//! 4. On success only: bump the sender's call nonce and drain the events.
//!
//! A refused call leaves both the registry and the nonce untouched.

use std::collections::HashMap;

use chrono::Utc;
use ein_contracts::{CallError, CallOutcome, IdentityRegistry, RegistryError, RegistryEvent, SignedCall};
use ein_protocol::config::{ConfigError, RegistryConfig};
use ein_protocol::identity::Address;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Why a submitted call was refused.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The envelope did not verify.
    #[error(transparent)]
    Envelope(#[from] CallError),

    #[error("call nonce mismatch for {sender}: expected {expected}, got {provided}")]
    BadNonce {
        sender: Address,
        expected: u64,
        provided: u64,
    },

    /// The registry refused the call.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What a committed call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub call: String,
    pub sender: Address,
    pub nonce: u64,
    /// Unix seconds the call ran at.
    pub timestamp: u64,
    pub outcome: CallOutcome,
    pub events: Vec<RegistryEvent>,
}

struct LedgerState {
    registry: IdentityRegistry,
    call_nonces: HashMap<Address, u64>,
}

/// The registry plus call nonces, behind one lock.
pub struct Ledger {
    registry_address: Address,
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new(config: RegistryConfig) -> Result<Self, ConfigError> {
        let registry_address = config.registry_address;
        Ok(Self {
            registry_address,
            state: Mutex::new(LedgerState {
                registry: IdentityRegistry::new(config)?,
                call_nonces: HashMap::new(),
            }),
        })
    }

    pub fn registry_address(&self) -> Address {
        self.registry_address
    }

    /// Applies `call` at the current UTC time.
    pub fn submit(&self, call: SignedCall) -> Result<Receipt, SubmitError> {
        self.submit_at(call, unix_now())
    }

    /// Applies `call` as if it arrived at `timestamp`.
    pub fn submit_at(&self, call: SignedCall, timestamp: u64) -> Result<Receipt, SubmitError> {
        call.verify(self.registry_address)?;

        let mut state = self.state.lock();
        let expected = state.call_nonces.get(&call.from).copied().unwrap_or(0);
        if call.nonce != expected {
            debug!(sender = %call.from, expected, provided = call.nonce, "call nonce mismatch");
            return Err(SubmitError::BadNonce {
                sender: call.from,
                expected,
                provided: call.nonce,
            });
        }

        let ctx = call.context(timestamp);
        let outcome = call.call.execute(&mut state.registry, &ctx).map_err(|e| {
            debug!(sender = %call.from, call = call.call.name(), error = %e, "call refused");
            e
        })?;

        state.call_nonces.insert(call.from, expected + 1);
        let events = state.registry.take_events();
        drop(state);

        info!(
            sender = %call.from,
            nonce = call.nonce,
            call = call.call.name(),
            events = events.len(),
            "call committed"
        );
        Ok(Receipt {
            call: call.call.name().to_string(),
            sender: call.from,
            nonce: call.nonce,
            timestamp,
            outcome,
            events,
        })
    }

    /// The nonce the next call from `sender` must carry.
    pub fn call_nonce(&self, sender: &Address) -> u64 {
        self.state.lock().call_nonces.get(sender).copied().unwrap_or(0)
    }

    /// Runs a read-only query against the registry.
    pub fn read<T>(&self, query: impl FnOnce(&IdentityRegistry) -> T) -> T {
        query(&self.state.lock().registry)
    }
}

/// Current Unix time in whole seconds. Clamps pre-1970 clocks to zero.
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ein_contracts::RegistryCall;
    use ein_protocol::crypto::SigningKeypair;

    const NOW: u64 = 1_700_000_000;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn ledger() -> Ledger {
        Ledger::new(RegistryConfig::for_registry(addr(0xEE))).unwrap()
    }

    fn create(recovery: Address) -> RegistryCall {
        RegistryCall::CreateIdentity {
            recovery_address: recovery,
            providers: vec![],
            resolvers: vec![],
        }
    }

    #[test]
    fn committed_call_bumps_nonce() {
        let ledger = ledger();
        let sender = SigningKeypair::generate();

        let call = SignedCall::sign(&sender, addr(0xEE), 0, create(addr(9))).unwrap();
        let receipt = ledger.submit_at(call, NOW).unwrap();

        assert_eq!(receipt.call, "create_identity");
        assert!(matches!(receipt.outcome, CallOutcome::Created { .. }));
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(ledger.call_nonce(&sender.address()), 1);
        assert!(ledger.read(|r| r.has_identity(&sender.address())));
    }

    #[test]
    fn wrong_nonce_refused() {
        let ledger = ledger();
        let sender = SigningKeypair::generate();

        let call = SignedCall::sign(&sender, addr(0xEE), 3, create(addr(9))).unwrap();
        assert!(matches!(
            ledger.submit_at(call, NOW),
            Err(SubmitError::BadNonce { expected: 0, provided: 3, .. })
        ));
    }

    #[test]
    fn replayed_envelope_refused() {
        let ledger = ledger();
        let sender = SigningKeypair::generate();

        let call = SignedCall::sign(&sender, addr(0xEE), 0, create(addr(9))).unwrap();
        ledger.submit_at(call.clone(), NOW).unwrap();
        assert!(matches!(
            ledger.submit_at(call, NOW + 1),
            Err(SubmitError::BadNonce { expected: 1, provided: 0, .. })
        ));
    }

    #[test]
    fn envelope_for_other_registry_refused() {
        let ledger = ledger();
        let sender = SigningKeypair::generate();

        let call = SignedCall::sign(&sender, addr(0xAA), 0, create(addr(9))).unwrap();
        assert!(matches!(ledger.submit_at(call, NOW), Err(SubmitError::Envelope(_))));
        assert_eq!(ledger.call_nonce(&sender.address()), 0);
    }

    #[test]
    fn registry_refusal_keeps_nonce() {
        let ledger = ledger();
        let sender = SigningKeypair::generate();

        let call = SignedCall::sign(&sender, addr(0xEE), 0, create(Address::ZERO)).unwrap();
        assert!(matches!(
            ledger.submit_at(call, NOW),
            Err(SubmitError::Registry(RegistryError::ZeroAddress))
        ));
        assert_eq!(ledger.call_nonce(&sender.address()), 0);
        assert_eq!(ledger.read(|r| r.live_identities()), 0);
    }
}
