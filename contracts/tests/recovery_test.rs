//! Integration tests for the recovery timelock, recovery, and destruction.
//!
//! Walks the full scenario: a recovery address is swapped, the swap locks
//! further swaps, the previous address keeps the right to recover for the
//! length of the timelock, recovery displaces every associated address, and
//! a displaced address can then pull the poison pill.

use ein_contracts::{CallContext, ErrorKind, IdentityRegistry, RecoveryPhase, RegistryError, RegistryEvent};
use ein_protocol::config::RegistryConfig;
use ein_protocol::crypto::{RecoverableSignature, SignatureScheme, SigningKeypair};
use ein_protocol::identity::{Address, Ein};
use ein_protocol::permission::Permission;

const T0: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

struct Scenario {
    registry: IdentityRegistry,
    ein: Ein,
    first: SigningKeypair,
    second: SigningKeypair,
    recovery: Address,
    timelock: u64,
}

/// An identity with two associated addresses, one provider, and one resolver.
fn scenario() -> Scenario {
    let mut registry =
        IdentityRegistry::new(RegistryConfig::for_registry(addr(0xEE))).expect("valid config");
    let first = SigningKeypair::generate();
    let second = SigningKeypair::generate();
    let recovery = addr(0xB1);

    let ein = registry
        .create_identity(&CallContext::new(first.address(), T0), recovery, &[addr(0x50)], &[addr(0x60)])
        .unwrap();

    let accept = registry.codec().digest(&Permission::AcceptAddress {
        ein,
        address: second.address(),
        timestamp: T0,
    });
    registry
        .add_associated_address(
            &CallContext::new(first.address(), T0),
            first.address(),
            second.address(),
            second.sign_hash(&accept, SignatureScheme::Raw),
            T0,
        )
        .unwrap();
    registry.take_events();

    let timelock = registry.config().recovery_timelock_secs;
    Scenario {
        registry,
        ein,
        first,
        second,
        recovery,
        timelock,
    }
}

fn recover_signature(
    registry: &IdentityRegistry,
    ein: Ein,
    new_address: &SigningKeypair,
    timestamp: u64,
) -> RecoverableSignature {
    let digest = registry.codec().digest(&Permission::Recover {
        ein,
        new_address: new_address.address(),
        timestamp,
    });
    new_address.sign_hash(&digest, SignatureScheme::PersonalMessage)
}

// ---------------------------------------------------------------------------
// Recovery Address Timelock
// ---------------------------------------------------------------------------

#[test]
fn recovery_address_change_locks_for_timelock() {
    let mut s = scenario();
    let owner = CallContext::new(s.first.address(), T0 + 10);
    let r2 = addr(0xB2);

    s.registry
        .initiate_recovery_address_change(&owner, r2)
        .unwrap();
    assert_eq!(s.registry.get_details(s.ein).unwrap().recovery_address, r2);
    assert_eq!(
        s.registry.recovery_phase(s.ein, T0 + 11).unwrap(),
        RecoveryPhase::ChangePending {
            previous_recovery_address: s.recovery,
            countermand_until: T0 + 10 + s.timelock,
        }
    );

    let again = CallContext::new(s.second.address(), T0 + 11);
    let err = s
        .registry
        .initiate_recovery_address_change(&again, addr(0xB3))
        .unwrap_err();
    assert_eq!(err, RegistryError::RecoveryAddressChangePending);
    assert_eq!(err.kind(), ErrorKind::Timelock);
    assert_eq!(err.to_string(), "Cannot trigger a change in recovery address yet.");

    // Providers are held to the same lock.
    let provider = CallContext::new(addr(0x50), T0 + 12);
    assert_eq!(
        s.registry
            .trigger_recovery_address_change_for(&provider, s.ein, addr(0xB3)),
        Err(RegistryError::RecoveryAddressChangePending)
    );

    let later = T0 + 10 + s.timelock + 1;
    assert_eq!(s.registry.recovery_phase(s.ein, later).unwrap(), RecoveryPhase::Stable);
    s.registry
        .trigger_recovery_address_change_for(&CallContext::new(addr(0x50), later), s.ein, addr(0xB3))
        .unwrap();
    assert_eq!(s.registry.get_details(s.ein).unwrap().recovery_address, addr(0xB3));
}

#[test]
fn timelock_elapses_exactly_at_its_end() {
    let mut s = scenario();
    let r2 = addr(0xB2);
    s.registry
        .initiate_recovery_address_change(&CallContext::new(s.first.address(), T0 + 10), r2)
        .unwrap();
    let end = T0 + 10 + s.timelock;

    // One second before the end the change is still pending.
    assert!(matches!(
        s.registry.recovery_phase(s.ein, end - 1).unwrap(),
        RecoveryPhase::ChangePending { .. }
    ));
    assert_eq!(
        s.registry
            .trigger_recovery_address_change_for(&CallContext::new(addr(0x50), end - 1), s.ein, addr(0xB3)),
        Err(RegistryError::RecoveryAddressChangePending)
    );

    // At the end the current recovery address is in charge.
    assert_eq!(s.registry.recovery_phase(s.ein, end).unwrap(), RecoveryPhase::Stable);
    let fresh = SigningKeypair::generate();
    let signature = recover_signature(&s.registry, s.ein, &fresh, end);
    assert_eq!(
        s.registry
            .trigger_recovery(&CallContext::new(s.recovery, end), s.ein, fresh.address(), signature, end),
        Err(RegistryError::OnlyCurrentRecoveryAddress)
    );
    s.registry
        .trigger_recovery(&CallContext::new(r2, end), s.ein, fresh.address(), signature, end)
        .unwrap();
    assert_eq!(s.registry.get_details(s.ein).unwrap().recovery_address, r2);
}

#[test]
fn new_change_allowed_exactly_at_timelock_end() {
    let mut s = scenario();
    s.registry
        .initiate_recovery_address_change(&CallContext::new(s.first.address(), T0 + 10), addr(0xB2))
        .unwrap();

    let end = T0 + 10 + s.timelock;
    s.registry
        .initiate_recovery_address_change(&CallContext::new(s.second.address(), end), addr(0xB3))
        .unwrap();
    assert_eq!(
        s.registry.recovery_phase(s.ein, end + 1).unwrap(),
        RecoveryPhase::ChangePending {
            previous_recovery_address: addr(0xB2),
            countermand_until: end + s.timelock,
        }
    );
}

#[test]
fn previous_recovery_address_recovers_inside_timelock() {
    let mut s = scenario();
    s.registry
        .initiate_recovery_address_change(&CallContext::new(s.first.address(), T0 + 1), addr(0xB2))
        .unwrap();

    let t = T0 + s.timelock;
    let fresh = SigningKeypair::generate();
    let signature = recover_signature(&s.registry, s.ein, &fresh, t);
    s.registry
        .trigger_recovery(&CallContext::new(s.recovery, t), s.ein, fresh.address(), signature, t)
        .unwrap();

    let details = s.registry.get_details(s.ein).unwrap();
    assert_eq!(details.associated_addresses, vec![fresh.address()]);
    assert!(details.providers.is_empty());
    // The countermanding address takes the recovery address back.
    assert_eq!(details.recovery_address, s.recovery);
}

#[test]
fn non_provider_cannot_change_recovery_address() {
    let mut s = scenario();
    let stranger = CallContext::new(addr(0x77), T0 + 1);
    assert!(matches!(
        s.registry
            .trigger_recovery_address_change_for(&stranger, s.ein, addr(0xB2)),
        Err(RegistryError::NotProvider { .. })
    ));
    assert_eq!(s.registry.get_details(s.ein).unwrap().recovery_address, s.recovery);
}

// ---------------------------------------------------------------------------
// Full Recovery Scenario
// ---------------------------------------------------------------------------

#[test]
fn recovery_then_poison_pill() {
    let mut s = scenario();
    let r2 = addr(0xB2);
    let fresh = SigningKeypair::generate();

    // R -> R2.
    s.registry
        .initiate_recovery_address_change(&CallContext::new(s.first.address(), T0 + 1), r2)
        .unwrap();

    // Inside the timelock only the previous recovery address may recover.
    let t = T0 + DAY;
    let signature = recover_signature(&s.registry, s.ein, &fresh, t);
    assert_eq!(
        s.registry
            .trigger_recovery(&CallContext::new(r2, t), s.ein, fresh.address(), signature, t),
        Err(RegistryError::OnlyPreviousRecoveryAddress)
    );

    // The previous address may recover only while the timelock runs. Once
    // it has run out, R can recover again only by becoming the current
    // recovery address; see `previous_recovery_address_recovers_inside_timelock`
    // for R recovering directly.
    let t = T0 + 1 + s.timelock + 1;
    let signature = recover_signature(&s.registry, s.ein, &fresh, t);
    assert_eq!(
        s.registry
            .trigger_recovery(&CallContext::new(s.recovery, t), s.ein, fresh.address(), signature, t),
        Err(RegistryError::OnlyCurrentRecoveryAddress)
    );

    // R2 -> R. Now R2 is the previous recovery address and may recover.
    s.registry
        .initiate_recovery_address_change(&CallContext::new(s.second.address(), t), s.recovery)
        .unwrap();
    let displaced = s
        .registry
        .trigger_recovery(&CallContext::new(r2, t + 5), s.ein, fresh.address(), signature, t)
        .unwrap();

    let mut expected = vec![s.first.address(), s.second.address()];
    let mut got = displaced.clone();
    expected.sort();
    got.sort();
    assert_eq!(got, expected);

    let details = s.registry.get_details(s.ein).unwrap();
    assert_eq!(details.associated_addresses, vec![fresh.address()]);
    assert_eq!(details.recovery_address, r2);
    assert!(details.providers.is_empty());
    assert_eq!(details.resolvers, vec![addr(0x60)]);
    assert!(!s.registry.has_identity(&s.first.address()));
    assert!(!s.registry.has_identity(&s.second.address()));

    let events = s.registry.take_events();
    assert!(matches!(
        events.last(),
        Some(RegistryEvent::RecoveryTriggered { initiator, .. }) if *initiator == r2
    ));

    // A second recovery may not overwrite the displaced set.
    let other = SigningKeypair::generate();
    let t2 = t + DAY;
    let signature = recover_signature(&s.registry, s.ein, &other, t2);
    assert_eq!(
        s.registry
            .trigger_recovery(&CallContext::new(r2, t2), s.ein, other.address(), signature, t2),
        Err(RegistryError::RecoveryCooldown)
    );

    // The recovered-to address was never displaced.
    let outsider = CallContext::new(fresh.address(), t2);
    assert_eq!(
        s.registry
            .trigger_destruction(&outsider, s.ein, &[s.first.address()], &[], true),
        Err(RegistryError::NotRecentlyDisplaced)
    );

    // A displaced address names itself in the middle of the displaced set.
    let pill = CallContext::new(s.second.address(), t2);
    s.registry
        .trigger_destruction(&pill, s.ein, &[s.first.address()], &[], false)
        .unwrap();

    assert!(!s.registry.identity_exists(s.ein));
    assert_eq!(
        s.registry.get_details(s.ein),
        Err(RegistryError::IdentityNotFound(s.ein))
    );
    assert!(!s.registry.has_identity(&fresh.address()));
    // Resolvers were kept, but a destroyed identity answers no membership
    // queries.
    assert!(!s.registry.is_resolver_for(s.ein, &addr(0x60)));
    assert!(!s.registry.is_address_for(s.ein, &fresh.address()));
    assert!(!s.registry.is_provider_for(s.ein, &addr(0x50)));
    assert!(matches!(
        s.registry.take_events().as_slice(),
        [RegistryEvent::IdentityDestroyed { resolvers_cleared: false, .. }]
    ));

    // The EIN is gone for good; the freed address starts over elsewhere.
    let reborn = s
        .registry
        .create_identity(&CallContext::new(fresh.address(), t2), r2, &[], &[])
        .unwrap();
    assert!(reborn > s.ein);
}

#[test]
fn destruction_window_closes() {
    let mut s = scenario();
    let fresh = SigningKeypair::generate();
    let signature = recover_signature(&s.registry, s.ein, &fresh, T0 + 1);
    s.registry
        .trigger_recovery(&CallContext::new(s.recovery, T0 + 1), s.ein, fresh.address(), signature, T0 + 1)
        .unwrap();

    // The window is half-open: exactly one timelock later it has closed.
    let end = T0 + 1 + s.timelock;
    let late = CallContext::new(s.first.address(), end);
    let err = s
        .registry
        .trigger_destruction(&late, s.ein, &[], &[s.second.address()], true)
        .unwrap_err();
    assert_eq!(err, RegistryError::NoRecentRecovery);
    assert!(s.registry.identity_exists(s.ein));

    // The cooldown on a second recovery ends at the same instant.
    let again = SigningKeypair::generate();
    let signature = recover_signature(&s.registry, s.ein, &again, end);
    s.registry
        .trigger_recovery(&CallContext::new(s.recovery, end), s.ein, again.address(), signature, end)
        .unwrap();
    assert_eq!(
        s.registry.get_details(s.ein).unwrap().associated_addresses,
        vec![again.address()]
    );
}

#[test]
fn destruction_allowed_until_the_window_closes() {
    let mut s = scenario();
    let fresh = SigningKeypair::generate();
    let signature = recover_signature(&s.registry, s.ein, &fresh, T0 + 1);
    s.registry
        .trigger_recovery(&CallContext::new(s.recovery, T0 + 1), s.ein, fresh.address(), signature, T0 + 1)
        .unwrap();

    let last = CallContext::new(s.first.address(), T0 + 1 + s.timelock - 1);
    s.registry
        .trigger_destruction(&last, s.ein, &[], &[s.second.address()], true)
        .unwrap();
    assert!(!s.registry.identity_exists(s.ein));
    assert!(!s.registry.is_resolver_for(s.ein, &addr(0x60)));
}

#[test]
fn destruction_claims_must_match_exactly() {
    let mut s = scenario();
    let fresh = SigningKeypair::generate();
    let signature = recover_signature(&s.registry, s.ein, &fresh, T0 + 1);
    s.registry
        .trigger_recovery(&CallContext::new(s.recovery, T0 + 1), s.ein, fresh.address(), signature, T0 + 1)
        .unwrap();

    let ctx = CallContext::new(s.first.address(), T0 + 2);
    // Missing one displaced address.
    assert_eq!(
        s.registry.trigger_destruction(&ctx, s.ein, &[], &[], true),
        Err(RegistryError::NotRecentlyDisplaced)
    );
    // The caller listed twice.
    assert_eq!(
        s.registry
            .trigger_destruction(&ctx, s.ein, &[s.first.address()], &[], true),
        Err(RegistryError::NotRecentlyDisplaced)
    );
    // Order of the chunks does not matter.
    s.registry
        .trigger_destruction(&ctx, s.ein, &[], &[s.second.address()], true)
        .unwrap();
    assert!(!s.registry.identity_exists(s.ein));
}

#[test]
fn recovery_refused_when_new_address_is_taken() {
    let mut s = scenario();
    let fresh = SigningKeypair::generate();
    let signature = recover_signature(&s.registry, s.ein, &fresh, T0 + 1);
    let ctx = CallContext::new(s.recovery, T0 + 1);

    s.registry
        .create_identity(&CallContext::new(fresh.address(), T0 + 1), addr(9), &[], &[])
        .unwrap();
    assert_eq!(
        s.registry
            .trigger_recovery(&ctx, s.ein, fresh.address(), signature, T0 + 1),
        Err(RegistryError::AddressHasIdentity(fresh.address()))
    );
    assert_eq!(s.registry.get_details(s.ein).unwrap().associated_addresses.len(), 2);
}
