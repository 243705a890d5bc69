//! Integration tests for identity creation and membership.
//!
//! These tests drive the registry the way a host would, through real
//! secp256k1 signatures over real permission digests, and check the global
//! invariants after every step: an address belongs to at most one identity,
//! a refused call changes nothing, and a signature works once.

use ein_contracts::{
    CallContext, ErrorKind, IdentityDetails, IdentityRegistry, RegistryError, RegistryEvent,
};
use ein_protocol::config::RegistryConfig;
use ein_protocol::crypto::{RecoverableSignature, SignatureScheme, SigningKeypair};
use ein_protocol::identity::{Address, Ein};
use ein_protocol::permission::Permission;

const NOW: u64 = 1_700_000_000;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

fn registry() -> IdentityRegistry {
    IdentityRegistry::new(RegistryConfig::for_registry(addr(0xEE))).expect("valid config")
}

fn sign(registry: &IdentityRegistry, keypair: &SigningKeypair, permission: &Permission<'_>) -> RecoverableSignature {
    keypair.sign_hash(&registry.codec().digest(permission), SignatureScheme::PersonalMessage)
}

/// Every associated address maps back to the identity that lists it.
fn assert_directory_consistent(registry: &IdentityRegistry, eins: &[Ein]) {
    for ein in eins {
        if let Ok(details) = registry.get_details(*ein) {
            for address in &details.associated_addresses {
                assert_eq!(registry.get_ein(address), Ok(*ein));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[test]
fn get_details_after_create() {
    let mut registry = registry();
    let a = addr(0xA1);
    let r = addr(0xB1);
    let ein = registry
        .create_identity(&CallContext::new(a, NOW), r, &[], &[])
        .unwrap();

    assert_eq!(
        registry.get_details(ein).unwrap(),
        IdentityDetails {
            ein,
            recovery_address: r,
            associated_addresses: vec![a],
            providers: vec![],
            resolvers: vec![],
        }
    );
    assert!(registry.identity_exists(ein));
    assert!(registry.has_identity(&a));
    assert!(registry.is_address_for(ein, &a));
}

#[test]
fn get_details_is_idempotent() {
    let mut registry = registry();
    let ein = registry
        .create_identity(&CallContext::new(addr(1), NOW), addr(2), &[addr(3)], &[addr(4)])
        .unwrap();
    let first = registry.get_details(ein).unwrap();
    let second = registry.get_details(ein).unwrap();
    assert_eq!(first, second);
}

#[test]
fn delegated_create_by_provider() {
    let mut registry = registry();
    let owner = SigningKeypair::generate();
    let provider = addr(0x50);
    let providers = [provider];

    let signature = sign(
        &registry,
        &owner,
        &Permission::CreateIdentity {
            recovery_address: addr(9),
            associated_address: owner.address(),
            providers: &providers,
            resolvers: &[],
            timestamp: NOW - 60,
        },
    );

    let ein = registry
        .create_identity_delegated(
            &CallContext::new(provider, NOW),
            addr(9),
            owner.address(),
            &providers,
            &[],
            signature,
            NOW - 60,
        )
        .unwrap();

    assert!(registry.is_provider_for(ein, &provider));
    assert_eq!(registry.get_ein(&owner.address()), Ok(ein));

    let events = registry.take_events();
    assert!(matches!(
        events.as_slice(),
        [RegistryEvent::IdentityCreated { delegated: true, initiator, .. }] if *initiator == provider
    ));
}

#[test]
fn timestamp_outside_window_always_fails() {
    let mut registry = registry();
    let owner = SigningKeypair::generate();
    let window = registry.config().signature_timeout_secs;

    for timestamp in [NOW - window - 1, NOW + 1] {
        let signature = sign(
            &registry,
            &owner,
            &Permission::CreateIdentity {
                recovery_address: addr(9),
                associated_address: owner.address(),
                providers: &[],
                resolvers: &[],
                timestamp,
            },
        );
        let err = registry
            .create_identity_delegated(
                &CallContext::new(addr(0x50), NOW),
                addr(9),
                owner.address(),
                &[],
                &[],
                signature,
                timestamp,
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::TimestampNotValid);
        assert_eq!(err.kind(), ErrorKind::Freshness);
    }
    assert!(!registry.has_identity(&owner.address()));
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[test]
fn provider_relays_dual_signed_add_and_replay_fails() {
    let mut registry = registry();
    let owner = SigningKeypair::generate();
    let joiner = SigningKeypair::generate();
    let provider = addr(0x50);

    let ein = registry
        .create_identity(&CallContext::new(owner.address(), NOW), addr(9), &[provider], &[])
        .unwrap();

    let approve = sign(
        &registry,
        &owner,
        &Permission::ApproveAddress {
            ein,
            address: joiner.address(),
            timestamp: NOW,
        },
    );
    let accept = sign(
        &registry,
        &joiner,
        &Permission::AcceptAddress {
            ein,
            address: joiner.address(),
            timestamp: NOW,
        },
    );

    let ctx = CallContext::new(provider, NOW);
    registry
        .add_associated_address_delegated(&ctx, owner.address(), joiner.address(), approve, accept, NOW)
        .unwrap();
    assert!(registry.is_address_for(ein, &joiner.address()));
    assert_eq!(registry.get_ein(&joiner.address()), Ok(ein));

    // The exact same call again is refused as stale, not as a duplicate.
    let replay = CallContext::new(provider, NOW + 5);
    let err = registry
        .add_associated_address_delegated(&replay, owner.address(), joiner.address(), approve, accept, NOW)
        .unwrap_err();
    assert_eq!(err, RegistryError::PermissionReplayed);
    assert_eq!(err.kind(), ErrorKind::Freshness);

    assert_directory_consistent(&registry, &[ein]);
}

#[test]
fn address_cannot_join_two_identities() {
    let mut registry = registry();
    let first = SigningKeypair::generate();
    let second = SigningKeypair::generate();

    let ein_a = registry
        .create_identity(&CallContext::new(first.address(), NOW), addr(9), &[], &[])
        .unwrap();
    let ein_b = registry
        .create_identity(&CallContext::new(second.address(), NOW), addr(9), &[], &[])
        .unwrap();

    // `second` accepts joining identity A, but it already owns B.
    let accept = sign(
        &registry,
        &second,
        &Permission::AcceptAddress {
            ein: ein_a,
            address: second.address(),
            timestamp: NOW,
        },
    );
    assert_eq!(
        registry.add_associated_address(
            &CallContext::new(first.address(), NOW),
            first.address(),
            second.address(),
            accept,
            NOW,
        ),
        Err(RegistryError::AddressHasIdentity(second.address()))
    );
    assert_eq!(registry.get_ein(&second.address()), Ok(ein_b));
    assert_directory_consistent(&registry, &[ein_a, ein_b]);
}

#[test]
fn resolver_grant_cannot_be_relayed_as_provider_grant() {
    let mut registry = registry();
    let owner = SigningKeypair::generate();
    let relayer = addr(0x50);
    let x = [addr(0x42)];

    let signature = sign(
        &registry,
        &owner,
        &Permission::CreateIdentity {
            recovery_address: addr(9),
            associated_address: owner.address(),
            providers: &[],
            resolvers: &x,
            timestamp: NOW,
        },
    );

    // X moved from the resolver list to the provider list.
    let err = registry
        .create_identity_delegated(
            &CallContext::new(relayer, NOW),
            addr(9),
            owner.address(),
            &x,
            &[],
            signature,
            NOW,
        )
        .unwrap_err();
    assert_eq!(err, RegistryError::PermissionDenied);
    assert!(!registry.has_identity(&owner.address()));
    assert!(registry.take_events().is_empty());

    // The signed intent still goes through.
    let ein = registry
        .create_identity_delegated(
            &CallContext::new(relayer, NOW),
            addr(9),
            owner.address(),
            &[],
            &x,
            signature,
            NOW,
        )
        .unwrap();
    assert!(registry.is_resolver_for(ein, &x[0]));
    assert!(!registry.is_provider_for(ein, &x[0]));
}

#[test]
fn signature_for_other_address_is_denied() {
    let mut registry = registry();
    let owner = SigningKeypair::generate();
    let joiner = SigningKeypair::generate();
    let other = SigningKeypair::generate();

    let ein = registry
        .create_identity(&CallContext::new(owner.address(), NOW), addr(9), &[], &[])
        .unwrap();

    // Signed for `other`, submitted for `joiner`.
    let accept = sign(
        &registry,
        &joiner,
        &Permission::AcceptAddress {
            ein,
            address: other.address(),
            timestamp: NOW,
        },
    );
    let err = registry
        .add_associated_address(
            &CallContext::new(owner.address(), NOW),
            owner.address(),
            joiner.address(),
            accept,
            NOW,
        )
        .unwrap_err();
    assert_eq!(err, RegistryError::PermissionDenied);
    assert_eq!(err.to_string(), "Permission denied.");
    assert!(!registry.has_identity(&joiner.address()));
}

#[test]
fn removed_address_can_start_over() {
    let mut registry = registry();
    let owner = SigningKeypair::generate();
    let joiner = SigningKeypair::generate();
    let ein = registry
        .create_identity(&CallContext::new(owner.address(), NOW), addr(9), &[], &[])
        .unwrap();

    let accept = sign(
        &registry,
        &joiner,
        &Permission::AcceptAddress {
            ein,
            address: joiner.address(),
            timestamp: NOW,
        },
    );
    registry
        .add_associated_address(&CallContext::new(owner.address(), NOW), owner.address(), joiner.address(), accept, NOW)
        .unwrap();

    registry
        .remove_associated_address(&CallContext::new(joiner.address(), NOW))
        .unwrap();
    assert!(!registry.has_identity(&joiner.address()));

    let fresh = registry
        .create_identity(&CallContext::new(joiner.address(), NOW), addr(9), &[], &[])
        .unwrap();
    assert_ne!(fresh, ein);
    assert_directory_consistent(&registry, &[ein, fresh]);
}

#[test]
fn provider_nonce_sequence() {
    let mut registry = registry();
    let owner = SigningKeypair::generate();
    let provider = addr(0x50);
    let ein = registry
        .create_identity(&CallContext::new(owner.address(), NOW), addr(9), &[provider], &[])
        .unwrap();
    let ctx = CallContext::new(provider, NOW);

    let to_add = [addr(0x51)];
    let add = sign(
        &registry,
        &owner,
        &Permission::AddProviders {
            ein,
            providers: &to_add,
            nonce: 0,
        },
    );
    registry
        .add_providers_for(&ctx, ein, owner.address(), &to_add, add, 0)
        .unwrap();

    // A signature over the old nonce is worthless now.
    let stale = sign(
        &registry,
        &owner,
        &Permission::RemoveProviders {
            ein,
            providers: &to_add,
            nonce: 0,
        },
    );
    assert!(matches!(
        registry.remove_providers_for(&ctx, ein, owner.address(), &to_add, stale, 0),
        Err(RegistryError::StaleNonce { expected: 1, provided: 0 })
    ));

    let remove = sign(
        &registry,
        &owner,
        &Permission::RemoveProviders {
            ein,
            providers: &to_add,
            nonce: 1,
        },
    );
    registry
        .remove_providers_for(&ctx, ein, owner.address(), &to_add, remove, 1)
        .unwrap();
    assert!(!registry.is_provider_for(ein, &addr(0x51)));
    assert_eq!(registry.action_nonce(ein), Ok(2));
}

#[test]
fn resolver_edits_emit_one_event_per_change() {
    let mut registry = registry();
    let owner = CallContext::new(addr(1), NOW);
    let ein = registry.create_identity(&owner, addr(9), &[], &[]).unwrap();
    registry.take_events();

    registry
        .add_resolvers(&owner, &[addr(0x60), addr(0x61)])
        .unwrap();
    registry
        .remove_resolvers(&owner, &[addr(0x60), addr(0x62)])
        .unwrap();

    let names: Vec<&str> = registry.take_events().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["resolver_added", "resolver_added", "resolver_removed"]);
    assert!(registry.is_resolver_for(ein, &addr(0x61)));
    assert!(!registry.is_resolver_for(ein, &addr(0x60)));
}
