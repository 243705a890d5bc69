//! # Address Set
//!
//! A bounded, order-insensitive set of addresses with O(1) insert, O(1)
//! remove, O(1) membership test, and dense enumeration. Every identity holds
//! three of them: associated addresses, providers, and resolvers.
//!
//! The members live in a plain `Vec`; a side index maps each address to its
//! position. Removal swaps the doomed element with the tail, fixes the moved
//! element's index, and pops. No tombstones, so iteration never skips.
//!
//! Enumeration order is not meaningful and is disturbed by removal.

use std::collections::HashMap;

use ein_protocol::identity::Address;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur when inserting into an [`AddressSet`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressSetError {
    /// The address is already in the set.
    #[error("{0} is already a member")]
    AlreadyMember(Address),

    /// The set holds as many addresses as it is allowed to.
    #[error("set is at capacity ({capacity})")]
    CapacityReached {
        /// The configured maximum size.
        capacity: usize,
    },
}

// ---------------------------------------------------------------------------
// AddressSet
// ---------------------------------------------------------------------------

/// A capacity-bounded set of addresses.
#[derive(Debug, Clone)]
pub struct AddressSet {
    members: Vec<Address>,
    index: HashMap<Address, usize>,
    capacity: usize,
}

impl AddressSet {
    /// Creates an empty set that will hold at most `capacity` addresses.
    pub fn new(capacity: usize) -> Self {
        Self {
            members: Vec::new(),
            index: HashMap::new(),
            capacity,
        }
    }

    /// Adds `address` to the set.
    ///
    /// # Errors
    ///
    /// Returns [`AddressSetError::AlreadyMember`] if the address is present,
    /// or [`AddressSetError::CapacityReached`] if the set is full. The set is
    /// unchanged in both cases.
    pub fn insert(&mut self, address: Address) -> Result<(), AddressSetError> {
        if self.index.contains_key(&address) {
            return Err(AddressSetError::AlreadyMember(address));
        }
        if self.members.len() >= self.capacity {
            return Err(AddressSetError::CapacityReached {
                capacity: self.capacity,
            });
        }
        self.index.insert(address, self.members.len());
        self.members.push(address);
        Ok(())
    }

    /// Removes `address` from the set. Returns whether it was a member.
    ///
    /// Removing a non-member is a no-op.
    pub fn remove(&mut self, address: &Address) -> bool {
        let Some(position) = self.index.remove(address) else {
            return false;
        };
        self.members.swap_remove(position);
        // swap_remove moved the old tail into `position`, unless we removed
        // the tail itself.
        if let Some(moved) = self.members.get(position) {
            self.index.insert(*moved, position);
        }
        true
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All members, in no meaningful order.
    pub fn members(&self) -> &[Address] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }

    /// Empties the set, keeping its capacity.
    pub fn reset(&mut self) {
        self.members.clear();
        self.index.clear();
    }

    /// Empties the set and hands back what it held.
    pub fn take_members(&mut self) -> Vec<Address> {
        self.index.clear();
        std::mem::take(&mut self.members)
    }
}
