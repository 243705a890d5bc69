//! # Identity Primitives
//!
//! The two names the registry deals in:
//!
//! 1. **Address** — a 20-byte account identifier derived from a secp256k1
//!    public key. Addresses sign things and control identities.
//! 2. **EIN** — the sequential number of an identity record. One identity,
//!    many addresses; one address, at most one identity.

pub mod address;
pub mod ein;

pub use address::{Address, AddressError};
pub use ein::Ein;
