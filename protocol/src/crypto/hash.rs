//! # Hashing Utilities
//!
//! One hash function, used everywhere: **Keccak-256**, the pre-standard
//! variant of SHA-3 that account addresses and signed messages are defined
//! over. Note that it is *not* NIST SHA3-256; the padding differs and so do
//! the outputs. Mixing them up produces signatures that verify nowhere.
//!
//! ## personal_message_hash
//!
//! Wallets that sign "personal messages" never sign the raw 32-byte hash.
//! They sign `keccak256("\x19Ethereum Signed Message:\n32" || hash)`, so
//! that a user can't be tricked into signing a transaction disguised as a
//! message. The registry accepts both forms (see [`super::signatures`]).

use sha3::{Digest, Keccak256};

use crate::config::PERSONAL_MESSAGE_PREFIX;

/// Compute the Keccak-256 hash of the input data.
///
/// # Example
///
/// ```
/// use ein_protocol::crypto::keccak256;
///
/// let hash = keccak256(b"");
/// assert_eq!(
///     hex::encode(hash),
///     "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
/// );
/// ```
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Keccak-256 over several slices without concatenating them first.
pub fn keccak256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// The digest a wallet actually signs when asked to sign `hash` as a
/// personal message.
pub fn personal_message_hash(hash: &[u8; 32]) -> [u8; 32] {
    keccak256_parts(&[PERSONAL_MESSAGE_PREFIX, hash])
}
