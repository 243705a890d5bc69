//! # Account Addresses
//!
//! An address is the 20-byte account identifier the registry indexes by:
//! the rightmost 20 bytes of the Keccak-256 hash of an uncompressed
//! secp256k1 public key (see [`crate::crypto::keys`]).
//!
//! ## Encodings
//!
//! - In memory: raw 20 bytes, `Copy`, hashable, ordered.
//! - At API boundaries: `0x`-prefixed lowercase hex. Parsing tolerates a
//!   missing prefix and upper-case digits, and nothing else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::ADDRESS_LENGTH;

/// Errors that can occur when parsing an address from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address hex: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

/// A 20-byte account address.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never a valid signer; used as "unset".
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wraps raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Builds an address from the last 20 bytes of a 32-byte digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    /// Borrows the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Whether this is [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// The address left-padded to a 32-byte word, the way address-list
    /// elements are packed into permission preimages.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[32 - ADDRESS_LENGTH..].copy_from_slice(&self.0);
        word
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_and_without_prefix() {
        let a: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        let b: Address = "00000000000000000000000000000000000000FF".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes()[19], 0xff);
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(
            "0xdeadbeef".parse::<Address>(),
            Err(AddressError::InvalidLength(4))
        );
    }

    #[test]
    fn non_hex_rejected() {
        assert!(matches!(
            "0xzz00000000000000000000000000000000000000".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn display_is_lowercase_prefixed_hex() {
        let a = Address::from_bytes([0xAB; 20]);
        assert_eq!(a.to_string(), format!("0x{}", "ab".repeat(20)));
    }

    #[test]
    fn word_is_left_padded() {
        let a = Address::from_bytes([0x11; 20]);
        let word = a.to_word();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], a.as_bytes());
    }

    #[test]
    fn serde_uses_hex_string() {
        let a = Address::from_bytes([0x01; 20]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "01".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_bytes([1; 20]).is_zero());
        assert_eq!(Address::default(), Address::ZERO);
    }
}
