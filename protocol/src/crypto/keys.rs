//! # Key Management
//!
//! secp256k1 keypairs and the address derivation the registry indexes by.
//!
//! An address is `keccak256(uncompressed_pubkey[1..])[12..]`: hash the 64
//! bytes of the public point (dropping the `0x04` tag) and keep the last 20.
//!
//! ## Security considerations
//!
//! - Secret keys come from the OS RNG and are rejected if out of range.
//! - `SigningKeypair` does not implement `Serialize`. Exporting a secret is
//!   a deliberate call to [`SigningKeypair::secret_key_hex`].
//! - Key bytes are never logged.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use thiserror::Error;

use super::hash::keccak256;
use super::signatures::{RecoverableSignature, SignatureScheme};
use crate::identity::Address;

/// Errors that can occur during key operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,
}

/// Derive the account address of a public key.
pub fn address_of(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    Address::from_digest(&keccak256(&uncompressed[1..]))
}

/// A secp256k1 signing keypair.
#[derive(Clone)]
pub struct SigningKeypair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl SigningKeypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut seed);
            // Out-of-range scalars are astronomically rare; draw again.
            if let Ok(keypair) = Self::from_bytes(&seed) {
                return keypair;
            }
        }
    }

    /// Reconstruct a keypair from a raw 32-byte secret scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_slice(secret).map_err(|_| KeyError::InvalidSecretKey)?;
        let public_key = PublicKey::from_secret_key(SECP256K1, &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Reconstruct a keypair from a hex-encoded secret, with or without `0x`.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let stripped = hex_str.trim().strip_prefix("0x").unwrap_or(hex_str.trim());
        let bytes = hex::decode(stripped).map_err(|_| KeyError::InvalidSecretKey)?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_bytes(&secret)
    }

    /// The account address controlled by this keypair.
    pub fn address(&self) -> Address {
        address_of(&self.public_key)
    }

    /// The public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign a 32-byte digest under the given scheme.
    ///
    /// The returned `v` uses the legacy `27/28` encoding. Signing is
    /// deterministic (RFC 6979), so equal inputs give equal signatures.
    pub fn sign_hash(&self, hash: &[u8; 32], scheme: SignatureScheme) -> RecoverableSignature {
        let message = Message::from_digest(scheme.signing_digest(hash));
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        RecoverableSignature::new(27 + recovery_id.to_i32() as u8, r, s)
    }

    /// Export the raw secret as hex. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::keccak256;

    #[test]
    fn test_known_address_vector() {
        // Secret key 1 maps to a well-known address.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let kp = SigningKeypair::from_bytes(&secret).unwrap();
        assert_eq!(
            kp.address().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert_eq!(
            SigningKeypair::from_bytes(&[0u8; 32]).unwrap_err(),
            KeyError::InvalidSecretKey
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let kp = SigningKeypair::generate();
        let restored = SigningKeypair::from_hex(&kp.secret_key_hex()).unwrap();
        assert_eq!(kp.address(), restored.address());

        let prefixed = SigningKeypair::from_hex(&format!("0x{}", kp.secret_key_hex())).unwrap();
        assert_eq!(kp.address(), prefixed.address());
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(SigningKeypair::from_hex("not hex").is_err());
        assert!(SigningKeypair::from_hex("abcd").is_err());
    }

    #[test]
    fn test_deterministic_signatures() {
        let kp = SigningKeypair::generate();
        let hash = keccak256(b"determinism");
        let a = kp.sign_hash(&hash, SignatureScheme::Raw);
        let b = kp.sign_hash(&hash, SignatureScheme::Raw);
        assert_eq!(a, b);
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = SigningKeypair::generate();
        let debug = format!("{:?}", kp);
        assert!(!debug.contains(&kp.secret_key_hex()));
    }

    #[test]
    fn test_generated_addresses_differ() {
        assert_ne!(
            SigningKeypair::generate().address(),
            SigningKeypair::generate().address()
        );
    }
}
