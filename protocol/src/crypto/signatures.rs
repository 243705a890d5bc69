//! # Signature Verification
//!
//! Recoverable secp256k1 ECDSA: given a 32-byte digest and a `(v, r, s)`
//! triple, recover the address that produced it and compare it against the
//! address that claims to have signed.
//!
//! ## Two signing conventions
//!
//! - **Raw** — the signer signed the 32-byte digest directly. Hardware and
//!   library signers do this.
//! - **PersonalMessage** — the signer's wallet wrapped the digest with the
//!   `"\x19Ethereum Signed Message:\n32"` prefix before signing. Browser
//!   wallets do this, and refuse to do anything else.
//!
//! [`is_signed`] tries both before saying no. Callers never need to know
//! which convention a signer used.
//!
//! ## Failure is a boolean
//!
//! A malformed `v`, an `r` or `s` out of range, a point that doesn't
//! recover, or a recovery that lands on the zero address all mean the same
//! thing: "not signed". Nothing in here returns an error or panics on
//! attacker-supplied bytes, so the registry can branch on the answer.

use std::fmt;

use secp256k1::ecdsa::{RecoverableSignature as SecpRecoverable, RecoveryId};
use secp256k1::{Message, SECP256K1};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::hash::personal_message_hash;
use super::keys::address_of;
use crate::identity::Address;

/// How the signer treated the digest before signing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// The 32-byte digest was signed as-is.
    Raw,
    /// The digest was wrapped as a personal message first.
    PersonalMessage,
}

impl SignatureScheme {
    /// Both schemes, in the order verification tries them.
    pub const ALL: [SignatureScheme; 2] = [SignatureScheme::Raw, SignatureScheme::PersonalMessage];

    /// The digest actually fed to ECDSA under this scheme.
    pub fn signing_digest(&self, hash: &[u8; 32]) -> [u8; 32] {
        match self {
            SignatureScheme::Raw => *hash,
            SignatureScheme::PersonalMessage => personal_message_hash(hash),
        }
    }
}

/// A recoverable ECDSA signature in `(v, r, s)` form.
///
/// `v` is the recovery id, either `0/1` or the legacy `27/28`. `r` and `s`
/// are the big-endian curve scalars. On the wire `r` and `s` are
/// `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoverableSignature {
    pub v: u8,
    #[serde(with = "hex_word")]
    pub r: [u8; 32],
    #[serde(with = "hex_word")]
    pub s: [u8; 32],
}

impl RecoverableSignature {
    pub fn new(v: u8, r: [u8; 32], s: [u8; 32]) -> Self {
        Self { v, r, s }
    }

    /// The normalized recovery id (0 or 1), or `None` for any other `v`.
    pub fn recovery_id(&self) -> Option<i32> {
        match self.v {
            0 | 1 => Some(self.v as i32),
            27 | 28 => Some((self.v - 27) as i32),
            _ => None,
        }
    }

    /// The 65-byte `r || s || v` concatenation wallets emit.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    fn to_secp(self) -> Option<SecpRecoverable> {
        let recid = RecoveryId::from_i32(self.recovery_id()?).ok()?;
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r);
        compact[32..].copy_from_slice(&self.s);
        SecpRecoverable::from_compact(&compact, recid).ok()
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecoverableSignature(v={}, r=0x{}, s=0x{})",
            self.v,
            hex::encode(self.r),
            hex::encode(self.s)
        )
    }
}

/// Recover the address that signed `hash` under the given scheme.
///
/// Returns `None` if the signature is malformed, doesn't recover, or
/// recovers to the zero address.
pub fn recover_signer(
    hash: &[u8; 32],
    signature: &RecoverableSignature,
    scheme: SignatureScheme,
) -> Option<Address> {
    let Some(secp_sig) = signature.to_secp() else {
        tracing::trace!(v = signature.v, "malformed signature");
        return None;
    };
    let message = Message::from_digest(scheme.signing_digest(hash));
    let public_key = match SECP256K1.recover_ecdsa(&message, &secp_sig) {
        Ok(key) => key,
        Err(e) => {
            tracing::trace!(?scheme, error = %e, "signer recovery failed");
            return None;
        }
    };
    let address = address_of(&public_key);
    (!address.is_zero()).then_some(address)
}

/// Whether `claimed_signer` signed `hash` under either scheme.
///
/// # Example
///
/// ```
/// use ein_protocol::crypto::{is_signed, keccak256, SignatureScheme, SigningKeypair};
///
/// let keypair = SigningKeypair::generate();
/// let hash = keccak256(b"shh");
/// for scheme in SignatureScheme::ALL {
///     let signature = keypair.sign_hash(&hash, scheme);
///     assert!(is_signed(&keypair.address(), &hash, &signature));
/// }
/// ```
pub fn is_signed(claimed_signer: &Address, hash: &[u8; 32], signature: &RecoverableSignature) -> bool {
    if claimed_signer.is_zero() {
        return false;
    }
    SignatureScheme::ALL
        .iter()
        .any(|scheme| recover_signer(hash, signature, *scheme).as_ref() == Some(claimed_signer))
}

mod hex_word {
    use super::*;

    pub fn serialize<S: Serializer>(word: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(word)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let stripped = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(stripped).map_err(serde::de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut word = [0u8; 32];
        word.copy_from_slice(&bytes);
        Ok(word)
    }
}
