//! # Cryptographic Primitives
//!
//! Everything the registry needs to decide whether an address authorized
//! something:
//!
//! - **Keccak-256** for every digest.
//! - **secp256k1** keypairs, whose public keys hash down to addresses.
//! - **Recoverable ECDSA**, so a signature alone names its signer.
//!
//! All of it is a thin, typed wrapper around audited implementations
//! (`secp256k1` binds libsecp256k1; `sha3` is RustCrypto's Keccak).

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{keccak256, keccak256_parts, personal_message_hash};
pub use keys::{address_of, KeyError, SigningKeypair};
pub use signatures::{is_signed, recover_signer, RecoverableSignature, SignatureScheme};
