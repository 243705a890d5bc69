// Copyright (c) 2026 EIN Registry Contributors. MIT License.
// See LICENSE for details.

//! # EIN Protocol — Core Primitives
//!
//! The building blocks every part of the identity registry leans on. Nothing
//! in here holds registry state; it only knows how to name things, hash
//! things, and tell whether somebody really signed something.
//!
//! ## Architecture
//!
//! - **identity** — `Address` (20-byte account identifier) and `Ein`
//!   (sequential identity number).
//! - **crypto** — Keccak-256, secp256k1 keypairs, and signer recovery under
//!   both the raw and the personal-message signing conventions.
//! - **permission** — The codec that turns an action's intent into the exact
//!   32-byte digest a signer must sign. This is where replay scoping lives.
//! - **config** — Protocol constants and the runtime `RegistryConfig`.
//!
//! ## Design Philosophy
//!
//! 1. A signature authorizes exactly one intent on exactly one registry.
//! 2. Verification answers yes or no. It never panics, never throws.
//! 3. Every public API is documented. Every invariant has a test.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod permission;
