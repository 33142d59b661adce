//! Cryptographic key types.
//!
//! Thin wrappers over Ed25519 signing and XChaCha20-Poly1305 authenticated
//! encryption with fixed-length byte representations.

pub mod keys;

pub use keys::*;
