//! # ugh
//!
//! The trust layer of a peer-to-peer application: identity and encryption
//! keys, signed and encrypted message envelopes that nest arbitrarily, and
//! the messages and server logic for account creation and
//! challenge-response login.
//!
//! ## Quick Start
//!
//! ```rust
//! use ugh::crypto::{EncryptionKey, SecretKey};
//! use ugh::messages::{EncryptedMessage, Message, SignedMessage, Stub};
//!
//! let sk = SecretKey::generate();
//! let ek = EncryptionKey::generate();
//!
//! let sealed = EncryptedMessage::enc(SignedMessage::sign(Stub::new(420), &sk), &ek)?;
//! let Message::Signed(signed) = sealed.dec(&ek)? else { unreachable!() };
//! let (msg, signer) = signed.unwrap()?;
//!
//! assert_eq!(msg, Message::Stub(Stub::new(420)));
//! assert_eq!(signer, sk.public_key());
//! # Ok::<(), ugh::UghError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`crypto`]: public, secret and symmetric keys
//! - [`messages`]: the tagged dict codec, envelopes and protocol messages
//! - [`handshake`]: server-side account creation and authentication
//! - [`storage`]: where registered users live
//! - [`utils`]: configuration and error handling

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod handshake;
pub mod messages;
pub mod storage;
pub mod utils;

// Re-export commonly used types for convenience
pub use crypto::{EncryptionKey, PublicKey, SecretKey};
pub use handshake::{AuthVerdict, Authenticator, Registrar, ServerIdentity};
pub use messages::{EncryptedMessage, Message, SignedMessage, User, VerifiedMessage};
pub use storage::{FileUserStore, MemoryUserStore, UserStore};
pub use utils::{
    ConfigError, CryptoError, MessageError, ProtocolError, Result, StorageError, UghConfig,
    UghError,
};

/// Version of the message dict format
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Maximum serialized message size in bytes (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Maximum depth of nested message dicts accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 8;

/// Default configuration values
pub mod defaults {
    /// Default credential lifetime in seconds (30 days)
    pub const DEFAULT_CREDENTIAL_LIFETIME: u64 = 30 * 24 * 3600;

    /// Default challenge lifetime in seconds
    pub const DEFAULT_CHALLENGE_LIFETIME: u64 = 60;
}
