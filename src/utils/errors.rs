//! Error types and handling for the trust layer.
//!
//! Errors are split by concern. Key and envelope failures are hard errors
//! and always reach the caller. The soft decoders for login steps swallow
//! their `MessageError` and return `None` instead.

use thiserror::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, UghError>;

/// Top-level error type for all trust-layer operations
#[derive(Error, Debug, Clone)]
pub enum UghError {
    /// Key construction and cryptographic primitive errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Message encoding and decoding errors
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Protocol messages built with contradictory fields
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// User storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration and I/O errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key and primitive errors
#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    /// Key built from the wrong number of bytes
    #[error("Malformed key: {reason}")]
    MalformedKey { reason: String },

    /// A signed envelope was opened but its signature does not verify
    #[error("Invalid signature")]
    InvalidSignature,

    /// Authenticated decryption failed (wrong key, tampered ciphertext or nonce)
    #[error("Decryption failed")]
    Decryption,

    /// Encryption operation failure
    #[error("Encryption failed: {reason}")]
    Encryption { reason: String },
}

/// Message dict/byte codec errors
#[derive(Error, Debug, Clone)]
pub enum MessageError {
    /// The type tag does not name any known message
    #[error("Unknown message type: {tag}")]
    UnknownType { tag: String },

    /// The tag was recognised but the fields could not be parsed
    #[error("Malformed message: {reason}")]
    Malformed { reason: String },

    /// Serialized message exceeds the size limit
    #[error("Message too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Nested dicts exceed the nesting limit
    #[error("Message nested deeper than {max} levels")]
    TooDeep { max: usize },
}

/// Protocol message construction errors
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Fields contradict each other or a precondition does not hold
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },
}

/// User storage errors
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// A user with that public key is already registered
    #[error("A user with that pubkey already exists")]
    PubkeyExists,

    /// Stored data could not be decoded
    #[error("Corrupt store: {reason}")]
    Corrupt { reason: String },

    /// The backing database failed
    #[error("Database error: {reason}")]
    Database { reason: String },
}

/// Configuration and setup errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing error
    #[error("Configuration parse error: {reason}")]
    ParseError { reason: String },

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Directory creation failure
    #[error("Failed to create directory: {path}")]
    DirectoryCreation { path: String },
}

impl UghError {
    /// Shorthand for a malformed-message error
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::Message(MessageError::Malformed {
            reason: reason.into(),
        })
    }

    /// Shorthand for an invalid-state error
    pub fn invalid_state<S: Into<String>>(reason: S) -> Self {
        Self::Protocol(ProtocolError::InvalidState {
            reason: reason.into(),
        })
    }

    /// Returns true if this error means an envelope was forged or tampered with
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::Crypto(CryptoError::InvalidSignature) | Self::Crypto(CryptoError::Decryption)
        )
    }
}

impl From<std::io::Error> for UghError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for UghError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for UghError {
    fn from(err: base64::DecodeError) -> Self {
        Self::malformed(format!("bad base64: {err}"))
    }
}
