//! Encrypted envelope.

use super::{DecodeLimits, Dict, Fields, Message, MessageKind, Payload};
use crate::crypto::{EncryptionKey, NONCE_LENGTH};
use crate::utils::{b64, Result, UghError};
use serde_json::Value;
use std::fmt;

/// A message sealed under a symmetric [`EncryptionKey`]
///
/// The plaintext is the canonical byte form of any [`Message`], including
/// other envelopes. Each [`EncryptedMessage::dec`] peels exactly one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
}

impl EncryptedMessage {
    /// Serialize `msg` and encrypt it under `enc_key` with a fresh nonce
    pub fn enc(msg: impl Into<Message>, enc_key: &EncryptionKey) -> Result<Self> {
        let msg: Message = msg.into();
        let (ciphertext, nonce) = enc_key.encrypt(&msg.to_bytes())?;
        log::debug!("Sealed {} as {} bytes", msg.kind().tag(), ciphertext.len());

        Ok(Self { ciphertext, nonce })
    }

    /// Decrypt and decode the inner message
    ///
    /// # Errors
    ///
    /// `CryptoError::Decryption` on a wrong key or any tampering with the
    /// ciphertext or nonce; decode errors if the plaintext is not a message
    pub fn dec(&self, enc_key: &EncryptionKey) -> Result<Message> {
        self.dec_limited(enc_key, &DecodeLimits::default())
    }

    /// [`EncryptedMessage::dec`] under explicit decode limits
    pub fn dec_limited(&self, enc_key: &EncryptionKey, limits: &DecodeLimits) -> Result<Message> {
        let plaintext = enc_key.decrypt(&self.ciphertext, &self.nonce).map_err(|e| {
            log::warn!("Failed to open encrypted message: {e}");
            e
        })?;
        Message::from_bytes_limited(&plaintext, limits)
    }

    /// Length of the ciphertext, including the authentication tag
    pub fn len(&self) -> usize {
        self.ciphertext.len()
    }

    /// Whether the ciphertext is empty (never true for a sealed message)
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

impl Payload for EncryptedMessage {
    const KIND: MessageKind = MessageKind::Encrypted;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("ctext".to_string(), Value::from(b64::encode(&self.ciphertext)));
        dict.insert("nonce".to_string(), Value::from(b64::encode(&self.nonce)));
        dict
    }

    fn from_fields(dict: &Dict, _: &DecodeLimits, _: usize) -> Result<Self> {
        let fields = Fields::new(dict, Self::KIND.tag());
        let ciphertext = fields.bytes("ctext")?;
        let nonce = fields.bytes("nonce")?;
        if nonce.len() != NONCE_LENGTH {
            return Err(UghError::malformed(format!(
                "EncryptedMessage: nonce must be {NONCE_LENGTH} bytes, got {}",
                nonce.len()
            )));
        }

        Ok(Self { ciphertext, nonce })
    }
}

impl fmt::Display for EncryptedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedMessage<{} bytes>", self.ciphertext.len())
    }
}
