//! Signed envelope.
//!
//! A [`SignedMessage`] is the unverified wire form: canonical inner bytes,
//! signature and claimed signer. The inner message can only be reached
//! through [`SignedMessage::verify`], which yields a [`VerifiedMessage`].

use super::{DecodeLimits, Dict, Fields, Message, MessageKind, Payload};
use crate::crypto::{PublicKey, SecretKey};
use crate::utils::{b64, CryptoError, Result};
use serde_json::Value;
use std::fmt;

/// Message bytes plus an Ed25519 signature over exactly those bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    msg_bytes: Vec<u8>,
    signature: Vec<u8>,
    signer: PublicKey,
}

/// An opened signed envelope whose signature has been checked
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedMessage {
    message: Message,
    signer: PublicKey,
}

impl SignedMessage {
    /// Serialize `msg` and sign the bytes with `secret_key`
    pub fn sign(msg: impl Into<Message>, secret_key: &SecretKey) -> Self {
        let msg: Message = msg.into();
        let msg_bytes = msg.to_bytes();
        let signature = secret_key.sign(&msg_bytes);
        log::debug!(
            "Signed {} bytes as {}",
            msg_bytes.len(),
            secret_key.public_key()
        );

        Self {
            msg_bytes,
            signature,
            signer: secret_key.public_key(),
        }
    }

    /// Whether the signature verifies over the stored bytes and key
    pub fn is_valid(&self) -> bool {
        self.signer.verify(&self.msg_bytes, &self.signature)
    }

    /// Check the signature and decode the inner message
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidSignature` if the signature does not verify;
    /// decode errors if the signed bytes are not a message
    pub fn verify(&self) -> Result<VerifiedMessage> {
        self.verify_limited(&DecodeLimits::default())
    }

    /// [`SignedMessage::verify`] under explicit decode limits
    pub fn verify_limited(&self, limits: &DecodeLimits) -> Result<VerifiedMessage> {
        if !self.is_valid() {
            log::warn!("Rejecting signed message claiming {}", self.signer);
            return Err(CryptoError::InvalidSignature.into());
        }
        let message = Message::from_bytes_limited(&self.msg_bytes, limits)?;

        Ok(VerifiedMessage {
            message,
            signer: self.signer,
        })
    }

    /// Verify, then return the inner message and its signer
    pub fn unwrap(&self) -> Result<(Message, PublicKey)> {
        Ok(self.verify()?.into_parts())
    }

    /// Verify, then return the inner message
    pub fn msg(&self) -> Result<Message> {
        Ok(self.verify()?.message)
    }

    /// Verify, then return the signer's key
    pub fn signer(&self) -> Result<PublicKey> {
        if !self.is_valid() {
            return Err(CryptoError::InvalidSignature.into());
        }
        Ok(self.signer)
    }

    /// The key this envelope claims to be signed by. Not verified.
    pub fn claimed_signer(&self) -> &PublicKey {
        &self.signer
    }
}

impl VerifiedMessage {
    /// The decoded inner message
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The key that produced the verified signature
    pub fn signer(&self) -> &PublicKey {
        &self.signer
    }

    /// Split into message and signer
    pub fn into_parts(self) -> (Message, PublicKey) {
        (self.message, self.signer)
    }
}

impl Payload for SignedMessage {
    const KIND: MessageKind = MessageKind::Signed;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("msg".to_string(), Value::from(b64::encode(&self.msg_bytes)));
        dict.insert("sig".to_string(), Value::from(b64::encode(&self.signature)));
        dict.insert("pk".to_string(), Value::from(self.signer.to_base64()));
        dict
    }

    fn from_fields(dict: &Dict, _: &DecodeLimits, _: usize) -> Result<Self> {
        let fields = Fields::new(dict, Self::KIND.tag());
        Ok(Self {
            msg_bytes: fields.bytes("msg")?,
            signature: fields.bytes("sig")?,
            signer: fields.pubkey("pk")?,
        })
    }
}

impl fmt::Display for SignedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SignedMessage<{} bytes by {}>",
            self.msg_bytes.len(),
            self.signer
        )
    }
}
