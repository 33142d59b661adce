//! Server side of account creation and challenge-response login.
//!
//! Both flows are driven by a [`ServerIdentity`]: its signing key vouches
//! for issued credentials and its encryption key seals credentials and
//! challenges so only the server can open them again.
//!
//! Received dicts come from untrusted peers. The `receive*` helpers decode
//! them softly so a malformed step turns into a rejection instead of an
//! error.

pub mod authenticator;
pub mod registrar;

pub use authenticator::{AuthRejection, AuthVerdict, Authenticator};
pub use registrar::Registrar;

use crate::crypto::{EncryptionKey, PublicKey, SecretKey};
use crate::messages::{DecodeLimits, EncryptedMessage, Message, SignedMessage};
use serde_json::Value;
use std::fmt;

/// The server's long-term keys
#[derive(Clone)]
pub struct ServerIdentity {
    secret_key: SecretKey,
    enc_key: EncryptionKey,
}

impl ServerIdentity {
    /// Identity from existing keys
    pub fn new(secret_key: SecretKey, enc_key: EncryptionKey) -> Self {
        Self {
            secret_key,
            enc_key,
        }
    }

    /// Fresh random identity
    pub fn generate() -> Self {
        Self::new(SecretKey::generate(), EncryptionKey::generate())
    }

    /// Key vouching for issued credentials
    pub fn public_key(&self) -> PublicKey {
        self.secret_key.public_key()
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub(crate) fn enc_key(&self) -> &EncryptionKey {
        &self.enc_key
    }
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerIdentity({})", self.public_key())
    }
}

/// Decode any received dict, `None` if it is not a valid message
pub fn receive(value: &Value, limits: &DecodeLimits) -> Option<Message> {
    match Message::from_dict_limited(value, limits) {
        Ok(m) => Some(m),
        Err(e) => {
            log::debug!("Dropping undecodable message: {e}");
            None
        }
    }
}

/// Decode a received dict that must be a [`SignedMessage`]
pub fn receive_signed(value: &Value, limits: &DecodeLimits) -> Option<SignedMessage> {
    match receive(value, limits)? {
        Message::Signed(sm) => Some(sm),
        other => {
            log::debug!("Expected a SignedMessage, got {}", other.kind().tag());
            None
        }
    }
}

/// Decode a received dict that must be an [`EncryptedMessage`]
pub fn receive_encrypted(value: &Value, limits: &DecodeLimits) -> Option<EncryptedMessage> {
    match receive(value, limits)? {
        Message::Encrypted(em) => Some(em),
        other => {
            log::debug!("Expected an EncryptedMessage, got {}", other.kind().tag());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Stub;
    use serde_json::json;

    #[test]
    fn test_receive_soft() {
        let limits = DecodeLimits::default();
        assert_eq!(
            receive(&json!({"type": "Stub", "val": 1}), &limits),
            Some(Message::Stub(Stub::new(1)))
        );
        assert_eq!(receive(&json!({"type": "Nope"}), &limits), None);
        assert_eq!(receive(&json!(null), &limits), None);
        assert_eq!(receive_signed(&json!({"type": "Stub", "val": 1}), &limits), None);
        assert_eq!(receive_encrypted(&json!({"type": "Stub", "val": 1}), &limits), None);
    }

    #[test]
    fn test_receive_typed() {
        let limits = DecodeLimits::default();
        let sm = SignedMessage::sign(Stub::new(1), &SecretKey::generate());
        let d = Message::from(sm.clone()).to_dict();
        assert_eq!(receive_signed(&d, &limits), Some(sm));

        let em = EncryptedMessage::enc(Stub::new(1), &EncryptionKey::generate()).unwrap();
        let d = Message::from(em.clone()).to_dict();
        assert_eq!(receive_encrypted(&d, &limits), Some(em));
    }

    #[test]
    fn test_identity_debug_hides_keys() {
        let id = ServerIdentity::generate();
        assert_eq!(format!("{id:?}"), format!("ServerIdentity({})", id.public_key()));
    }
}
