//! Key types: public identity key, secret signing key, symmetric encryption key.
//!
//! All three are fixed 32-byte values. Only [`PublicKey`] is serializable;
//! secret material never appears in any dict or log line.

use crate::utils::{b64, CryptoError, Result};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Length of every key type, in bytes
pub const KEY_LENGTH: usize = 32;

/// Length of an XChaCha20-Poly1305 nonce, in bytes
pub const NONCE_LENGTH: usize = 24;

fn key_array(bytes: &[u8], what: &str) -> Result<[u8; KEY_LENGTH]> {
    bytes.try_into().map_err(|_| {
        CryptoError::MalformedKey {
            reason: format!(
                "{what}: expected {KEY_LENGTH} bytes, got {}",
                bytes.len()
            ),
        }
        .into()
    })
}

/// Public identity key (Ed25519 verifying key bytes)
///
/// Held as raw bytes: any 32-byte value is accepted, and a value that is
/// not a valid curve point simply never verifies a signature.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; KEY_LENGTH]);

impl PublicKey {
    /// Create a public key from exactly 32 bytes
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedKey` for any other length
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(key_array(bytes, "public key")?))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Storage adapter: the fixed 32-byte blob stored for this key
    pub fn adapt(&self) -> [u8; KEY_LENGTH] {
        self.0
    }

    /// Storage adapter: rebuild a key from its stored blob
    pub fn convert(blob: &[u8]) -> Result<Self> {
        Self::from_bytes(blob)
    }

    /// Base64 text form used in dicts
    pub fn to_base64(&self) -> String {
        b64::encode(self.0)
    }

    /// Parse the base64 text form used in dicts
    pub fn from_base64(text: &str) -> Result<Self> {
        Self::from_bytes(&b64::decode(text)?)
    }

    /// Check `signature` over `message` against this key. Never fails loudly.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify_strict(message, &sig).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pubkey<{}..{} ({} bytes)>",
            b64::encode(&self.0[..6]),
            b64::encode(&self.0[KEY_LENGTH - 6..]),
            KEY_LENGTH
        )
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        Self::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

/// Secret signing key, held as its 32-byte Ed25519 seed
#[derive(Clone)]
pub struct SecretKey {
    signing_key: SigningKey,
}

impl SecretKey {
    /// Create a secret key from a 32-byte seed
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedKey` for any other length
    pub fn from_bytes(seed: &[u8]) -> Result<Self> {
        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_array(seed, "secret key")?),
        })
    }

    /// Generate a new random secret key
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// The public key derived from this seed
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign `message`, returning the 64-byte signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Export the seed for local key files. Never put this in a dict.
    pub fn to_seed(&self) -> [u8; KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public_key", &self.public_key())
            .field("seed", &"[REDACTED]")
            .finish()
    }
}

/// Symmetric key for XChaCha20-Poly1305 authenticated encryption
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LENGTH]);

impl EncryptionKey {
    /// Generate 32 random bytes
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Create a key from exactly 32 bytes shared out-of-band
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(key_array(bytes, "encryption key")?))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Encrypt under a fresh random nonce, returning `(ciphertext, nonce)`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let cipher = XChaCha20Poly1305::new(&self.0.into());
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encryption {
                reason: "Failed to encrypt message".to_string(),
            })?;

        Ok((ciphertext, nonce.to_vec()))
    }

    /// Authenticated decryption
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` for a wrong key, a wrong-length
    /// nonce, or any modification of the ciphertext or nonce
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_LENGTH {
            return Err(CryptoError::Decryption.into());
        }
        let cipher = XChaCha20Poly1305::new(&self.0.into());
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decryption.into())
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}
