//! Base64 text encoding for byte fields in message dicts.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Encode bytes as standard padded base64
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard padded base64
pub fn decode(text: &str) -> crate::Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}
