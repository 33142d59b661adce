//! Message definitions and the dict codec.
//!
//! Every message encodes to a JSON object carrying a `"type"` tag. Decoding
//! looks the tag up in a fixed table and hands the object to that variant's
//! decoder. The canonical byte form of a message, the bytes that get signed
//! or encrypted, is the compact JSON text of its dict with sorted keys.

pub mod account;
pub mod encrypted;
pub mod signed;
pub mod user;

pub use account::*;
pub use encrypted::EncryptedMessage;
pub use signed::{SignedMessage, VerifiedMessage};
pub use user::User;

use crate::crypto::PublicKey;
use crate::utils::{b64, config::CryptoConfig, MessageError, Result, UghError};
use serde_json::{Map, Value};
use std::fmt;

/// Key of the type tag in every message dict
pub const TYPE_KEY: &str = "type";

/// A JSON object: the transport-neutral dict form of a message
pub type Dict = Map<String, Value>;

/// Any message that can travel inside or as an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Test payload holding one integer
    Stub(Stub),
    /// Signed envelope
    Signed(SignedMessage),
    /// Encrypted envelope
    Encrypted(EncryptedMessage),
    /// Account registration request
    AccountReq(AccountReq),
    /// Account registration verdict
    AccountResp(AccountResp),
    /// Proof of registration
    AccountCred(AccountCred),
    /// Login request
    AuthReq(AuthReq),
    /// Login challenge
    AuthChallenge(AuthChallenge),
    /// Login challenge response
    AuthChallengeResp(AuthChallengeResp),
}

/// Stable type tag of each message variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `Stub`
    Stub,
    /// `SignedMessage`
    Signed,
    /// `EncryptedMessage`
    Encrypted,
    /// `AccountReq`
    AccountReq,
    /// `AccountResp`
    AccountResp,
    /// `AccountCred`
    AccountCred,
    /// `AuthReq`
    AuthReq,
    /// `AuthChallenge`
    AuthChallenge,
    /// `AuthChallengeResp`
    AuthChallengeResp,
}

/// Implemented by every concrete message type
pub(crate) trait Payload: Sized + Into<Message> {
    /// Tag written for this type
    const KIND: MessageKind;

    /// Untagged fields of the dict
    fn fields(&self) -> Dict;

    /// Parse the fields of a dict already matched on its tag
    fn from_fields(dict: &Dict, limits: &DecodeLimits, depth: usize) -> Result<Self>;

    /// Decode a dict handed directly to this type
    ///
    /// Untagged dicts are accepted. A tag naming any other type is
    /// `Malformed`, so a look-alike message cannot be decoded as this one.
    fn from_own_dict(value: &Value, limits: &DecodeLimits) -> Result<Self> {
        let tag = Self::KIND.tag();
        let dict = value
            .as_object()
            .ok_or_else(|| UghError::malformed(format!("{tag} is not a dict")))?;
        match dict.get(TYPE_KEY) {
            None => {}
            Some(Value::String(found)) if found == tag => {}
            Some(other) => {
                return Err(UghError::malformed(format!(
                    "{tag} decoder given a dict tagged {other}"
                )))
            }
        }
        Self::from_fields(dict, limits, 0)
    }
}

type Decoder = fn(&Dict, &DecodeLimits, usize) -> Result<Message>;

fn decode<T: Payload>(dict: &Dict, limits: &DecodeLimits, depth: usize) -> Result<Message> {
    T::from_fields(dict, limits, depth).map(Into::into)
}

/// Tag to decoder dispatch table
const DECODERS: &[(MessageKind, Decoder)] = &[
    (MessageKind::Stub, decode::<Stub>),
    (MessageKind::Signed, decode::<SignedMessage>),
    (MessageKind::Encrypted, decode::<EncryptedMessage>),
    (MessageKind::AccountReq, decode::<AccountReq>),
    (MessageKind::AccountResp, decode::<AccountResp>),
    (MessageKind::AccountCred, decode::<AccountCred>),
    (MessageKind::AuthReq, decode::<AuthReq>),
    (MessageKind::AuthChallenge, decode::<AuthChallenge>),
    (MessageKind::AuthChallengeResp, decode::<AuthChallengeResp>),
];

impl MessageKind {
    /// The tag written into dicts
    pub fn tag(self) -> &'static str {
        match self {
            Self::Stub => "Stub",
            Self::Signed => "SignedMessage",
            Self::Encrypted => "EncryptedMessage",
            Self::AccountReq => "AccountReq",
            Self::AccountResp => "AccountResp",
            Self::AccountCred => "AccountCred",
            Self::AuthReq => "AuthReq",
            Self::AuthChallenge => "AuthChallenge",
            Self::AuthChallengeResp => "AuthChallengeResp",
        }
    }
}

/// Bounds applied while decoding untrusted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest accepted serialized message, in bytes
    pub max_message_size: usize,
    /// Deepest accepted chain of nested message dicts
    pub max_nesting_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_message_size: crate::MAX_MESSAGE_SIZE,
            max_nesting_depth: crate::MAX_NESTING_DEPTH,
        }
    }
}

impl From<&CryptoConfig> for DecodeLimits {
    fn from(config: &CryptoConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            max_nesting_depth: config.max_nesting_depth,
        }
    }
}

impl Message {
    /// The variant's type tag
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Stub(_) => MessageKind::Stub,
            Self::Signed(_) => MessageKind::Signed,
            Self::Encrypted(_) => MessageKind::Encrypted,
            Self::AccountReq(_) => MessageKind::AccountReq,
            Self::AccountResp(_) => MessageKind::AccountResp,
            Self::AccountCred(_) => MessageKind::AccountCred,
            Self::AuthReq(_) => MessageKind::AuthReq,
            Self::AuthChallenge(_) => MessageKind::AuthChallenge,
            Self::AuthChallengeResp(_) => MessageKind::AuthChallengeResp,
        }
    }

    /// Encode to a tagged dict
    pub fn to_dict(&self) -> Value {
        let mut dict = match self {
            Self::Stub(m) => m.fields(),
            Self::Signed(m) => m.fields(),
            Self::Encrypted(m) => m.fields(),
            Self::AccountReq(m) => m.fields(),
            Self::AccountResp(m) => m.fields(),
            Self::AccountCred(m) => m.fields(),
            Self::AuthReq(m) => m.fields(),
            Self::AuthChallenge(m) => m.fields(),
            Self::AuthChallengeResp(m) => m.fields(),
        };
        dict.insert(TYPE_KEY.to_string(), Value::from(self.kind().tag()));
        Value::Object(dict)
    }

    /// Decode a tagged dict under the default limits
    ///
    /// # Errors
    ///
    /// `MessageError::UnknownType` when the tag is missing or unknown,
    /// `MessageError::Malformed` when the variant's fields do not parse
    pub fn from_dict(value: &Value) -> Result<Self> {
        Self::from_dict_limited(value, &DecodeLimits::default())
    }

    /// Decode a tagged dict under explicit limits
    pub fn from_dict_limited(value: &Value, limits: &DecodeLimits) -> Result<Self> {
        Self::decode_at(value, limits, 0)
    }

    pub(crate) fn decode_at(value: &Value, limits: &DecodeLimits, depth: usize) -> Result<Self> {
        if depth > limits.max_nesting_depth {
            return Err(MessageError::TooDeep {
                max: limits.max_nesting_depth,
            }
            .into());
        }
        let dict = value
            .as_object()
            .ok_or_else(|| UghError::malformed("message is not a dict"))?;
        let tag = dict
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| MessageError::UnknownType {
                tag: "<missing>".to_string(),
            })?;
        let (_, decode) = DECODERS
            .iter()
            .find(|(kind, _)| kind.tag() == tag)
            .ok_or_else(|| MessageError::UnknownType {
                tag: tag.to_string(),
            })?;
        decode(dict, limits, depth)
    }

    /// Canonical serialization: compact JSON of the dict
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_dict().to_string().into_bytes()
    }

    /// Parse canonical bytes under the default limits
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_limited(bytes, &DecodeLimits::default())
    }

    /// Parse canonical bytes under explicit limits
    pub fn from_bytes_limited(bytes: &[u8], limits: &DecodeLimits) -> Result<Self> {
        if bytes.len() > limits.max_message_size {
            return Err(MessageError::TooLarge {
                size: bytes.len(),
                max: limits.max_message_size,
            }
            .into());
        }
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| UghError::malformed(format!("not a JSON message: {e}")))?;
        Self::from_dict_limited(&value, limits)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stub(m) => m.fmt(f),
            Self::Signed(m) => m.fmt(f),
            Self::Encrypted(m) => m.fmt(f),
            Self::AccountReq(m) => m.fmt(f),
            Self::AccountResp(m) => m.fmt(f),
            Self::AccountCred(m) => m.fmt(f),
            Self::AuthReq(m) => m.fmt(f),
            Self::AuthChallenge(m) => m.fmt(f),
            Self::AuthChallengeResp(m) => m.fmt(f),
        }
    }
}

macro_rules! impl_into_message {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(m: $ty) -> Self {
                    Message::$variant(m)
                }
            }
        )*
    };
}

impl_into_message! {
    Stub => Stub,
    SignedMessage => Signed,
    EncryptedMessage => Encrypted,
    AccountReq => AccountReq,
    AccountResp => AccountResp,
    AccountCred => AccountCred,
    AuthReq => AuthReq,
    AuthChallenge => AuthChallenge,
    AuthChallengeResp => AuthChallengeResp,
}

/// Minimal message used to exercise the envelope machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stub {
    /// The carried value
    pub val: i64,
}

impl Stub {
    /// Create a stub carrying `val`
    pub fn new(val: i64) -> Self {
        Self { val }
    }
}

impl Payload for Stub {
    const KIND: MessageKind = MessageKind::Stub;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("val".to_string(), Value::from(self.val));
        dict
    }

    fn from_fields(dict: &Dict, _: &DecodeLimits, _: usize) -> Result<Self> {
        Ok(Self::new(Fields::new(dict, Self::KIND.tag()).i64("val")?))
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stub<{}>", self.val)
    }
}

/// Typed field access over a dict, reporting problems as `Malformed`
pub(crate) struct Fields<'a> {
    dict: &'a Dict,
    label: &'static str,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(dict: &'a Dict, label: &'static str) -> Self {
        Self { dict, label }
    }

    fn bad(&self, key: &str, what: &str) -> UghError {
        UghError::malformed(format!("{}: field `{key}` {what}", self.label))
    }

    /// Present and non-null, or `None`
    pub(crate) fn opt(&self, key: &str) -> Option<&'a Value> {
        self.dict.get(key).filter(|v| !v.is_null())
    }

    pub(crate) fn get(&self, key: &str) -> Result<&'a Value> {
        self.opt(key).ok_or_else(|| self.bad(key, "is missing"))
    }

    pub(crate) fn str(&self, key: &str) -> Result<&'a str> {
        self.get(key)?
            .as_str()
            .ok_or_else(|| self.bad(key, "is not a string"))
    }

    pub(crate) fn i64(&self, key: &str) -> Result<i64> {
        self.get(key)?
            .as_i64()
            .ok_or_else(|| self.bad(key, "is not an integer"))
    }

    pub(crate) fn f64(&self, key: &str) -> Result<f64> {
        self.get(key)?
            .as_f64()
            .ok_or_else(|| self.bad(key, "is not a number"))
    }

    pub(crate) fn bool(&self, key: &str) -> Result<bool> {
        self.get(key)?
            .as_bool()
            .ok_or_else(|| self.bad(key, "is not a boolean"))
    }

    pub(crate) fn bytes(&self, key: &str) -> Result<Vec<u8>> {
        b64::decode(self.str(key)?).map_err(|_| self.bad(key, "is not base64"))
    }

    pub(crate) fn pubkey(&self, key: &str) -> Result<PublicKey> {
        PublicKey::from_bytes(&self.bytes(key)?).map_err(|_| self.bad(key, "is not a 32-byte key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EncryptionKey, SecretKey};
    use serde_json::json;

    #[test]
    fn test_stub_dict_identity() {
        for val in [0, 1, -1, 420, i64::MAX, i64::MIN] {
            let m = Message::from(Stub::new(val));
            assert_eq!(Message::from_dict(&m.to_dict()).unwrap(), m);
        }
    }

    #[test]
    fn test_dict_carries_type_tag() {
        let d = Message::from(Stub::new(420)).to_dict();
        assert_eq!(d, json!({"type": "Stub", "val": 420}));
    }

    #[test]
    fn test_canonical_bytes_are_deterministic() {
        let m = Message::from(Stub::new(7));
        assert_eq!(m.to_bytes(), m.to_bytes());
        assert_eq!(m.to_bytes(), br#"{"type":"Stub","val":7}"#.to_vec());
        assert_eq!(Message::from_bytes(&m.to_bytes()).unwrap(), m);
    }

    #[test]
    fn test_unknown_and_missing_tags() {
        let err = Message::from_dict(&json!({"type": "Location", "val": 1})).unwrap_err();
        assert!(matches!(
            err,
            UghError::Message(MessageError::UnknownType { ref tag }) if tag == "Location"
        ));

        let err = Message::from_dict(&json!({"val": 1})).unwrap_err();
        assert!(matches!(err, UghError::Message(MessageError::UnknownType { .. })));
    }

    #[test]
    fn test_malformed_fields() {
        for bad in [
            json!({"type": "Stub"}),
            json!({"type": "Stub", "val": "420"}),
            json!({"type": "SignedMessage", "msg": "!!", "sig": "", "pk": ""}),
            json!({"type": "EncryptedMessage", "ctext": "AAAA", "nonce": "AAAA"}),
            json!({"type": "AccountReq", "nick": "Foo", "pk": "AAAA"}),
            json!(["type", "Stub"]),
        ] {
            let err = Message::from_dict(&bad).unwrap_err();
            assert!(
                matches!(err, UghError::Message(MessageError::Malformed { .. })),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_size_limit() {
        let limits = DecodeLimits {
            max_message_size: 8,
            ..DecodeLimits::default()
        };
        let bytes = Message::from(Stub::new(420)).to_bytes();
        let err = Message::from_bytes_limited(&bytes, &limits).unwrap_err();
        assert!(matches!(err, UghError::Message(MessageError::TooLarge { .. })));
        assert!(Message::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let ek = EncryptionKey::generate();
        let resp = AuthChallengeResp::new(EncryptedMessage::enc(Stub::new(1), &ek).unwrap());
        let d = Message::from(resp).to_dict();

        let shallow = DecodeLimits {
            max_nesting_depth: 0,
            ..DecodeLimits::default()
        };
        let err = Message::from_dict_limited(&d, &shallow).unwrap_err();
        assert!(matches!(err, UghError::Message(MessageError::TooDeep { max: 0 })));
        assert!(Message::from_dict(&d).is_ok());
    }

    #[test]
    fn test_every_kind_has_a_decoder() {
        let sk = SecretKey::generate();
        let ek = EncryptionKey::generate();
        let user = User::new("Foo", sk.public_key()).with_rowid(1);
        let enc = EncryptedMessage::enc(Stub::new(1), &ek).unwrap();
        let all: Vec<Message> = vec![
            Stub::new(1).into(),
            SignedMessage::sign(Stub::new(1), &sk).into(),
            enc.clone().into(),
            AccountReq::new("Foo", sk.public_key()).into(),
            AccountResp::rejected(AccountRespErr::Malformed).into(),
            AccountCred::new(user.clone(), 1.0).unwrap().into(),
            AuthReq::new(sk.public_key()).into(),
            AuthChallenge::new(user, 1.0).unwrap().into(),
            AuthChallengeResp::new(enc).into(),
        ];
        assert_eq!(all.len(), DECODERS.len());
        for m in all {
            let tag = m.kind().tag();
            assert!(DECODERS.iter().any(|(kind, _)| kind.tag() == tag));
            assert_eq!(Message::from_dict(&m.to_dict()).unwrap(), m);
        }
    }
}
