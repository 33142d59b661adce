//! Registered identity record.

use super::{Dict, Fields};
use crate::crypto::PublicKey;
use serde_json::Value;
use std::fmt;

/// An identity: nickname, public key and, once stored, its row id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Display nickname
    pub nick: String,
    /// Identity key
    pub pk: PublicKey,
    /// Storage row id, set only once persisted
    pub rowid: Option<i64>,
}

impl User {
    /// A new, not yet persisted user
    pub fn new(nick: impl Into<String>, pk: PublicKey) -> Self {
        Self {
            nick: nick.into(),
            pk,
            rowid: None,
        }
    }

    /// This user as stored under `rowid`
    pub fn with_rowid(mut self, rowid: i64) -> Self {
        self.rowid = Some(rowid);
        self
    }

    /// Whether storage has assigned a row id
    pub fn is_persisted(&self) -> bool {
        self.rowid.is_some()
    }

    /// Encode as `{nick, pk, rowid}`
    pub fn to_dict(&self) -> Value {
        let mut dict = Dict::new();
        dict.insert("nick".to_string(), Value::from(self.nick.clone()));
        dict.insert("pk".to_string(), Value::from(self.pk.to_base64()));
        dict.insert("rowid".to_string(), self.rowid.map_or(Value::Null, Value::from));
        Value::Object(dict)
    }

    /// Decode `{nick, pk, rowid}`; `None` if any field is missing or ill-typed
    pub fn from_dict(value: &Value) -> Option<Self> {
        let dict = value.as_object()?;
        let fields = Fields::new(dict, "User");
        let rowid = match fields.opt("rowid") {
            Some(v) => Some(v.as_i64()?),
            None => None,
        };

        Some(Self {
            nick: fields.str("nick").ok()?.to_string(),
            pk: fields.pubkey("pk").ok()?,
            rowid,
        })
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rowid {
            Some(rowid) => write!(f, "User<{} {} rowid={rowid}>", self.nick, self.pk),
            None => write!(f, "User<{} {}>", self.nick, self.pk),
        }
    }
}
