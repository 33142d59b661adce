//! Account creation and challenge-response authentication messages.
//!
//! `AccountReq`, `AccountResp` and `AccountCred` decode strictly. The three
//! login-step messages (`AuthReq`, `AuthChallenge`, `AuthChallengeResp`) also
//! offer a soft `from_dict` returning `None` on malformed input, which the
//! handshake layer turns into a rejection instead of an error.

use super::{DecodeLimits, Dict, EncryptedMessage, Fields, Message, MessageKind, Payload, User};
use crate::crypto::{PublicKey, SecretKey};
use crate::messages::SignedMessage;
use crate::utils::{Result, UghError};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Current time as floating-point seconds since the Unix epoch
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn require_persisted(user: &User, what: &str) -> Result<()> {
    if user.is_persisted() {
        Ok(())
    } else {
        Err(UghError::invalid_state(format!(
            "{what} requires a persisted user, {user} has no rowid"
        )))
    }
}

fn require_finite(expire: f64, what: &str) -> Result<()> {
    if expire.is_finite() {
        Ok(())
    } else {
        Err(UghError::invalid_state(format!(
            "{what} expiration must be a finite timestamp, got {expire}"
        )))
    }
}

fn user_field(fields: &Fields<'_>, key: &str) -> Result<User> {
    User::from_dict(fields.get(key)?)
        .ok_or_else(|| UghError::malformed(format!("field `{key}` is not a user")))
}

/// Request to register `pk` under `nick`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReq {
    /// Requested nickname
    pub nick: String,
    /// Identity key to register
    pub pk: PublicKey,
}

impl AccountReq {
    /// Create a registration request
    pub fn new(nick: impl Into<String>, pk: PublicKey) -> Self {
        Self {
            nick: nick.into(),
            pk,
        }
    }

    /// Decode an untagged `{nick, pk}` dict or one tagged `AccountReq`
    pub fn from_dict(value: &Value) -> Result<Self> {
        Self::from_own_dict(value, &DecodeLimits::default())
    }
}

impl Payload for AccountReq {
    const KIND: MessageKind = MessageKind::AccountReq;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("nick".to_string(), Value::from(self.nick.clone()));
        dict.insert("pk".to_string(), Value::from(self.pk.to_base64()));
        dict
    }

    fn from_fields(dict: &Dict, _: &DecodeLimits, _: usize) -> Result<Self> {
        let fields = Fields::new(dict, Self::KIND.tag());
        Ok(Self::new(fields.str("nick")?, fields.pubkey("pk")?))
    }
}

impl fmt::Display for AccountReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountReq<{} {}>", self.nick, self.pk)
    }
}

/// Why an account was not created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountRespErr {
    /// The request's signature is invalid
    BadSig,
    /// A user with that pubkey already exists
    PubkeyExists,
    /// The signed payload was not an `AccountReq`
    Malformed,
    /// Signed with a key other than the one being registered
    WrongPubkey,
}

impl AccountRespErr {
    /// Every variant, in wire order
    pub const ALL: [Self; 4] = [
        Self::BadSig,
        Self::PubkeyExists,
        Self::Malformed,
        Self::WrongPubkey,
    ];

    /// Symbolic name written into dicts
    pub fn name(self) -> &'static str {
        match self {
            Self::BadSig => "BadSig",
            Self::PubkeyExists => "PubkeyExists",
            Self::Malformed => "Malformed",
            Self::WrongPubkey => "WrongPubkey",
        }
    }

    /// Parse a symbolic name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

impl fmt::Display for AccountRespErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadSig => "The signature is invalid",
            Self::PubkeyExists => "A user with that pubkey already exists",
            Self::Malformed => "Message was not a valid AccountReq",
            Self::WrongPubkey => {
                "Message signed with Seckey other than one associated with given Pubkey"
            }
        })
    }
}

/// Verdict on an account request: a sealed credential xor an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountResp {
    created: bool,
    cred: Option<EncryptedMessage>,
    err: Option<AccountRespErr>,
}

impl AccountResp {
    /// Build a verdict, checking that `created` selects exactly one of `cred`/`err`
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidState` for any other combination
    pub fn new(
        created: bool,
        cred: Option<EncryptedMessage>,
        err: Option<AccountRespErr>,
    ) -> Result<Self> {
        match (created, &cred, &err) {
            (true, Some(_), None) | (false, None, Some(_)) => Ok(Self { created, cred, err }),
            _ => Err(UghError::invalid_state(format!(
                "AccountResp created={created} needs {}",
                if created {
                    "a cred and no err"
                } else {
                    "an err and no cred"
                }
            ))),
        }
    }

    /// Account created; `cred` is the sealed credential
    pub fn created(cred: EncryptedMessage) -> Self {
        Self {
            created: true,
            cred: Some(cred),
            err: None,
        }
    }

    /// Account not created
    pub fn rejected(err: AccountRespErr) -> Self {
        Self {
            created: false,
            cred: None,
            err: Some(err),
        }
    }

    /// Whether the account was created
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// The sealed credential, present iff created
    pub fn cred(&self) -> Option<&EncryptedMessage> {
        self.cred.as_ref()
    }

    /// The rejection reason, present iff not created
    pub fn err(&self) -> Option<AccountRespErr> {
        self.err
    }

    /// Decode an untagged `{created, cred, err}` dict or one tagged `AccountResp`
    pub fn from_dict(value: &Value) -> Result<Self> {
        Self::from_own_dict(value, &DecodeLimits::default())
    }
}

impl Payload for AccountResp {
    const KIND: MessageKind = MessageKind::AccountResp;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("created".to_string(), Value::from(self.created));
        dict.insert(
            "cred".to_string(),
            self.cred
                .clone()
                .map_or(Value::Null, |c| Message::from(c).to_dict()),
        );
        dict.insert(
            "err".to_string(),
            self.err.map_or(Value::Null, |e| Value::from(e.name())),
        );
        dict
    }

    fn from_fields(dict: &Dict, limits: &DecodeLimits, depth: usize) -> Result<Self> {
        let fields = Fields::new(dict, Self::KIND.tag());
        let created = fields.bool("created")?;
        let cred = match fields.opt("cred") {
            None => None,
            Some(v) => match Message::decode_at(v, limits, depth + 1)? {
                Message::Encrypted(cred) => Some(cred),
                other => {
                    return Err(UghError::malformed(format!(
                        "AccountResp: cred is a {}, not an EncryptedMessage",
                        other.kind().tag()
                    )))
                }
            },
        };
        let err = match fields.opt("err") {
            None => None,
            Some(_) => Some(
                AccountRespErr::from_name(fields.str("err")?)
                    .ok_or_else(|| UghError::malformed("AccountResp: unknown err"))?,
            ),
        };

        Self::new(created, cred, err).map_err(|e| UghError::malformed(e.to_string()))
    }
}

impl fmt::Display for AccountResp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err = self.err.map_or("None", AccountRespErr::name);
        match &self.cred {
            Some(cred) => write!(
                f,
                "AccountResp<created={} err={err} cred={cred}>",
                self.created
            ),
            None => write!(f, "AccountResp<created={} err={err} cred=None>", self.created),
        }
    }
}

/// Proof of registration for a persisted user, valid until `expire`
#[derive(Debug, Clone, PartialEq)]
pub struct AccountCred {
    user: User,
    expire: f64,
}

impl AccountCred {
    /// Credential for `user` expiring at the Unix timestamp `expire`
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidState` if `user` has no row id or `expire` is
    /// not finite
    pub fn new(user: User, expire: f64) -> Result<Self> {
        require_persisted(&user, "AccountCred")?;
        require_finite(expire, "AccountCred")?;
        Ok(Self { user, expire })
    }

    /// Credential expiring `lifetime` after `now` (current time if `None`)
    pub fn gen(user: User, lifetime: Duration, now: Option<f64>) -> Result<Self> {
        let now = now.unwrap_or_else(unix_now);
        Self::new(user, now + lifetime.as_secs_f64())
    }

    /// The registered user
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Expiration as a Unix timestamp
    pub fn expire(&self) -> f64 {
        self.expire
    }

    /// Whether the credential has expired at `now`
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expire
    }

    /// Decode an untagged `{user, expire}` dict or one tagged `AccountCred`
    pub fn from_dict(value: &Value) -> Result<Self> {
        Self::from_own_dict(value, &DecodeLimits::default())
    }
}

impl Payload for AccountCred {
    const KIND: MessageKind = MessageKind::AccountCred;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("user".to_string(), self.user.to_dict());
        dict.insert("expire".to_string(), Value::from(self.expire));
        dict
    }

    fn from_fields(dict: &Dict, _: &DecodeLimits, _: usize) -> Result<Self> {
        let fields = Fields::new(dict, Self::KIND.tag());
        let user = user_field(&fields, "user")?;
        Self::new(user, fields.f64("expire")?).map_err(|e| UghError::malformed(e.to_string()))
    }
}

impl fmt::Display for AccountCred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountCred<{} {}>", self.user, self.expire)
    }
}

/// Request to authenticate as the holder of `user_pk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthReq {
    /// Identity being claimed
    pub user_pk: PublicKey,
}

impl AuthReq {
    /// Create a login request
    pub fn new(user_pk: PublicKey) -> Self {
        Self { user_pk }
    }

    /// Soft decode: `None` if `user_pk` is missing or not a key, or the dict
    /// is tagged as another type
    pub fn from_dict(value: &Value) -> Option<Self> {
        Self::from_dict_limited(value, &DecodeLimits::default())
    }

    /// [`Self::from_dict`] under explicit decode limits
    pub fn from_dict_limited(value: &Value, limits: &DecodeLimits) -> Option<Self> {
        Self::from_own_dict(value, limits).ok()
    }
}

impl Payload for AuthReq {
    const KIND: MessageKind = MessageKind::AuthReq;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("user_pk".to_string(), Value::from(self.user_pk.to_base64()));
        dict
    }

    fn from_fields(dict: &Dict, _: &DecodeLimits, _: usize) -> Result<Self> {
        Ok(Self::new(Fields::new(dict, Self::KIND.tag()).pubkey("user_pk")?))
    }
}

impl fmt::Display for AuthReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthReq<{}>", self.user_pk)
    }
}

/// Challenge issued to a persisted user, acceptable until `expire`
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChallenge {
    user: User,
    expire: f64,
}

impl AuthChallenge {
    /// Challenge for `user` expiring at the Unix timestamp `expire`
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidState` if `user` has no row id or `expire` is
    /// not finite
    pub fn new(user: User, expire: f64) -> Result<Self> {
        require_persisted(&user, "AuthChallenge")?;
        require_finite(expire, "AuthChallenge")?;
        Ok(Self { user, expire })
    }

    /// The challenged user
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Expiration as a Unix timestamp
    pub fn expire(&self) -> f64 {
        self.expire
    }

    /// Whether the challenge can no longer be answered at `now`
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expire
    }

    /// Soft decode: `None` if `user` or `expire` is missing or invalid, or the
    /// dict is tagged as another type
    pub fn from_dict(value: &Value) -> Option<Self> {
        Self::from_dict_limited(value, &DecodeLimits::default())
    }

    /// [`Self::from_dict`] under explicit decode limits
    pub fn from_dict_limited(value: &Value, limits: &DecodeLimits) -> Option<Self> {
        Self::from_own_dict(value, limits).ok()
    }
}

impl Payload for AuthChallenge {
    const KIND: MessageKind = MessageKind::AuthChallenge;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("user".to_string(), self.user.to_dict());
        dict.insert("expire".to_string(), Value::from(self.expire));
        dict
    }

    fn from_fields(dict: &Dict, _: &DecodeLimits, _: usize) -> Result<Self> {
        let fields = Fields::new(dict, Self::KIND.tag());
        let user = user_field(&fields, "user")?;
        Self::new(user, fields.f64("expire")?).map_err(|e| UghError::malformed(e.to_string()))
    }
}

impl fmt::Display for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthChallenge<{} {:.6}>", self.user, self.expire)
    }
}

/// The client's answer to a challenge
///
/// `enc_chal` is the sealed challenge exactly as the server issued it. The
/// client proves possession of its secret key by signing this message; see
/// [`AuthChallengeResp::respond`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallengeResp {
    /// The sealed challenge being answered
    pub enc_chal: EncryptedMessage,
}

impl AuthChallengeResp {
    /// Wrap a sealed challenge
    pub fn new(enc_chal: EncryptedMessage) -> Self {
        Self { enc_chal }
    }

    /// Build the signed response to `enc_chal` with the client's key
    pub fn respond(enc_chal: EncryptedMessage, secret_key: &SecretKey) -> SignedMessage {
        SignedMessage::sign(Self::new(enc_chal), secret_key)
    }

    /// Soft decode: `None` if `enc_chal` is missing or not an
    /// `EncryptedMessage`, or the dict is tagged as another type
    pub fn from_dict(value: &Value) -> Option<Self> {
        Self::from_dict_limited(value, &DecodeLimits::default())
    }

    /// [`Self::from_dict`] under explicit decode limits
    pub fn from_dict_limited(value: &Value, limits: &DecodeLimits) -> Option<Self> {
        Self::from_own_dict(value, limits).ok()
    }
}

impl Payload for AuthChallengeResp {
    const KIND: MessageKind = MessageKind::AuthChallengeResp;

    fn fields(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert(
            "enc_chal".to_string(),
            Message::from(self.enc_chal.clone()).to_dict(),
        );
        dict
    }

    fn from_fields(dict: &Dict, limits: &DecodeLimits, depth: usize) -> Result<Self> {
        let fields = Fields::new(dict, Self::KIND.tag());
        match Message::decode_at(fields.get("enc_chal")?, limits, depth + 1)? {
            Message::Encrypted(enc_chal) => Ok(Self::new(enc_chal)),
            other => Err(UghError::malformed(format!(
                "AuthChallengeResp: enc_chal is a {}, not an EncryptedMessage",
                other.kind().tag()
            ))),
        }
    }
}

impl fmt::Display for AuthChallengeResp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthChallengeResp<{}>", self.enc_chal)
    }
}
