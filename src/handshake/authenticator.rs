//! Challenge-response login.
//!
//! The server seals an [`AuthChallenge`] under its own encryption key, so
//! the client can neither read nor alter it. The client signs the sealed
//! blob inside an [`AuthChallengeResp`]; the server opens its own
//! challenge and checks that the signer is the challenged user.

use super::{receive, receive_signed, ServerIdentity};
use crate::messages::{
    unix_now, AuthChallenge, AuthReq, DecodeLimits, EncryptedMessage, Message, SignedMessage,
    User,
};
use crate::storage::UserStore;
use crate::utils::{CryptoConfig, Result, UghError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a challenge response was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Not a well-formed challenge response
    Malformed,
    /// The challenge's lifetime ran out
    Expired,
    /// Signed by a key other than the challenged user's
    WrongSigner,
    /// The challenged user is no longer registered under that key
    UnknownUser,
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Malformed => "malformed challenge response",
            Self::Expired => "challenge expired",
            Self::WrongSigner => "response not signed by the challenged user",
            Self::UnknownUser => "challenged user is not registered",
        })
    }
}

/// Outcome of checking a challenge response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    /// The signer holds the challenged user's secret key
    Authenticated(User),
    /// The response was genuine but does not authenticate anyone
    Rejected(AuthRejection),
}

impl AuthVerdict {
    /// The authenticated user, if any
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Rejected(_) => None,
        }
    }
}

/// Issues challenges and checks responses
pub struct Authenticator {
    identity: Arc<ServerIdentity>,
    store: Arc<dyn UserStore>,
    challenge_lifetime: Duration,
    limits: DecodeLimits,
}

impl Authenticator {
    /// Authenticator for users in `store`, sealing challenges under `identity`
    pub fn new(identity: Arc<ServerIdentity>, store: Arc<dyn UserStore>, config: &CryptoConfig) -> Self {
        Self {
            identity,
            store,
            challenge_lifetime: Duration::from_secs(config.challenge_lifetime),
            limits: DecodeLimits::from(config),
        }
    }

    /// Seal a challenge for the user claiming `req.user_pk`
    ///
    /// Returns `None` when no user is registered under that key.
    pub fn challenge(&self, req: &AuthReq) -> Result<Option<EncryptedMessage>> {
        self.challenge_at(req, unix_now())
    }

    /// [`Authenticator::challenge`] with an explicit current time
    pub fn challenge_at(&self, req: &AuthReq, now: f64) -> Result<Option<EncryptedMessage>> {
        let Some(user) = self.store.user_with_pubkey(&req.user_pk)? else {
            log::info!("Refusing to challenge unknown key {}", req.user_pk);
            return Ok(None);
        };

        let chal = AuthChallenge::new(user, now + self.challenge_lifetime.as_secs_f64())?;
        log::debug!("Issuing {chal}");
        EncryptedMessage::enc(chal, self.identity.enc_key()).map(Some)
    }

    /// [`Authenticator::challenge`] for a raw received dict
    pub fn challenge_dict(&self, value: &Value) -> Result<Option<EncryptedMessage>> {
        match receive(value, &self.limits) {
            Some(Message::AuthReq(req)) => self.challenge(&req),
            _ => Ok(None),
        }
    }

    /// Check a signed challenge response at time `now`
    ///
    /// Responses are not remembered. A captured response verifies again
    /// until its challenge expires, so bind an `Authenticated` verdict to the
    /// connection the response arrived on rather than to the key alone.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidSignature` if the response is forged and
    /// `CryptoError::Decryption` if the sealed challenge was tampered with.
    /// Anything else is a verdict.
    pub fn verify(&self, resp: &SignedMessage, now: f64) -> Result<AuthVerdict> {
        let (msg, signer) = match resp.verify_limited(&self.limits) {
            Ok(verified) => verified.into_parts(),
            Err(UghError::Message(e)) => {
                log::debug!("Challenge response did not decode: {e}");
                return Ok(self.reject(AuthRejection::Malformed));
            }
            Err(e) => {
                log::warn!("Forged challenge response: {e}");
                return Err(e);
            }
        };
        let Message::AuthChallengeResp(resp) = msg else {
            return Ok(self.reject(AuthRejection::Malformed));
        };

        let opened = resp
            .enc_chal
            .dec_limited(self.identity.enc_key(), &self.limits)
            .map_err(|e| {
                log::warn!("Challenge from {signer} was not sealed by us: {e}");
                e
            })?;
        let Message::AuthChallenge(chal) = opened else {
            return Ok(self.reject(AuthRejection::Malformed));
        };

        if chal.is_expired(now) {
            return Ok(self.reject(AuthRejection::Expired));
        }
        if signer != chal.user().pk {
            return Ok(self.reject(AuthRejection::WrongSigner));
        }
        let stored = match chal.user().rowid {
            Some(rowid) => self.store.user_with_rowid(rowid)?,
            None => None,
        };
        match stored {
            Some(user) if user.pk == signer => {
                log::info!("Authenticated {user}");
                Ok(AuthVerdict::Authenticated(user))
            }
            _ => Ok(self.reject(AuthRejection::UnknownUser)),
        }
    }

    /// [`Authenticator::verify`] for a raw received dict
    pub fn verify_dict(&self, value: &Value, now: f64) -> Result<AuthVerdict> {
        match receive_signed(value, &self.limits) {
            Some(resp) => self.verify(&resp, now),
            None => Ok(self.reject(AuthRejection::Malformed)),
        }
    }

    fn reject(&self, why: AuthRejection) -> AuthVerdict {
        log::info!("Rejecting challenge response: {why}");
        AuthVerdict::Rejected(why)
    }
}
