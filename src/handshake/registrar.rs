//! Account creation.

use super::{receive_signed, ServerIdentity};
use crate::messages::{
    AccountCred, AccountResp, AccountRespErr, DecodeLimits, EncryptedMessage, Message,
    SignedMessage, User,
};
use crate::storage::UserStore;
use crate::utils::{CryptoError, CryptoConfig, Result, StorageError, UghError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Handles signed [`crate::messages::AccountReq`]s and issues credentials
pub struct Registrar {
    identity: Arc<ServerIdentity>,
    store: Arc<dyn UserStore>,
    credential_lifetime: Duration,
    limits: DecodeLimits,
}

impl Registrar {
    /// Registrar issuing credentials under `identity` into `store`
    pub fn new(identity: Arc<ServerIdentity>, store: Arc<dyn UserStore>, config: &CryptoConfig) -> Self {
        Self {
            identity,
            store,
            credential_lifetime: Duration::from_secs(config.credential_lifetime),
            limits: DecodeLimits::from(config),
        }
    }

    /// Process a signed account request
    ///
    /// Every client-side problem becomes a rejected [`AccountResp`]. Only
    /// storage and encryption failures are returned as errors.
    pub fn handle(&self, req: &SignedMessage) -> Result<AccountResp> {
        let (msg, signer) = match req.verify_limited(&self.limits) {
            Ok(verified) => verified.into_parts(),
            Err(UghError::Crypto(CryptoError::InvalidSignature)) => {
                return Ok(self.reject(AccountRespErr::BadSig));
            }
            Err(UghError::Message(e)) => {
                log::debug!("Account request did not decode: {e}");
                return Ok(self.reject(AccountRespErr::Malformed));
            }
            Err(e) => return Err(e),
        };

        let req = match msg {
            Message::AccountReq(req) => req,
            other => {
                log::debug!("Account request carried a {}", other.kind().tag());
                return Ok(self.reject(AccountRespErr::Malformed));
            }
        };
        if signer != req.pk {
            return Ok(self.reject(AccountRespErr::WrongPubkey));
        }

        let user = match self.store.insert_user(&User::new(req.nick, req.pk)) {
            Ok(user) => user,
            Err(UghError::Storage(StorageError::PubkeyExists)) => {
                return Ok(self.reject(AccountRespErr::PubkeyExists));
            }
            Err(e) => return Err(e),
        };

        let cred = AccountCred::gen(user, self.credential_lifetime, None)?;
        log::info!("Created account for {}", cred.user());
        let signed = SignedMessage::sign(cred, self.identity.secret_key());
        Ok(AccountResp::created(EncryptedMessage::enc(
            signed,
            self.identity.enc_key(),
        )?))
    }

    /// [`Registrar::handle`] for a raw received dict
    pub fn handle_dict(&self, value: &Value) -> Result<AccountResp> {
        match receive_signed(value, &self.limits) {
            Some(req) => self.handle(&req),
            None => Ok(self.reject(AccountRespErr::Malformed)),
        }
    }

    /// Open a credential presented back to the server
    ///
    /// # Errors
    ///
    /// `CryptoError::Decryption` or `CryptoError::InvalidSignature` if the
    /// credential was tampered with or forged. A genuine but expired or
    /// foreign credential yields `Ok(None)`.
    pub fn check_credential(&self, cred: &EncryptedMessage, now: f64) -> Result<Option<User>> {
        let Message::Signed(signed) = cred.dec_limited(self.identity.enc_key(), &self.limits)?
        else {
            log::warn!("Sealed credential does not hold a signed message");
            return Ok(None);
        };
        let (msg, signer) = signed.verify_limited(&self.limits)?.into_parts();
        if signer != self.identity.public_key() {
            log::warn!("Credential signed by foreign key {signer}");
            return Ok(None);
        }
        let Message::AccountCred(cred) = msg else {
            return Ok(None);
        };
        if cred.is_expired(now) {
            log::debug!("Credential for {} expired", cred.user());
            return Ok(None);
        }

        let Some(rowid) = cred.user().rowid else {
            return Ok(None);
        };
        Ok(self
            .store
            .user_with_rowid(rowid)?
            .filter(|stored| stored.pk == cred.user().pk))
    }

    fn reject(&self, err: AccountRespErr) -> AccountResp {
        log::info!("Rejecting account request: {err}");
        AccountResp::rejected(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EncryptionKey, SecretKey};
    use crate::messages::{unix_now, AccountReq, Stub};
    use crate::storage::MemoryUserStore;

    struct Fixture {
        identity: Arc<ServerIdentity>,
        store: Arc<MemoryUserStore>,
        registrar: Registrar,
    }

    fn fixture() -> Fixture {
        let identity = Arc::new(ServerIdentity::generate());
        let store = Arc::new(MemoryUserStore::new());
        let registrar = Registrar::new(
            Arc::clone(&identity),
            store.clone(),
            &CryptoConfig::default(),
        );
        Fixture {
            identity,
            store,
            registrar,
        }
    }

    fn request(nick: &str, sk: &SecretKey) -> SignedMessage {
        SignedMessage::sign(AccountReq::new(nick, sk.public_key()), sk)
    }

    #[test]
    fn test_create_account() {
        let f = fixture();
        let sk = SecretKey::generate();
        let resp = f.registrar.handle(&request("Foo", &sk)).unwrap();

        assert!(resp.is_created());
        assert_eq!(resp.err(), None);
        let stored = f.store.user_with_pubkey(&sk.public_key()).unwrap().unwrap();
        assert_eq!(stored.nick, "Foo");

        let user = f
            .registrar
            .check_credential(resp.cred().unwrap(), unix_now())
            .unwrap();
        assert_eq!(user, Some(stored));
    }

    #[test]
    fn test_credential_is_sealed_and_signed_by_server() {
        let f = fixture();
        let sk = SecretKey::generate();
        let resp = f.registrar.handle(&request("Foo", &sk)).unwrap();
        let cred = resp.cred().unwrap();

        assert!(cred.dec(&EncryptionKey::generate()).is_err());
        let Message::Signed(signed) = cred.dec(f.identity.enc_key()).unwrap() else {
            panic!("credential is not signed");
        };
        let (msg, signer) = signed.unwrap().unwrap();
        assert_eq!(signer, f.identity.public_key());
        let Message::AccountCred(cred) = msg else {
            panic!("credential holds the wrong message");
        };
        assert!(cred.expire() > unix_now() + 29.0 * 24.0 * 3600.0);
    }

    #[test]
    fn test_bad_signature() {
        let f = fixture();
        let sk = SecretKey::generate();
        let mut d = Message::from(request("Foo", &sk)).to_dict();
        d["pk"] = Value::from(SecretKey::generate().public_key().to_base64());

        let resp = f.registrar.handle_dict(&d).unwrap();
        assert_eq!(resp.err(), Some(AccountRespErr::BadSig));
        assert!(f.store.users().unwrap().is_empty());
    }

    #[test]
    fn test_wrong_pubkey() {
        let f = fixture();
        let sk = SecretKey::generate();
        let other = SecretKey::generate();
        let req = SignedMessage::sign(AccountReq::new("Foo", other.public_key()), &sk);

        let resp = f.registrar.handle(&req).unwrap();
        assert_eq!(resp.err(), Some(AccountRespErr::WrongPubkey));
    }

    #[test]
    fn test_malformed() {
        let f = fixture();
        let sk = SecretKey::generate();
        let resp = f
            .registrar
            .handle(&SignedMessage::sign(Stub::new(1), &sk))
            .unwrap();
        assert_eq!(resp.err(), Some(AccountRespErr::Malformed));

        let resp = f
            .registrar
            .handle_dict(&serde_json::json!({"nick": "Foo"}))
            .unwrap();
        assert_eq!(resp.err(), Some(AccountRespErr::Malformed));
    }

    #[test]
    fn test_pubkey_exists() {
        let f = fixture();
        let sk = SecretKey::generate();
        assert!(f.registrar.handle(&request("Foo", &sk)).unwrap().is_created());

        let resp = f.registrar.handle(&request("Bar", &sk)).unwrap();
        assert_eq!(resp.err(), Some(AccountRespErr::PubkeyExists));
        assert_eq!(f.store.users().unwrap().len(), 1);
    }

    #[test]
    fn test_expired_credential() {
        let f = fixture();
        let resp = f
            .registrar
            .handle(&request("Foo", &SecretKey::generate()))
            .unwrap();
        let later = unix_now() + 31.0 * 24.0 * 3600.0;
        assert_eq!(
            f.registrar.check_credential(resp.cred().unwrap(), later).unwrap(),
            None
        );
    }

    #[test]
    fn test_forged_credentials() {
        let f = fixture();
        let user = f
            .store
            .insert_user(&User::new("Foo", SecretKey::generate().public_key()))
            .unwrap();
        let cred = AccountCred::gen(user, Duration::from_secs(60), None).unwrap();

        let foreign = SignedMessage::sign(cred.clone(), &SecretKey::generate());
        let sealed = EncryptedMessage::enc(foreign, f.identity.enc_key()).unwrap();
        assert_eq!(f.registrar.check_credential(&sealed, unix_now()).unwrap(), None);

        let unsealed_elsewhere = EncryptedMessage::enc(
            SignedMessage::sign(cred, f.identity.secret_key()),
            &EncryptionKey::generate(),
        )
        .unwrap();
        let err = f
            .registrar
            .check_credential(&unsealed_elsewhere, unix_now())
            .unwrap_err();
        assert!(err.is_security_violation());

        let not_signed = EncryptedMessage::enc(Stub::new(1), f.identity.enc_key()).unwrap();
        assert_eq!(f.registrar.check_credential(&not_signed, unix_now()).unwrap(), None);
    }
}
