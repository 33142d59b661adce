//! End-to-end behaviour of the envelopes and the account/login flow.

use std::sync::Arc;
use tempfile::TempDir;
use ugh::handshake::{AuthRejection, AuthVerdict, Authenticator, Registrar, ServerIdentity};
use ugh::messages::{
    unix_now, AccountReq, AccountRespErr, AuthChallengeResp, AuthReq, EncryptedMessage, Message,
    SignedMessage, Stub,
};
use ugh::utils::CryptoConfig;
use ugh::{EncryptionKey, FileUserStore, SecretKey, UserStore};

fn seeded_key() -> SecretKey {
    let mut seed = [0u8; 32];
    seed[24..].copy_from_slice(&28_379_873_947u64.to_be_bytes());
    SecretKey::from_bytes(&seed).unwrap()
}

#[derive(Clone, Copy, Debug)]
enum Wrap {
    Sign,
    Enc,
}

fn wrap(m: Message, layers: &[Wrap], sk: &SecretKey, ek: &EncryptionKey) -> Message {
    layers.iter().fold(m, |inner, layer| match layer {
        Wrap::Sign => SignedMessage::sign(inner, sk).into(),
        Wrap::Enc => EncryptedMessage::enc(inner, ek).unwrap().into(),
    })
}

fn peel(m: Message, ek: &EncryptionKey) -> Message {
    match m {
        Message::Signed(sm) => sm.msg().unwrap(),
        Message::Encrypted(em) => em.dec(ek).unwrap(),
        other => panic!("{other} is not an envelope"),
    }
}

#[test]
fn test_concrete_scenario() {
    let sk = seeded_key();
    let (m, pk) = SignedMessage::sign(Stub::new(420), &sk).unwrap().unwrap();
    assert_eq!(m, Message::Stub(Stub::new(420)));
    assert_eq!(pk, sk.public_key());

    let ek = EncryptionKey::generate();
    let opened = EncryptedMessage::enc(Stub::new(420), &ek).unwrap().dec(&ek).unwrap();
    assert_eq!(opened, Message::Stub(Stub::new(420)));
}

#[test]
fn test_nested_envelopes_round_trip() {
    let sk = SecretKey::generate();
    let ek = EncryptionKey::generate();
    let payloads: Vec<Message> = vec![
        Stub::new(420).into(),
        AccountReq::new("Foo", sk.public_key()).into(),
        AuthReq::new(sk.public_key()).into(),
    ];

    let mut stacks: Vec<Vec<Wrap>> = vec![vec![]];
    for depth in 1..=3 {
        for bits in 0..(1u32 << depth) {
            stacks.push(
                (0..depth)
                    .map(|i| if bits & (1 << i) == 0 { Wrap::Sign } else { Wrap::Enc })
                    .collect(),
            );
        }
    }

    for payload in &payloads {
        for layers in &stacks {
            let wrapped = wrap(payload.clone(), layers, &sk, &ek);
            let decoded = Message::from_dict(&wrapped.to_dict()).unwrap();
            assert_eq!(decoded, wrapped, "layers {layers:?}");

            let inner = layers.iter().fold(decoded, |m, _| peel(m, &ek));
            assert_eq!(&inner, payload, "layers {layers:?}");
        }
    }
}

#[test]
fn test_full_handshake_with_file_store() {
    let dir = TempDir::new().unwrap();
    let users_db = dir.path().join("users.db");
    let config = CryptoConfig::default();
    let identity = Arc::new(ServerIdentity::generate());

    let sk = seeded_key();
    let cred = {
        let store = Arc::new(FileUserStore::open(&users_db).unwrap());
        let registrar = Registrar::new(Arc::clone(&identity), store, &config);

        let wire = Message::from(SignedMessage::sign(
            AccountReq::new("Foo", sk.public_key()),
            &sk,
        ))
        .to_dict();
        let resp = registrar.handle_dict(&wire).unwrap();
        assert!(resp.is_created());
        resp.cred().unwrap().clone()
    };

    // A restarted server sees the same users and honours the credential.
    let store = Arc::new(FileUserStore::open(&users_db).unwrap());
    let registrar = Registrar::new(Arc::clone(&identity), store.clone(), &config);
    let user = registrar.check_credential(&cred, unix_now()).unwrap().unwrap();
    assert_eq!(user.nick, "Foo");
    assert_eq!(store.users().unwrap(), vec![user.clone()]);

    let again = registrar
        .handle(&SignedMessage::sign(AccountReq::new("Bar", sk.public_key()), &sk))
        .unwrap();
    assert_eq!(again.err(), Some(AccountRespErr::PubkeyExists));

    let authenticator = Authenticator::new(identity, store, &config);
    let auth_req = Message::from(AuthReq::new(sk.public_key())).to_dict();
    let enc_chal = authenticator.challenge_dict(&auth_req).unwrap().unwrap();

    let wire = Message::from(AuthChallengeResp::respond(enc_chal.clone(), &sk)).to_dict();
    assert_eq!(
        authenticator.verify_dict(&wire, unix_now()).unwrap(),
        AuthVerdict::Authenticated(user)
    );

    let impostor = Message::from(AuthChallengeResp::respond(enc_chal, &SecretKey::generate())).to_dict();
    assert_eq!(
        authenticator.verify_dict(&impostor, unix_now()).unwrap(),
        AuthVerdict::Rejected(AuthRejection::WrongSigner)
    );
}

#[test]
fn test_configured_challenge_lifetime() {
    let config = CryptoConfig {
        challenge_lifetime: 5,
        ..CryptoConfig::default()
    };
    let store = Arc::new(ugh::MemoryUserStore::new());
    let sk = SecretKey::generate();
    store.insert_user(&ugh::User::new("Foo", sk.public_key())).unwrap();
    let authenticator = Authenticator::new(Arc::new(ServerIdentity::generate()), store, &config);

    let now = unix_now();
    let enc_chal = authenticator
        .challenge_at(&AuthReq::new(sk.public_key()), now)
        .unwrap()
        .unwrap();
    let resp = AuthChallengeResp::respond(enc_chal, &sk);

    assert!(authenticator.verify(&resp, now + 4.0).unwrap().user().is_some());
    assert_eq!(
        authenticator.verify(&resp, now + 5.0).unwrap(),
        AuthVerdict::Rejected(AuthRejection::Expired)
    );
}
