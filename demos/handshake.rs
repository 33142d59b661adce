//! Account creation and login between an in-process client and server.
//!
//! Run with `cargo run --example handshake`.

use std::sync::Arc;
use ugh::{
    handshake::{receive_encrypted, AuthVerdict, Authenticator, Registrar, ServerIdentity},
    messages::{
        unix_now, AccountReq, AccountResp, AuthChallengeResp, AuthReq, DecodeLimits,
        EncryptedMessage, Message, SignedMessage,
    },
    utils::CryptoConfig,
    MemoryUserStore, SecretKey,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CryptoConfig::default();
    let identity = Arc::new(ServerIdentity::generate());
    let store = Arc::new(MemoryUserStore::new());
    let registrar = Registrar::new(Arc::clone(&identity), store.clone(), &config);
    let authenticator = Authenticator::new(identity, store, &config);

    let client_sk = SecretKey::generate();
    println!("Client identity: {}", client_sk.public_key());

    // Everything crosses the "wire" as a dict.
    let wire = Message::from(SignedMessage::sign(
        AccountReq::new("Sam", client_sk.public_key()),
        &client_sk,
    ))
    .to_dict();
    println!("-> {wire}");
    let resp = registrar.handle_dict(&wire)?;
    let wire = Message::from(resp).to_dict();
    println!("<- {wire}");

    let Message::AccountResp(resp) = Message::from_dict(&wire)? else {
        return Err("expected an AccountResp".into());
    };
    print_resp(&resp);

    let wire = Message::from(AuthReq::new(client_sk.public_key())).to_dict();
    println!("-> {wire}");
    let Some(enc_chal) = authenticator.challenge_dict(&wire)? else {
        return Err("no challenge issued".into());
    };
    let wire = Message::from(enc_chal).to_dict();
    println!("<- {wire}");

    let enc_chal = receive_encrypted(&wire, &DecodeLimits::default()).ok_or("bad challenge")?;
    let wire = Message::from(AuthChallengeResp::respond(enc_chal, &client_sk)).to_dict();
    println!("-> {wire}");

    match authenticator.verify_dict(&wire, unix_now())? {
        AuthVerdict::Authenticated(user) => println!("Logged in as {user}"),
        AuthVerdict::Rejected(why) => println!("Login rejected: {why}"),
    }
    Ok(())
}

fn print_resp(resp: &AccountResp) {
    match resp.err() {
        None => println!(
            "Account created, credential is {} opaque bytes",
            resp.cred().map_or(0, EncryptedMessage::len)
        ),
        Some(err) => println!("Account refused: {err}"),
    }
}
