//! CLI entry point for the ugh trust layer.
//!
//! Manages the local identity key and configuration, and runs a local
//! demonstration of account creation and challenge-response login.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ugh::{
    handshake::{AuthVerdict, Authenticator, Registrar, ServerIdentity},
    messages::{unix_now, AccountReq, AuthChallengeResp, AuthReq, Message, SignedMessage},
    utils::{StorageConfig, UghConfig, DEFAULT_CONFIG_FILE},
    FileUserStore, SecretKey,
};

/// File name of the local secret key seed inside the keys directory
const SECKEY_FILE: &str = "seckey";

/// ugh - keys, envelopes and authentication for peer-to-peer apps
#[derive(Parser)]
#[command(name = "ugh")]
#[command(about = "Signed and encrypted envelopes with challenge-response authentication")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,

    /// Data directory for users and keys
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and inspect the local identity key
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Generate and inspect configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Create an account and log in against a local server, printing every message
    Demo {
        /// Nickname to register
        #[arg(short, long, default_value = "Foo")]
        nick: String,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a new secret key
    Generate {
        /// Overwrite an existing key
        #[arg(short, long)]
        force: bool,
    },
    /// Display the public key
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = KeyFormat::Base64)]
        format: KeyFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyFormat {
    Base64,
    Hex,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        file: Option<PathBuf>,
    },
    /// Show the effective configuration
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = UghConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage = StorageConfig::rooted_at(data_dir);
    }

    setup_logging(cli.verbose, cli.quiet, &config.logging.level);
    config.ensure_directories()?;

    match cli.command {
        Commands::Keys { action } => handle_key_commands(action, &config),
        Commands::Config { action } => handle_config_commands(action, &config),
        Commands::Demo { nick } => handle_demo_command(&nick, &config),
    }
}

fn setup_logging(verbose: u8, quiet: bool, configured: &str) {
    let log_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();
}

fn handle_key_commands(action: KeyCommands, config: &UghConfig) -> Result<()> {
    let seckey_path = config.storage.keys_dir.join(SECKEY_FILE);
    match action {
        KeyCommands::Generate { force } => {
            if seckey_path.exists() && !force {
                return Err(anyhow::anyhow!(
                    "Secret key already exists at {}. Use --force to overwrite.",
                    seckey_path.display()
                ));
            }

            let sk = SecretKey::generate();
            write_seckey(&seckey_path, &sk)?;
            println!("✓ Secret key generated");
            println!("  Public key: {}", sk.public_key().to_base64());
            println!("  Saved to: {}", seckey_path.display());
        }
        KeyCommands::Show { format } => {
            let pk = read_seckey(&seckey_path)?.public_key();
            match format {
                KeyFormat::Base64 => println!("{}", pk.to_base64()),
                KeyFormat::Hex => println!("{}", hex::encode(pk.as_bytes())),
            }
        }
    }
    Ok(())
}

fn handle_config_commands(action: ConfigCommands, config: &UghConfig) -> Result<()> {
    match action {
        ConfigCommands::Generate { output } => {
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            UghConfig::default().save(&output_path)?;
            println!("✓ Configuration generated: {}", output_path.display());
        }
        ConfigCommands::Validate { file } => {
            match file {
                Some(path) => UghConfig::from_file(path)?,
                None => config.clone(),
            }
            .validate()?;
            println!("✓ Configuration is valid");
        }
        ConfigCommands::Show => println!("{}", config.to_toml_string()?),
    }
    Ok(())
}

fn handle_demo_command(nick: &str, config: &UghConfig) -> Result<()> {
    let seckey_path = config.storage.keys_dir.join(SECKEY_FILE);
    let sk = if seckey_path.exists() {
        read_seckey(&seckey_path)?
    } else {
        info!("No secret key found, generating one");
        let sk = SecretKey::generate();
        write_seckey(&seckey_path, &sk)?;
        sk
    };

    let identity = Arc::new(ServerIdentity::generate());
    let store = Arc::new(FileUserStore::open(&config.storage.users_db)?);
    let registrar = Registrar::new(Arc::clone(&identity), store.clone(), &config.crypto);
    let authenticator = Authenticator::new(identity, store, &config.crypto);

    let req = SignedMessage::sign(AccountReq::new(nick, sk.public_key()), &sk);
    show("client -> server", &Message::from(req.clone()));
    let resp = registrar.handle(&req)?;
    show("server -> client", &Message::from(resp.clone()));
    if let Some(err) = resp.err() {
        warn!("Account not created: {err}");
    }

    let auth_req = AuthReq::new(sk.public_key());
    show("client -> server", &Message::from(auth_req.clone()));
    let Some(enc_chal) = authenticator.challenge(&auth_req)? else {
        return Err(anyhow::anyhow!("Server refused to issue a challenge"));
    };
    show("server -> client", &Message::from(enc_chal.clone()));

    let chal_resp = AuthChallengeResp::respond(enc_chal, &sk);
    show("client -> server", &Message::from(chal_resp.clone()));
    match authenticator.verify(&chal_resp, unix_now())? {
        AuthVerdict::Authenticated(user) => println!("✓ Authenticated as {user}"),
        AuthVerdict::Rejected(why) => println!("✗ Rejected: {why}"),
    }
    Ok(())
}

fn show(direction: &str, msg: &Message) {
    println!("{direction}: {msg}");
    println!("  {}", msg.to_dict());
}

fn read_seckey(path: &Path) -> Result<SecretKey> {
    let seed = std::fs::read(path)
        .with_context(|| format!("No secret key at {}. Run `ugh keys generate`.", path.display()))?;
    SecretKey::from_bytes(&seed)
        .with_context(|| format!("Invalid secret key in {}", path.display()))
}

fn write_seckey(path: &Path, sk: &SecretKey) -> Result<()> {
    std::fs::write(path, sk.to_seed())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote secret key for {}", sk.public_key().to_base64());
    Ok(())
}
