//! `UGH_*` environment overrides.
//!
//! Kept in its own test binary: it mutates the process environment, which
//! would race with any other test reading it.

use tempfile::TempDir;
use ugh::utils::{ConfigError, UghConfig};
use ugh::UghError;

const LIFETIME_VAR: &str = "UGH_CRYPTO_CHALLENGE_LIFETIME";
const LEVEL_VAR: &str = "UGH_LOGGING_LEVEL";

#[test]
fn test_env_overrides_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ugh.toml");
    UghConfig::default().save(&path).unwrap();

    std::env::set_var(LIFETIME_VAR, "17");
    std::env::set_var(LEVEL_VAR, "debug");
    let config = UghConfig::load(Some(&path));
    std::env::remove_var(LEVEL_VAR);

    let config = config.unwrap();
    assert_eq!(config.crypto.challenge_lifetime, 17);
    assert_eq!(config.logging.level, "debug");

    std::env::set_var(LIFETIME_VAR, "soon");
    let invalid = UghConfig::load(Some(&path));
    std::env::set_var(LIFETIME_VAR, "0");
    let zero = UghConfig::load(Some(&path));
    std::env::remove_var(LIFETIME_VAR);

    assert!(matches!(
        invalid,
        Err(UghError::Config(ConfigError::InvalidValue { ref value, .. })) if value == "soon"
    ));
    assert!(matches!(
        zero,
        Err(UghError::Config(ConfigError::InvalidValue { .. }))
    ));
    assert_eq!(
        UghConfig::load(Some(&path)).unwrap().crypto.challenge_lifetime,
        UghConfig::default().crypto.challenge_lifetime
    );
}
