//! Utility modules for configuration, error handling and encoding helpers.

pub mod b64;
pub mod config;
pub mod errors;

pub use config::*;
pub use errors::*;
