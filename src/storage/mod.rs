//! User storage.
//!
//! The handshake layer only needs to register users and look them up by key
//! or row id. [`UserStore`] captures that; [`MemoryUserStore`] serves tests
//! and demos, [`FileUserStore`] keeps users in a sled database across
//! restarts.

pub mod file;
pub mod memory;

pub use file::FileUserStore;
pub use memory::MemoryUserStore;

use crate::crypto::PublicKey;
use crate::messages::User;
use crate::utils::{Result, StorageError};

/// Registry of users keyed by public key, each with a unique row id
pub trait UserStore: Send + Sync {
    /// Persist `user`, returning it with its assigned row id
    ///
    /// # Errors
    ///
    /// `StorageError::PubkeyExists` if the key is already registered
    fn insert_user(&self, user: &User) -> Result<User>;

    /// All users in row id order
    fn users(&self) -> Result<Vec<User>>;

    /// The user registered under `pk`, if any
    fn user_with_pubkey(&self, pk: &PublicKey) -> Result<Option<User>>;

    /// The user stored at `rowid`, if any
    fn user_with_rowid(&self, rowid: i64) -> Result<Option<User>>;
}

/// The row id following `rowid`
pub(crate) fn next_rowid(rowid: i64) -> Result<i64> {
    rowid.checked_add(1).ok_or_else(|| {
        StorageError::Corrupt {
            reason: format!("row id counter exhausted at {rowid}"),
        }
        .into()
    })
}
