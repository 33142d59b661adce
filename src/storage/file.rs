//! sled-backed user store.
//!
//! Three trees hold the data:
//! - `users_by_rowid`: big-endian row id to record, where a record is the
//!   32-byte key blob followed by the UTF-8 nickname
//! - `users_by_pubkey`: key blob to big-endian row id
//! - `users_meta`: the next row id to hand out
//!
//! Inserts run as one transaction over all three trees, so a key can only
//! ever be registered once.

use super::{next_rowid, UserStore};
use crate::crypto::{PublicKey, KEY_LENGTH};
use crate::messages::User;
use crate::utils::{Result, StorageError, UghError};
use sled::transaction::{abort, TransactionError, Transactional};
use std::fmt;
use std::path::{Path, PathBuf};

const USERS_BY_ROWID_TREE: &str = "users_by_rowid";
const USERS_BY_PUBKEY_TREE: &str = "users_by_pubkey";
const USERS_META_TREE: &str = "users_meta";
const NEXT_ROWID_KEY: &[u8] = b"next_rowid";

fn db_error(e: &sled::Error) -> UghError {
    StorageError::Database {
        reason: e.to_string(),
    }
    .into()
}

fn corrupt(reason: impl Into<String>) -> StorageError {
    StorageError::Corrupt {
        reason: reason.into(),
    }
}

fn decode_rowid(bytes: &[u8]) -> std::result::Result<i64, StorageError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| corrupt(format!("row id is {} bytes", bytes.len())))?;
    Ok(i64::from_be_bytes(raw))
}

fn encode_record(user: &User) -> Vec<u8> {
    let mut record = user.pk.adapt().to_vec();
    record.extend_from_slice(user.nick.as_bytes());
    record
}

fn decode_record(rowid: i64, bytes: &[u8]) -> Result<User> {
    if bytes.len() < KEY_LENGTH {
        return Err(corrupt(format!("record {rowid} is {} bytes", bytes.len())).into());
    }
    let (blob, nick) = bytes.split_at(KEY_LENGTH);
    let pk = PublicKey::convert(blob).map_err(|e| corrupt(format!("record {rowid}: {e}")))?;
    let nick = std::str::from_utf8(nick)
        .map_err(|e| corrupt(format!("record {rowid}: nickname {e}")))?;
    Ok(User::new(nick, pk).with_rowid(rowid))
}

/// Persistent [`UserStore`] in a sled database
pub struct FileUserStore {
    path: PathBuf,
    db: sled::Db,
    by_rowid: sled::Tree,
    by_pubkey: sled::Tree,
    meta: sled::Tree,
}

impl FileUserStore {
    /// Open or create the database at `path`
    ///
    /// # Errors
    ///
    /// `StorageError::Database` if sled cannot open the database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path).map_err(|e| db_error(&e))?;
        let by_rowid = db.open_tree(USERS_BY_ROWID_TREE).map_err(|e| db_error(&e))?;
        let by_pubkey = db.open_tree(USERS_BY_PUBKEY_TREE).map_err(|e| db_error(&e))?;
        let meta = db.open_tree(USERS_META_TREE).map_err(|e| db_error(&e))?;

        log::info!(
            "Opened user store {} with {} users",
            path.display(),
            by_rowid.len()
        );
        Ok(Self {
            path,
            db,
            by_rowid,
            by_pubkey,
            meta,
        })
    }

    /// Database location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileUserStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUserStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl UserStore for FileUserStore {
    fn insert_user(&self, user: &User) -> Result<User> {
        let blob = user.pk.adapt();
        let result = (&self.by_rowid, &self.by_pubkey, &self.meta).transaction(
            |(by_rowid, by_pubkey, meta)| {
                if by_pubkey.get(blob)?.is_some() {
                    return abort(StorageError::PubkeyExists);
                }
                let rowid = match meta.get(NEXT_ROWID_KEY)? {
                    Some(bytes) => match decode_rowid(&bytes) {
                        Ok(rowid) => rowid,
                        Err(e) => return abort(e),
                    },
                    None => 1,
                };
                let next = match next_rowid(rowid) {
                    Ok(next) => next,
                    Err(UghError::Storage(e)) => return abort(e),
                    Err(e) => return abort(corrupt(e.to_string())),
                };

                let stored = User::new(user.nick.clone(), user.pk).with_rowid(rowid);
                by_rowid.insert(&rowid.to_be_bytes()[..], encode_record(&stored))?;
                by_pubkey.insert(&blob[..], &rowid.to_be_bytes()[..])?;
                meta.insert(NEXT_ROWID_KEY, &next.to_be_bytes()[..])?;
                Ok(stored)
            },
        );

        let stored = match result {
            Ok(stored) => stored,
            Err(TransactionError::Abort(e)) => return Err(e.into()),
            Err(TransactionError::Storage(e)) => {
                log::error!("Failed to store {user}: {e}");
                return Err(db_error(&e));
            }
        };
        self.db.flush().map_err(|e| db_error(&e))?;

        log::debug!("Stored {stored} in {}", self.path.display());
        Ok(stored)
    }

    fn users(&self) -> Result<Vec<User>> {
        self.by_rowid
            .iter()
            .map(|entry| {
                let (key, record) = entry.map_err(|e| db_error(&e))?;
                decode_record(decode_rowid(&key)?, &record)
            })
            .collect()
    }

    fn user_with_pubkey(&self, pk: &PublicKey) -> Result<Option<User>> {
        match self.by_pubkey.get(pk.adapt()).map_err(|e| db_error(&e))? {
            Some(rowid) => self.user_with_rowid(decode_rowid(&rowid)?),
            None => Ok(None),
        }
    }

    fn user_with_rowid(&self, rowid: i64) -> Result<Option<User>> {
        self.by_rowid
            .get(rowid.to_be_bytes())
            .map_err(|e| db_error(&e))?
            .map(|record| decode_record(rowid, &record))
            .transpose()
    }
}
