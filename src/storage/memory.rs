//! In-memory user store.

use super::{next_rowid, UserStore};
use crate::crypto::PublicKey;
use crate::messages::User;
use crate::utils::{Result, StorageError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct UserTable {
    rows: BTreeMap<i64, User>,
    by_pubkey: HashMap<PublicKey, i64>,
    next: i64,
}

impl Default for UserTable {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_pubkey: HashMap::new(),
            next: 1,
        }
    }
}

/// Volatile [`UserStore`], lost when dropped
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    table: Mutex<UserTable>,
}

impl MemoryUserStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn insert_user(&self, user: &User) -> Result<User> {
        let mut table = self.table.lock();
        if table.by_pubkey.contains_key(&user.pk) {
            return Err(StorageError::PubkeyExists.into());
        }
        let rowid = table.next;
        table.next = next_rowid(rowid)?;

        let stored = User::new(user.nick.clone(), user.pk).with_rowid(rowid);
        table.by_pubkey.insert(stored.pk, rowid);
        table.rows.insert(rowid, stored.clone());
        log::debug!("Stored {stored}");
        Ok(stored)
    }

    fn users(&self) -> Result<Vec<User>> {
        Ok(self.table.lock().rows.values().cloned().collect())
    }

    fn user_with_pubkey(&self, pk: &PublicKey) -> Result<Option<User>> {
        let table = self.table.lock();
        Ok(table
            .by_pubkey
            .get(pk)
            .and_then(|rowid| table.rows.get(rowid))
            .cloned())
    }

    fn user_with_rowid(&self, rowid: i64) -> Result<Option<User>> {
        Ok(self.table.lock().rows.get(&rowid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::UghError;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_and_lookup() {
        let store = MemoryUserStore::new();
        let pk = SecretKey::generate().public_key();
        let user = store.insert_user(&User::new("Foo", pk)).unwrap();

        assert!(user.is_persisted());
        assert_eq!(store.user_with_pubkey(&pk).unwrap(), Some(user.clone()));
        assert_eq!(store.user_with_rowid(user.rowid.unwrap()).unwrap(), Some(user.clone()));
        assert_eq!(store.users().unwrap(), vec![user]);
        assert_eq!(store.user_with_rowid(99).unwrap(), None);
    }

    #[test]
    fn test_rowids_are_sequential() {
        let store = MemoryUserStore::new();
        let a = store.insert_user(&User::new("a", SecretKey::generate().public_key())).unwrap();
        let b = store.insert_user(&User::new("b", SecretKey::generate().public_key())).unwrap();
        assert_eq!(a.rowid, Some(1));
        assert_eq!(b.rowid, Some(2));
        assert_eq!(store.users().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_exhausted_rowids() {
        let store = MemoryUserStore::new();
        store.table.lock().next = i64::MAX;
        let pk = SecretKey::generate().public_key();

        assert!(matches!(
            store.insert_user(&User::new("Foo", pk)),
            Err(UghError::Storage(StorageError::Corrupt { .. }))
        ));
        assert_eq!(store.user_with_pubkey(&pk).unwrap(), None);
    }

    #[test]
    fn test_concurrent_registration_of_one_key() {
        let store = Arc::new(MemoryUserStore::new());
        let pk = SecretKey::generate().public_key();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.insert_user(&User::new(format!("u{i}"), pk)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
            r,
            Err(UghError::Storage(StorageError::PubkeyExists))
        )));
        assert_eq!(store.users().unwrap().len(), 1);
    }
}
