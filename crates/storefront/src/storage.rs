//! Embedded local state store.
//!
//! Plays the role browser local storage plays for the web shell: a handful
//! of JSON-encoded values under fixed string keys, surviving restarts.
//! Backed by `redb` so concurrent readers and the sync tasks never tear a
//! write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Single table holding every persisted value, JSON-encoded by key.
const STATE: TableDefinition<&str, &str> = TableDefinition::new("state");

/// Fixed keys of the persisted values.
pub mod keys {
    /// Anonymous cart snapshot (product id -> quantity).
    pub const ANON_CART: &str = "cart_items";
    /// Customer checkout draft.
    pub const CHECKOUT_DRAFT: &str = "checkout_data";
    /// Admin (counter sales) cart snapshot.
    pub const ADMIN_CART: &str = "admin_cart_items";
    /// Admin checkout draft.
    pub const ADMIN_CHECKOUT_DRAFT: &str = "admin_checkout_data";
    /// Persisted auth session.
    pub const AUTH_SESSION: &str = "auth_session";
}

/// Errors that can occur reading or writing local state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open state database: {0}")]
    Open(#[from] redb::DatabaseError),
    #[error("state transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("state table unavailable: {0}")]
    Table(#[from] redb::TableError),
    #[error("state read/write failed: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("state commit failed: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("state directory unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("state entry is not valid JSON: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("cannot determine local data directory")]
    NoDataDir,
}

/// Local key-value store for engine state.
///
/// Cheaply cloneable; all clones share the same database handle.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
}

impl LocalStore {
    /// Open (or create) the store at `path`, or at the platform default
    /// location (`<data dir>/frozen-mango/state.redb`) when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(path: Option<&Path>) -> Result<Self, StorageError> {
        let db_path = match path {
            Some(p) => p.to_path_buf(),
            None => default_path()?,
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        debug!(path = %db_path.display(), "opening local state store");
        let db = Database::create(&db_path)?;

        // Ensure the table exists so first reads don't fail
        let txn = db.begin_write()?;
        txn.open_table(STATE)?;
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Read and decode the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreadable or the entry is not
    /// valid JSON for `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Encode `value` and store it under `key`, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write transaction fails.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(value)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE)?;
            table.insert(key, encoded.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Delete the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE)?;
            table.remove(key)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Whether a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreadable.
    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE)?;
        Ok(table.get(key)?.is_some())
    }
}

/// Platform default path for the state database.
fn default_path() -> Result<PathBuf, StorageError> {
    let dir = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
    Ok(dir.join("frozen-mango").join("state.redb"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn open_temp() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(Some(&dir.path().join("state.redb"))).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, store) = open_temp();
        let mut snapshot = BTreeMap::new();
        snapshot.insert(1_i32, 3_u32);
        snapshot.insert(4_i32, 1_u32);

        store.put(keys::ANON_CART, &snapshot).unwrap();
        let loaded: BTreeMap<i32, u32> = store.get(keys::ANON_CART).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_get_missing_key() {
        let (_dir, store) = open_temp();
        let loaded: Option<BTreeMap<i32, u32>> = store.get(keys::ANON_CART).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_delete_removes_key() {
        let (_dir, store) = open_temp();
        store.put(keys::CHECKOUT_DRAFT, &"draft").unwrap();
        assert!(store.contains(keys::CHECKOUT_DRAFT).unwrap());

        store.delete(keys::CHECKOUT_DRAFT).unwrap();
        assert!(!store.contains(keys::CHECKOUT_DRAFT).unwrap());

        // Deleting an absent key is not an error
        store.delete(keys::CHECKOUT_DRAFT).unwrap();
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        {
            let store = LocalStore::open(Some(&path)).unwrap();
            store.put(keys::ADMIN_CART, &vec![1, 2, 3]).unwrap();
        }
        let store = LocalStore::open(Some(&path)).unwrap();
        let loaded: Vec<i32> = store.get(keys::ADMIN_CART).unwrap().unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
    }
}
