//! Overlay transaction over a [`KeyValueStore`].
//!
//! Reads see the transaction's own uncommitted writes. Nothing reaches the
//! backend until [`StoreTx::commit`], which hands every buffered mutation to
//! the backend as a single [`WriteBatch`]. Dropping a `StoreTx` discards it.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::{Column, KeyValueStore, ScanResult, StoreError, WriteBatch};

type Pending = BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>;

pub struct StoreTx<'a> {
    store: &'a dyn KeyValueStore,
    pending: Pending,
    writable: bool,
}

impl<'a> StoreTx<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self {
            store,
            pending: Pending::new(),
            writable: true,
        }
    }

    pub fn read_only(store: &'a dyn KeyValueStore) -> Self {
        Self {
            store,
            pending: Pending::new(),
            writable: false,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(entry) = self.pending.get(&(column, key.to_vec())) {
            return Ok(entry.clone());
        }
        self.store.get(column, key)
    }

    pub fn exists(&self, column: Column, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(column, key)?.is_some())
    }

    pub fn put(&mut self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(column));
        }
        self.pending
            .insert((column, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    pub fn delete(&mut self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(column));
        }
        self.pending.insert((column, key.to_vec()), None);
        Ok(())
    }

    /// Ordered prefix scan merging committed entries with buffered writes.
    pub fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.store.scan_prefix(column, prefix)?.into_iter().collect();
        let start = (column, prefix.to_vec());
        for ((entry_column, key), value) in self
            .pending
            .range((Bound::Included(start), Bound::Unbounded))
        {
            if *entry_column != column || !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Deletes every entry under `prefix`, returning how many were removed.
    pub fn delete_prefix(&mut self, column: Column, prefix: &[u8]) -> Result<usize, StoreError> {
        let entries = self.scan_prefix(column, prefix)?;
        for (key, _) in &entries {
            self.delete(column, key)?;
        }
        Ok(entries.len())
    }

    pub fn commit(self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if !self.writable {
            return Err(StoreError::Backend(
                "commit of a read-only transaction with pending writes".to_string(),
            ));
        }
        let mut batch = WriteBatch::with_capacity(self.pending.len());
        for ((column, key), value) in self.pending {
            match value {
                Some(value) => batch.put(column, key, value),
                None => batch.delete(column, key),
            }
        }
        wledger_log::log_trace!("committing {} buffered ledger writes", batch.len());
        self.store.write_batch(&batch)
    }
}

/// Runs `f` against a read-only transaction.
pub fn view<T, E, F>(store: &dyn KeyValueStore, f: F) -> Result<T, E>
where
    F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
{
    let tx = StoreTx::read_only(store);
    f(&tx)
}

/// Runs `f` against a writable transaction, committing only if `f` succeeds.
pub fn update<T, E, F>(store: &dyn KeyValueStore, f: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: FnOnce(&mut StoreTx<'_>) -> Result<T, E>,
{
    let mut tx = StoreTx::new(store);
    let value = f(&mut tx)?;
    tx.commit()?;
    Ok(value)
}
