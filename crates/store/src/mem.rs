//! In-process reference [`OrderedStore`] backend.
//!
//! Backed by a `BTreeMap` behind a single `RwLock` (concurrent readers, one
//! writer at a time -- matching §5's shared-resource policy for the local
//! store) plus the WAL in [`crate::wal`] for durability across `close`/reopen.

use crate::wal::{self, WalRecord, WalWriter};
use crate::{Entry, OrderedStore};
use hxhim_core::{HxhimError, HxhimResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An in-memory ordered store with an optional on-disk WAL.
///
/// `MemStore::open(None)` gives a pure in-memory store (data lost on drop,
/// matching "no db_path configured"); `MemStore::open(Some(path))` replays any
/// existing WAL at `path` and appends every subsequent write to it.
pub struct MemStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    wal: Option<RwLock<WalWriter>>,
}

impl MemStore {
    /// Open a store, optionally backed by a WAL file for durability.
    pub fn open(wal_path: Option<PathBuf>) -> HxhimResult<Self> {
        let mut data = BTreeMap::new();
        let wal = match wal_path {
            Some(path) => {
                for record in wal::replay(&path)? {
                    apply(&mut data, record);
                }
                Some(RwLock::new(WalWriter::open(&path)?))
            }
            None => None,
        };
        Ok(MemStore { data: RwLock::new(data), wal })
    }

    /// Truncate an existing on-disk WAL, discarding any previously persisted
    /// data (spec §6 `create_new_db`).
    pub fn create_new(wal_path: Option<PathBuf>) -> HxhimResult<Self> {
        if let Some(path) = &wal_path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Self::open(wal_path)
    }

    fn log(&self, record: WalRecord) -> HxhimResult<()> {
        if let Some(wal) = &self.wal {
            wal.write().append(&record)?;
        }
        Ok(())
    }
}

fn apply(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, record: WalRecord) {
    match record {
        WalRecord::Put { key, value } => {
            data.insert(key, value);
        }
        WalRecord::Delete { key } => {
            data.remove(&key);
        }
    }
}

impl OrderedStore for MemStore {
    fn put(&self, key: &[u8], value: &[u8]) -> HxhimResult<()> {
        self.log(WalRecord::Put { key: key.to_vec(), value: value.to_vec() })?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> HxhimResult<()> {
        for (k, v) in entries {
            self.log(WalRecord::Put { key: k.clone(), value: v.clone() })?;
        }
        let mut data = self.data.write();
        for (k, v) in entries {
            data.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> HxhimResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn get_next(&self, seed: Option<&[u8]>) -> HxhimResult<Option<Entry>> {
        let data = self.data.read();
        let found = match seed {
            Some(k) => data.range::<[u8], _>((std::ops::Bound::Excluded(k), std::ops::Bound::Unbounded)).next(),
            None => data.iter().next(),
        };
        Ok(found.map(|(k, v)| (k.clone(), v.clone())))
    }

    fn get_prev(&self, seed: Option<&[u8]>) -> HxhimResult<Option<Entry>> {
        let data = self.data.read();
        let found = match seed {
            Some(k) => data.range::<[u8], _>((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(k))).next_back(),
            None => data.iter().next_back(),
        };
        Ok(found.map(|(k, v)| (k.clone(), v.clone())))
    }

    fn scan_forward(&self, seed: &[u8], num_recs: usize) -> HxhimResult<Vec<Entry>> {
        let data = self.data.read();
        Ok(data
            .range::<[u8], _>((std::ops::Bound::Included(seed), std::ops::Bound::Unbounded))
            .take(num_recs)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete(&self, key: &[u8]) -> HxhimResult<()> {
        self.log(WalRecord::Delete { key: key.to_vec() })?;
        self.data.write().remove(key);
        Ok(())
    }

    fn batch_delete(&self, keys: &[Vec<u8>]) -> HxhimResult<()> {
        for k in keys {
            self.log(WalRecord::Delete { key: k.clone() })?;
        }
        let mut data = self.data.write();
        for k in keys {
            data.remove(k);
        }
        Ok(())
    }

    fn commit(&self) -> HxhimResult<()> {
        // The WAL is already flushed to the OS after every append; commit is a
        // no-op hook for backends with a separate write buffer (spec §4.4 COMMIT).
        Ok(())
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore").field("len", &self.data.read().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = MemStore::open(None).unwrap();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        store.delete(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn ordered_scan() {
        let store = MemStore::open(None).unwrap();
        for i in 0..10u8 {
            store.put(&[i], &[i]).unwrap();
        }
        let first = store.get_next(None).unwrap().unwrap();
        assert_eq!(first.0, vec![0]);
        let next = store.get_next(Some(&first.0)).unwrap().unwrap();
        assert_eq!(next.0, vec![1]);
        let last = store.get_prev(None).unwrap().unwrap();
        assert_eq!(last.0, vec![9]);
    }

    #[test]
    fn reopen_after_close_replays_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("db.wal");
        {
            let store = MemStore::open(Some(path.clone())).unwrap();
            store.put(b"k", b"v").unwrap();
        }
        let reopened = MemStore::open(Some(path)).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn unflushed_data_without_wal_is_lost() {
        // Scenario E (spec §8): no db_path means no WAL, so data never survives
        // a fresh `MemStore::open`.
        let store = MemStore::open(None).unwrap();
        store.put(b"k", b"v").unwrap();
        drop(store);
        let reopened = MemStore::open(None).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), None);
    }
}
