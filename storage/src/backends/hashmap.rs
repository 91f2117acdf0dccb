//! # HashMap storage backend
//!
//! Storage backend that keeps data in a heap-allocated HashMap.
use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    error::StorageError,
    storage::{Result, Storage, StorageIterator, WriteBatch, WriteBatchItem},
};

/// HashMap backend
#[derive(Debug, Default)]
pub struct Backend {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl Backend {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Vec<u8>, Vec<u8>>>> {
        self.data
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, HashMap<Vec<u8>, Vec<u8>>>> {
        self.data
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

impl Storage for Backend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write_lock()?.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.write_lock()?.remove(key);
        Ok(())
    }

    fn prefix_iterator<'a, 'b: 'a>(&'a self, prefix: &'b [u8]) -> Result<StorageIterator<'a>> {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .read()?
            .iter()
            .filter(|(k, _v)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        // Same order as the rocksdb backend
        entries.sort();

        Ok(Box::new(entries.into_iter()))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self.write_lock()?;
        for item in batch.batch {
            match item {
                WriteBatchItem::Put(key, value) => {
                    data.insert(key, value);
                }
                WriteBatchItem::Delete(key) => {
                    data.remove(&key);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Box<dyn Storage> {
        Box::new(Backend::new())
    }

    #[test]
    fn test_hashmap() {
        let storage = backend();

        assert_eq!(None, storage.get(b"name").unwrap());
        storage.put(b"name".to_vec(), b"john".to_vec()).unwrap();
        assert_eq!(Some("john".into()), storage.get(b"name").unwrap());
        storage.delete(b"name").unwrap();
        assert_eq!(None, storage.get(b"name").unwrap());
    }

    #[test]
    fn test_prefix_iterator_is_sorted() {
        let storage = backend();
        storage.put(b"b-2".to_vec(), vec![2]).unwrap();
        storage.put(b"a-1".to_vec(), vec![0]).unwrap();
        storage.put(b"b-1".to_vec(), vec![1]).unwrap();

        let keys: Vec<Vec<u8>> = storage
            .prefix_iterator(b"b-")
            .unwrap()
            .map(|(k, _v)| k)
            .collect();
        assert_eq!(keys, vec![b"b-1".to_vec(), b"b-2".to_vec()]);
    }
}
