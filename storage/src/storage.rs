//! Generic `Storage` trait implemented by every storage backend.

use crate::error::StorageError;

/// Result type for the Storage module
pub type Result<T> = std::result::Result<T, StorageError>;

/// Iterator over key/value pairs
pub type StorageIterator<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

/// Very simple key/value CRUD API for data storage.
///
/// Backends use interior mutability so that a single instance can be shared by every chain
/// running in the process.
pub trait Storage: Send + Sync {
    /// Retrieve an entry from the storage, identified by its key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Create or update an entry in the storage, identified by a key
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Delete an entry from the storage, identified by its key
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Iterate over all the keys starting with `prefix`
    fn prefix_iterator<'a, 'b: 'a>(&'a self, prefix: &'b [u8]) -> Result<StorageIterator<'a>>;

    /// Atomically write a batch of operations
    fn write(&self, batch: WriteBatch) -> Result<()>;
}

/// Operation of a [`WriteBatch`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteBatchItem {
    /// Create or update a key
    Put(Vec<u8>, Vec<u8>),
    /// Delete a key
    Delete(Vec<u8>),
}

/// List of operations written atomically
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    /// Operations, applied in order
    pub batch: Vec<WriteBatchItem>,
}

impl WriteBatch {
    /// Add a put operation
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.batch.push(WriteBatchItem::Put(key, value));
    }

    /// Add a delete operation
    pub fn delete(&mut self, key: Vec<u8>) {
        self.batch.push(WriteBatchItem::Delete(key));
    }

    /// Whether no operation was added
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}
