//! # Storage Manager
//!
//! Persistence of the solid state of every chain over a generic key/value [`Storage`] backend.
//! Values are serialized with bincode; the solid state and the block producing it are written
//! in a single batch so a crash never leaves them out of sync.
use std::sync::Arc;

use bincode::{deserialize, serialize};
use serde::{de::DeserializeOwned, Serialize};

use scchain_config::config;
use scchain_data_structures::{
    chain::ChainId,
    state::{Block, VirtualState},
};
use scchain_storage::{
    backends,
    error::StorageError,
    storage::{Storage, WriteBatch},
};

use crate::{
    actors::storage_keys::{block_key, solid_state_key},
    collaborators::StatePersistence,
};

/// Create the backend selected in the configuration
pub fn create_appropriate_backend(
    conf: &config::Storage,
) -> Result<Arc<dyn Storage>, StorageError> {
    match conf.backend {
        config::StorageBackend::HashMap => Ok(Arc::new(backends::hashmap::Backend::new())),
        #[cfg(feature = "rocksdb-backend")]
        config::StorageBackend::RocksDB => {
            let backend = backends::rocksdb::open(conf.db_path.as_path())?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        config::StorageBackend::RocksDB => Err(StorageError::Connection(
            "this build does not include the rocksdb backend".to_string(),
        )),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serialize(value).map_err(|e| StorageError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    deserialize(bytes).map_err(|e| StorageError::Decode(e.to_string()))
}

/// Solid state persistence shared by every chain of the process
#[derive(Clone)]
pub struct SolidStateStore {
    backend: Arc<dyn Storage>,
}

impl SolidStateStore {
    /// Store on top of `backend`
    pub fn new(backend: Arc<dyn Storage>) -> Self {
        SolidStateStore { backend }
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(key.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

impl StatePersistence for SolidStateStore {
    fn load_solid_state(
        &self,
        chain_id: &ChainId,
    ) -> Result<Option<(VirtualState, Block)>, StorageError> {
        let state: VirtualState = match self.get(&solid_state_key(chain_id))? {
            Some(state) => state,
            None => return Ok(None),
        };
        let block = self
            .load_block(chain_id, state.block_index)?
            .ok_or_else(|| {
                StorageError::Decode(format!(
                    "solid state of chain {} at index {} has no block",
                    chain_id.short(),
                    state.block_index
                ))
            })?;

        Ok(Some((state, block)))
    }

    fn commit(&self, state: &VirtualState, block: &Block) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        batch.put(
            block_key(&state.chain_id, block.block_index).into_bytes(),
            encode(block)?,
        );
        batch.put(solid_state_key(&state.chain_id).into_bytes(), encode(state)?);

        self.backend.write(batch)
    }

    fn load_block(&self, chain_id: &ChainId, index: u32) -> Result<Option<Block>, StorageError> {
        self.get(&block_key(chain_id, index))
    }
}
