use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    chain::{ChainId, Hash, RequestId, TransactionId},
    error::{StateError, WireError},
    wire::{read_bytes16, read_i64, read_u16, read_u8, write_bytes16, write_i64, write_len, write_u8, Wire},
};

const MUTATION_SET: u8 = 0;
const MUTATION_DELETE: u8 = 1;

/// Single change to the key/value state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Insert or overwrite a key
    Set {
        /// Key
        key: Vec<u8>,
        /// New value
        value: Vec<u8>,
    },
    /// Remove a key
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

impl Mutation {
    fn apply_to(&self, variables: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        match self {
            Mutation::Set { key, value } => {
                variables.insert(key.clone(), value.clone());
            }
            Mutation::Delete { key } => {
                variables.remove(key);
            }
        }
    }
}

impl Wire for Mutation {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        match self {
            Mutation::Set { key, value } => {
                write_u8(buf, MUTATION_SET)?;
                write_bytes16(buf, key, "mutation key")?;
                write_bytes16(buf, value, "mutation value")
            }
            Mutation::Delete { key } => {
                write_u8(buf, MUTATION_DELETE)?;
                write_bytes16(buf, key, "mutation key")
            }
        }
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        match read_u8(r, "mutation tag")? {
            MUTATION_SET => Ok(Mutation::Set {
                key: read_bytes16(r, "mutation key")?,
                value: read_bytes16(r, "mutation value")?,
            }),
            MUTATION_DELETE => Ok(Mutation::Delete {
                key: read_bytes16(r, "mutation key")?,
            }),
            other => Err(WireError::InvalidMutationTag(other)),
        }
    }
}

/// Mutations produced by processing one request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Request which produced the mutations
    pub request_id: RequestId,
    /// Unix timestamp in nanoseconds of the batch the request was processed in
    pub timestamp: i64,
    /// Ordered list of mutations
    pub mutations: Vec<Mutation>,
}

impl Wire for StateUpdate {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        self.request_id.write_to(buf)?;
        write_i64(buf, self.timestamp)?;
        write_len(buf, self.mutations.len(), "mutations")?;
        for m in &self.mutations {
            m.write_to(buf)?;
        }

        Ok(())
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        let request_id = RequestId::read_from(r)?;
        let timestamp = read_i64(r, "state update timestamp")?;
        let count = read_u16(r, "mutations")?;
        let mutations = (0..count)
            .map(|_| Mutation::read_from(r))
            .collect::<Result<_, _>>()?;

        Ok(StateUpdate {
            request_id,
            timestamp,
            mutations,
        })
    }
}

/// Set of state updates advancing the state by one index
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Index of the state this block produces
    pub block_index: u32,
    /// Updates, one per processed request
    pub state_updates: Vec<StateUpdate>,
    /// Anchoring transaction which confirmed the block, once known
    pub state_tx_id: Option<TransactionId>,
}

impl Block {
    /// Empty block producing the origin state
    pub fn origin() -> Self {
        Block::default()
    }

    /// New unconfirmed block
    pub fn new(block_index: u32, state_updates: Vec<StateUpdate>) -> Self {
        Block {
            block_index,
            state_updates,
            state_tx_id: None,
        }
    }

    /// Number of updates, as announced in block headers
    pub fn size(&self) -> usize {
        self.state_updates.len()
    }

    /// Requests processed in this block
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.state_updates.iter().map(|u| u.request_id).collect()
    }

    /// Hash of the contents of the block. The anchoring transaction id is not part of it.
    pub fn essence_hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.block_index.to_be_bytes());
        for update in &self.state_updates {
            hasher.update(update.request_id.as_bytes());
            hasher.update(update.timestamp.to_be_bytes());
            for m in &update.mutations {
                match m {
                    Mutation::Set { key, value } => {
                        hasher.update([MUTATION_SET]);
                        hasher.update((key.len() as u64).to_be_bytes());
                        hasher.update(key);
                        hasher.update((value.len() as u64).to_be_bytes());
                        hasher.update(value);
                    }
                    Mutation::Delete { key } => {
                        hasher.update([MUTATION_DELETE]);
                        hasher.update((key.len() as u64).to_be_bytes());
                        hasher.update(key);
                    }
                }
            }
        }

        Hash(hasher.finalize().into())
    }
}

/// Key/value state of a chain together with its block index
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualState {
    /// Chain owning the state
    pub chain_id: ChainId,
    /// Index of the last applied block
    pub block_index: u32,
    /// False until the origin block is applied
    pub initialized: bool,
    /// Timestamp of the last applied update
    pub timestamp: i64,
    /// Chained hash of every block applied so far
    pub state_hash: Hash,
    /// Variables
    pub variables: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl VirtualState {
    /// State before the origin block is applied
    pub fn pre_origin(chain_id: ChainId) -> Self {
        VirtualState {
            chain_id,
            block_index: 0,
            initialized: false,
            timestamp: 0,
            state_hash: Hash::of(chain_id.as_bytes()),
            variables: BTreeMap::new(),
        }
    }

    /// Apply `block` in place.
    ///
    /// The block must be the origin block for a pre-origin state, otherwise it must have the
    /// next index. On error the state is left untouched.
    pub fn apply_block(&mut self, block: &Block) -> Result<(), StateError> {
        if !self.initialized {
            if block.block_index != 0 {
                return Err(StateError::InvalidOrigin(block.block_index));
            }
        } else if Some(block.block_index) != self.block_index.checked_add(1) {
            return Err(StateError::IndexMismatch {
                state: self.block_index,
                block: block.block_index,
            });
        }

        for update in &block.state_updates {
            for m in &update.mutations {
                m.apply_to(&mut self.variables);
            }
            self.timestamp = update.timestamp;
        }
        self.state_hash = Hash::of_parts(&[
            self.state_hash.as_bytes(),
            block.essence_hash().as_bytes(),
        ]);
        self.block_index = block.block_index;
        self.initialized = true;

        Ok(())
    }

    /// Copy of the state with `block` applied
    pub fn with_block(&self, block: &Block) -> Result<VirtualState, StateError> {
        let mut next = self.clone();
        next.apply_block(block)?;

        Ok(next)
    }

    /// Value of a variable
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.variables.get(key).map(Vec::as_slice)
    }
}
