//! Contracts of the components the chain engine relies on but does not implement: the virtual
//! machine, the threshold signature scheme, the external ledger, the persistence of the solid
//! state and the blob cache.

use std::sync::Arc;

use futures::future::BoxFuture;

use scchain_data_structures::{
    chain::{AgentId, Balances, ChainId, Hash, TransactionId},
    request::{RequestPayload, SolidArgs},
    state::{Block, VirtualState},
    transaction::AnchorTransaction,
};
use scchain_storage::error::StorageError;

/// A request ready to be executed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchRequest {
    /// Request as read from the ledger
    pub payload: RequestPayload,
    /// Arguments with every blob resolved
    pub args: SolidArgs,
}

/// Everything the virtual machine needs to run a batch
#[derive(Clone, Debug)]
pub struct VmTask {
    /// Hash identifying the batch
    pub batch_hash: Hash,
    /// Solid state the batch runs on
    pub state: VirtualState,
    /// Requests, in batch order
    pub requests: Vec<BatchRequest>,
    /// Batch timestamp in unix nanoseconds, chosen by the leader
    pub timestamp: i64,
    /// Index of the leader proposing the batch
    pub leader: u16,
    /// Agent receiving the fees
    pub fee_destination: AgentId,
    /// Colored balances of the chain
    pub balances: Balances,
}

/// Result of running a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmOutput {
    /// Block with one update per request, producing the next state
    pub block: Block,
    /// Unsigned anchoring transaction for the next state
    pub tx: AnchorTransaction,
}

/// Executes batches of requests
pub trait Vm: Send + Sync {
    /// Run the batch. The future must not depend on the chain actor.
    fn run_batch(&self, task: VmTask) -> BoxFuture<'static, Result<VmOutput, String>>;
}

/// Threshold signature scheme, holding the share of this node
pub trait ThresholdSigner: Send + Sync {
    /// Sign `digest` with the own share
    fn sign_share(&self, digest: &Hash) -> Result<Vec<u8>, String>;

    /// Whether `share` is a valid share of the peer `index` over `digest`
    fn verify_share(&self, index: u16, digest: &Hash, share: &[u8]) -> bool;

    /// Combine at least `t` valid shares into the committee signature
    fn aggregate(&self, digest: &Hash, shares: &[(u16, Vec<u8>)]) -> Result<Vec<u8>, String>;
}

/// How far a posted transaction is from being confirmed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InclusionLevel {
    /// Unknown to the ledger yet
    Undefined,
    /// Booked but not confirmed
    Booked,
    /// Final
    Confirmed,
    /// Conflicting or invalid, will never be confirmed
    Rejected,
}

/// Events delivered by the ledger client
#[derive(Clone, Debug)]
pub enum LedgerEvent {
    /// A confirmed anchoring transaction of the chain
    StateTransaction(AnchorTransaction),
    /// Answer to an inclusion level query
    InclusionLevel(TransactionId, InclusionLevel),
    /// Colored balances of the chain address
    Balances(Balances),
    /// A request sent to the chain
    Request(RequestPayload),
}

/// Callback receiving ledger events for one chain
pub type LedgerCallback = Arc<dyn Fn(LedgerEvent) + Send + Sync>;

/// Handle of a ledger subscription
pub type SubscriptionId = u64;

/// Client of the external ledger. Every query answers through the subscription callback.
pub trait LedgerClient: Send + Sync {
    /// Receive the events of `chain_id`. The current state transaction is delivered right away.
    fn subscribe(&self, chain_id: ChainId, callback: LedgerCallback) -> SubscriptionId;

    /// Cancel a subscription
    fn unsubscribe(&self, chain_id: &ChainId, subscription: SubscriptionId);

    /// Submit a signed anchoring transaction
    fn post_transaction(&self, tx: &AnchorTransaction) -> Result<(), String>;

    /// Ask for the confirmed transaction `tx_id`
    fn request_confirmed_transaction(&self, chain_id: &ChainId, tx_id: &TransactionId);

    /// Ask for the last confirmed anchoring transaction of the chain
    fn request_state_transaction(&self, chain_id: &ChainId);

    /// Ask for the inclusion level of `tx_id`
    fn request_inclusion_level(&self, chain_id: &ChainId, tx_id: &TransactionId);
}

/// Storage of the solid state and of the blocks which produced it
pub trait StatePersistence: Send + Sync {
    /// Last committed state together with the block which produced it
    fn load_solid_state(
        &self,
        chain_id: &ChainId,
    ) -> Result<Option<(VirtualState, Block)>, StorageError>;

    /// Atomically store `state` as the solid state and `block` under its index
    fn commit(&self, state: &VirtualState, block: &Block) -> Result<(), StorageError>;

    /// Block with the given index, if it was committed
    fn load_block(&self, chain_id: &ChainId, index: u32) -> Result<Option<Block>, StorageError>;
}

/// Content addressed storage of request argument blobs
pub trait BlobCache: Send + Sync {
    /// Blob with the given hash
    fn get_blob(&self, hash: &Hash) -> Option<Vec<u8>>;

    /// Store a blob, returning its hash
    fn put_blob(&self, data: Vec<u8>) -> Hash;
}
