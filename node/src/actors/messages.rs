use std::fmt;

use actix::Message;

use scchain_data_structures::{
    chain::{Balances, ChainId, Hash, RequestId, TransactionId},
    messages::{PeerMsg, StartProcessingBatchMsg},
    peer_set::PeerSet,
    request::RequestPayload,
    state::{Block, VirtualState},
    transaction::AnchorTransaction,
};
use scchain_p2p::{error::ExchangeError, network::RecvEvent};

use crate::{
    collaborators::{InclusionLevel, LedgerEvent, VmOutput, VmTask},
    consensus::Stage,
    state_mngr::SyncStatus,
};

////////////////////////////////////////////////////////////////////////////////////////
// EVENTS OF THE CHAIN ACTOR
////////////////////////////////////////////////////////////////////////////////////////

/// A request sent to the chain, as seen on the ledger
#[derive(Clone, Debug)]
pub struct RequestMsg {
    /// Request
    pub payload: RequestPayload,
}

/// A confirmed anchoring transaction of the chain
#[derive(Clone, Debug)]
pub struct StateTransactionMsg {
    /// Transaction
    pub tx: AnchorTransaction,
}

/// Inclusion level of a posted transaction
#[derive(Clone, Debug)]
pub struct TransactionInclusionLevelMsg {
    /// Transaction
    pub tx_id: TransactionId,
    /// Level reported by the ledger
    pub level: InclusionLevel,
}

/// Colored balances of the chain address
#[derive(Clone, Debug)]
pub struct BalancesMsg {
    /// Balances by transaction
    pub balances: Balances,
}

/// The solid state advanced
#[derive(Clone, Debug)]
pub struct StateTransitionMsg {
    /// New solid state
    pub state: VirtualState,
    /// Transaction anchoring it
    pub tx: AnchorTransaction,
    /// Requests processed by the block producing the state
    pub request_ids: Vec<RequestId>,
}

/// Candidate block computed locally
#[derive(Clone, Debug)]
pub struct PendingBlockMsg {
    /// Block
    pub block: Block,
}

/// Outcome of running a batch in the virtual machine
#[derive(Clone, Debug)]
pub struct VmResultMsg {
    /// Batch the result belongs to
    pub batch_hash: Hash,
    /// Block and unsigned transaction, or the error of the virtual machine
    pub result: Result<VmOutput, String>,
}

/// Outcome of a signature round
#[derive(Clone, Debug)]
pub struct SignaturesCollectedMsg {
    /// Batch the round was run for
    pub batch_hash: Hash,
    /// Valid shares, the own one included
    pub shares: Vec<(u16, Vec<u8>)>,
    /// Why the round ended before every peer answered
    pub error: Option<ExchangeError>,
}

/// Peers currently reachable
#[derive(Clone, Debug)]
pub struct ConnectivityMsg {
    /// Alive peers, self included
    pub alive: PeerSet,
}

/// Everything processed by the sequential loop of a chain
#[derive(Debug)]
pub enum ChainEvent {
    /// Message from a committee member
    Peer(RecvEvent),
    /// New request
    Request(RequestMsg),
    /// Confirmed anchoring transaction
    StateTransaction(StateTransactionMsg),
    /// Inclusion level of a posted transaction
    TransactionInclusionLevel(TransactionInclusionLevelMsg),
    /// Balances of the chain
    Balances(BalancesMsg),
    /// The solid state advanced
    StateTransition(StateTransitionMsg),
    /// Locally computed candidate block
    PendingBlock(PendingBlockMsg),
    /// The virtual machine finished a batch
    VmResult(VmResultMsg),
    /// A signature round ended
    SignaturesCollected(SignaturesCollectedMsg),
    /// Periodic tick
    TimerTick(u64),
    /// Result of the connectivity poll
    Connectivity(ConnectivityMsg),
    /// The grace period after reaching quorum is over
    ConnectPeriodOver,
    /// Stop the chain
    Dismiss(String),
}

impl Message for ChainEvent {
    type Result = ();
}

impl ChainEvent {
    /// Name of the event, for logs
    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::Peer(_) => "Peer",
            ChainEvent::Request(_) => "Request",
            ChainEvent::StateTransaction(_) => "StateTransaction",
            ChainEvent::TransactionInclusionLevel(_) => "TransactionInclusionLevel",
            ChainEvent::Balances(_) => "Balances",
            ChainEvent::StateTransition(_) => "StateTransition",
            ChainEvent::PendingBlock(_) => "PendingBlock",
            ChainEvent::VmResult(_) => "VmResult",
            ChainEvent::SignaturesCollected(_) => "SignaturesCollected",
            ChainEvent::TimerTick(_) => "TimerTick",
            ChainEvent::Connectivity(_) => "Connectivity",
            ChainEvent::ConnectPeriodOver => "ConnectPeriodOver",
            ChainEvent::Dismiss(_) => "Dismiss",
        }
    }
}

impl From<LedgerEvent> for ChainEvent {
    fn from(event: LedgerEvent) -> Self {
        match event {
            LedgerEvent::StateTransaction(tx) => {
                ChainEvent::StateTransaction(StateTransactionMsg { tx })
            }
            LedgerEvent::InclusionLevel(tx_id, level) => {
                ChainEvent::TransactionInclusionLevel(TransactionInclusionLevelMsg { tx_id, level })
            }
            LedgerEvent::Balances(balances) => ChainEvent::Balances(BalancesMsg { balances }),
            LedgerEvent::Request(payload) => ChainEvent::Request(RequestMsg { payload }),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// ACTIONS REQUESTED BY THE STATE MANAGER AND THE OPERATOR
////////////////////////////////////////////////////////////////////////////////////////

/// Signature round to run on a helper task
#[derive(Clone, Debug)]
pub struct SignatureRound {
    /// Batch being signed
    pub batch_hash: Hash,
    /// Digest every peer must sign
    pub essence_hash: Hash,
    /// Batch timestamp, sent as the timestamp of the envelope
    pub timestamp: i64,
    /// Message asking peers to process the batch
    pub start: StartProcessingBatchMsg,
    /// Share of the leader
    pub own_share: (u16, Vec<u8>),
    /// Peers asked for a share
    pub targets: Vec<u16>,
}

/// Side effects requested by the state manager and the operator, executed by the chain actor
#[derive(Debug)]
pub enum Action {
    /// Send a message to one peer
    SendToPeer {
        /// Peer index
        index: u16,
        /// Message
        msg: PeerMsg,
    },
    /// Send a message to every other peer
    Broadcast(PeerMsg),
    /// Process an event after the current one
    Enqueue(ChainEvent),
    /// Run a batch in the virtual machine
    RunVm(VmTask),
    /// Collect signature shares from the committee
    CollectSignatures(SignatureRound),
    /// Submit a signed transaction to the ledger
    PostTransaction(AnchorTransaction),
    /// Ask the ledger for a confirmed transaction
    RequestConfirmedTransaction(TransactionId),
    /// Ask the ledger for the last anchoring transaction of the chain
    RequestStateTransaction,
    /// Ask the ledger for the inclusion level of a transaction
    RequestInclusionLevel(TransactionId),
    /// Tell subscribers a request was processed
    RequestProcessed(RequestId),
    /// Bootstrap is over, open the event queue
    StateManagerReady,
    /// Stop the chain
    Dismiss(String),
}

////////////////////////////////////////////////////////////////////////////////////////
// MESSAGES TO AND FROM THE CHAIN ACTOR
////////////////////////////////////////////////////////////////////////////////////////

/// Notification sent to subscribers when a request is included in a confirmed block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestProcessed {
    /// Chain
    pub chain_id: ChainId,
    /// Request
    pub request_id: RequestId,
}

impl Message for RequestProcessed {
    type Result = ();
}

/// Start a test trace round through the committee
pub struct StartTestTrace;

impl Message for StartTestTrace {
    type Result = ();
}

/// Readiness of the committee, as seen by one node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Less than a quorum of peers connected
    NotReady,
    /// A quorum of peers connected, waiting for the others
    QuorumReached,
    /// Peers not connected by now are skipped as leaders
    ConnectPeriodOver,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Readiness::NotReady => "NotReady",
            Readiness::QuorumReached => "QuorumReached",
            Readiness::ConnectPeriodOver => "ConnectPeriodOver",
        };
        f.write_str(s)
    }
}

/// Snapshot of a chain, for monitoring and tests
#[derive(Clone, Debug)]
pub struct ChainStatus {
    /// Chain
    pub chain_id: ChainId,
    /// Own index in the committee
    pub own_index: u16,
    /// Readiness of the committee
    pub readiness: Readiness,
    /// Synchronization status of the state manager
    pub sync_status: SyncStatus,
    /// Index of the solid state, `None` before the origin transaction is confirmed
    pub solid_index: Option<u32>,
    /// Hash of the solid state
    pub state_hash: Hash,
    /// Largest state index seen in peer messages
    pub largest_evidenced_index: u32,
    /// Stage of the consensus round
    pub stage: Stage,
    /// Current leader, if known
    pub leader: Option<u16>,
    /// Requests waiting to be processed
    pub backlog: usize,
    /// Round trip time of the last test trace, in nanoseconds
    pub last_trace_rtt: Option<i64>,
}

/// Ask a chain actor for its [`ChainStatus`]
pub struct GetChainStatus;

impl Message for GetChainStatus {
    type Result = ChainStatus;
}
