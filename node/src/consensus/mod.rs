//! # Consensus Operator
//!
//! Owner of the backlog of requests of a chain. For every solid state the operator walks a
//! round through its stages: non-leaders tell the leader which requests they can process, the
//! leader selects a batch notified by a quorum, runs it and collects the signature shares of the
//! committee over the resulting anchoring transaction, then posts it to the ledger.
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use log::{debug, trace};

use scchain_config::config::Chain;
use scchain_data_structures::{
    chain::{AgentId, Balances, Hash, RequestId, TransactionId},
    messages::{NotifyReqMsg, SignedHashMsg},
    peer_set::PeerSet,
    permutation::Permutation16,
    request::{solidify, RequestPayload, SolidArgs},
    state::VirtualState,
    transaction::AnchorTransaction,
};

use crate::{
    actors::chain::ChainParams,
    collaborators::{BatchRequest, BlobCache, ThresholdSigner, VmOutput},
};

mod events;
pub mod select;
mod stages;

/// Stage of the round at the current state index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for a quorum of connected peers
    Init,
    /// About to notify the leader, or to become one
    NotifyLeader,
    /// Notifications sent, waiting for the leader to start a batch
    NotificationsSent,
    /// Leader accumulating notifications until a batch can be selected
    CollectNotifications,
    /// The virtual machine is running the batch
    RunVm,
    /// Leader collecting signature shares
    CollectSignatures,
    /// Leader waiting for the posted transaction to be confirmed
    PostTransaction,
    /// Share sent to the leader, waiting for the transaction to be confirmed
    SignatureSent,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "Init",
            Stage::NotifyLeader => "NotifyLeader",
            Stage::NotificationsSent => "NotificationsSent",
            Stage::CollectNotifications => "CollectNotifications",
            Stage::RunVm => "RunVm",
            Stage::CollectSignatures => "CollectSignatures",
            Stage::PostTransaction => "PostTransaction",
            Stage::SignatureSent => "SignatureSent",
        };
        f.write_str(s)
    }
}

/// Entry of the backlog
#[derive(Clone, Debug)]
struct Request {
    /// Known once the sending transaction is seen
    payload: Option<RequestPayload>,
    /// Arguments with their blobs resolved
    solid_args: Option<SolidArgs>,
    /// Peers which can process the request at the current state index
    notifications: PeerSet,
    arrival: SystemTime,
}

impl Request {
    fn new(size: u16, arrival: SystemTime) -> Self {
        Request {
            payload: None,
            solid_args: None,
            notifications: PeerSet::new(size),
            arrival,
        }
    }

    /// Payload known, arguments solid and not time locked
    fn is_ready(&self, now: SystemTime) -> bool {
        match &self.payload {
            Some(payload) => self.solid_args.is_some() && !payload.is_time_locked(now),
            None => false,
        }
    }

    fn batch_request(&self) -> BatchRequest {
        match (&self.payload, &self.solid_args) {
            (Some(payload), Some(args)) => BatchRequest {
                payload: payload.clone(),
                args: args.clone(),
            },
            _ => panic!("request selected for a batch without payload or solid arguments"),
        }
    }
}

/// Batch in progress at the current state index
#[derive(Clone, Debug)]
struct Round {
    batch_hash: Hash,
    leader: u16,
    request_ids: Vec<RequestId>,
    timestamp: i64,
    output: Option<VmOutput>,
    /// Answer of a non-leader, resent if the leader asks again
    signed_hash: Option<SignedHashMsg>,
    /// Transaction posted by the leader
    posted_tx: Option<TransactionId>,
}

////////////////////////////////////////////////////////////////////////////////////////
// BASIC STRUCTURE
////////////////////////////////////////////////////////////////////////////////////////
/// Consensus operator of one chain
pub struct Operator {
    params: ChainParams,
    config: Chain,
    signer: Arc<dyn ThresholdSigner>,
    blobs: Arc<dyn BlobCache>,

    /// Solid state and the transaction anchoring it, once known
    state: Option<(VirtualState, AnchorTransaction)>,
    stage: Stage,
    stage_since: SystemTime,
    requests: HashMap<RequestId, Request>,
    /// Notifications for state indices not reached yet, oldest first
    notification_backlog: VecDeque<(u16, NotifyReqMsg)>,
    /// Requests already notified to the current leader
    notified: HashSet<RequestId>,

    leader_permutation: Permutation16,
    leader_since: SystemTime,
    alive: PeerSet,
    connect_period_over: bool,

    balances: Balances,
    fee_destination: AgentId,

    round: Option<Round>,
    /// Transaction announced by the leader for the current index
    final_tx: Option<TransactionId>,
    consecutive_failures: u32,
    restart_after: Option<SystemTime>,
}

impl Operator {
    /// Operator of the chain described by `params`
    pub fn new(
        params: ChainParams,
        config: Chain,
        signer: Arc<dyn ThresholdSigner>,
        blobs: Arc<dyn BlobCache>,
        now: SystemTime,
    ) -> Self {
        Operator {
            leader_permutation: Permutation16::new(params.size, params.chain_id.as_bytes()),
            alive: PeerSet::new(params.size),
            params,
            config,
            signer,
            blobs,
            state: None,
            stage: Stage::Init,
            stage_since: now,
            requests: HashMap::new(),
            notification_backlog: VecDeque::new(),
            notified: HashSet::new(),
            leader_since: now,
            connect_period_over: false,
            balances: Balances::new(),
            fee_destination: AgentId::default(),
            round: None,
            final_tx: None,
            consecutive_failures: 0,
            restart_after: None,
        }
    }

    /// Agent receiving the fees of the batches led by this node
    pub fn set_fee_destination(&mut self, fee_destination: AgentId) {
        self.fee_destination = fee_destination;
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current leader, once the solid state is known
    pub fn leader(&self) -> Option<u16> {
        self.state.as_ref().map(|_| self.leader_permutation.current())
    }

    /// Whether this node leads the current round
    pub fn is_leader(&self) -> bool {
        self.leader() == Some(self.params.own_index)
    }

    /// Number of requests in the backlog
    pub fn backlog_len(&self) -> usize {
        self.requests.len()
    }

    /// Whether `request_id` is in the backlog
    pub fn has_request(&self, request_id: &RequestId) -> bool {
        self.requests.contains_key(request_id)
    }

    /// Peers which notified `request_id` at the current state index
    pub fn notifications(&self, request_id: &RequestId) -> Option<&PeerSet> {
        self.requests.get(request_id).map(|r| &r.notifications)
    }

    /// Buffered notifications for future state indices
    pub fn buffered_notifications(&self) -> usize {
        self.notification_backlog.len()
    }

    fn log_prefix(&self) -> String {
        format!("[{}:{}]", self.params.chain_id.short(), self.params.own_index)
    }

    fn state_index(&self) -> Option<u32> {
        self.state.as_ref().map(|(s, _)| s.block_index)
    }

    fn set_stage(&mut self, stage: Stage, now: SystemTime) {
        if self.stage != stage {
            trace!("{} stage {} -> {}", self.log_prefix(), self.stage, stage);
            self.stage = stage;
        }
        self.stage_since = now;
    }

    /// Whether `index` may lead a round
    fn is_eligible_leader(&self, index: u16) -> bool {
        index == self.params.own_index || !self.connect_period_over || self.alive.is_seen(index)
    }

    /// Move the cursor of the permutation to the first eligible leader, starting at the current
    /// one, or at the next one if `skip_current`
    fn select_leader(&mut self, skip_current: bool) {
        if skip_current {
            self.leader_permutation.next();
        }
        for _ in 0..self.leader_permutation.size() {
            let candidate = self.leader_permutation.current();
            if self.is_eligible_leader(candidate) {
                return;
            }
            self.leader_permutation.next();
        }
    }

    /// Try to resolve the blob arguments of requests which are not solid yet
    fn solidify_requests(&mut self) {
        let blobs = &self.blobs;
        for (id, request) in self.requests.iter_mut() {
            if request.solid_args.is_some() {
                continue;
            }
            if let Some(payload) = &request.payload {
                request.solid_args = solidify(&payload.args, |h| blobs.get_blob(h));
                if request.solid_args.is_some() {
                    debug!("request {} arguments are solid", id.short());
                }
            }
        }
    }

    /// Mark the own notification of every request this node can process
    fn mark_own_notifications(&mut self, now: SystemTime) {
        let own = self.params.own_index;
        for request in self.requests.values_mut() {
            if request.is_ready(now) {
                request.notifications.mark_seen(own);
            }
        }
    }

    /// Ready requests, in arrival order
    fn ready_requests(&self, now: SystemTime) -> Vec<(RequestId, &Request)> {
        let mut ready: Vec<(RequestId, &Request)> = self
            .requests
            .iter()
            .filter(|(_, r)| r.is_ready(now))
            .map(|(id, r)| (*id, r))
            .collect();
        ready.sort_by(|a, b| a.1.arrival.cmp(&b.1.arrival).then(a.0.cmp(&b.0)));

        ready
    }

    /// Backoff before the next restart, doubling with every consecutive failure
    fn backoff(&self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(1).min(16);
        let backoff = self.config.round_restart_backoff * 2u32.pow(exponent);

        backoff.min(self.config.round_restart_backoff_max)
    }
}
