//! # State Manager
//!
//! Owner of the solid state of a chain. Candidate blocks computed by the operator or fetched
//! from peers wait as pending blocks until the ledger confirms the anchoring transaction of
//! one of them; the confirmed one is applied, persisted and announced as a state transition.
//! Peers falling behind fetch the missing blocks one index at a time.
use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use ansi_term::Color::Green;
use log::{debug, error, info, trace, warn};

use scchain_config::config::Chain;
use scchain_data_structures::{
    chain::Hash,
    messages::{BlockHeaderMsg, PeerMsg, StateIndexPingPongMsg},
    permutation::Permutation16,
    state::{Block, StateUpdate, VirtualState},
    transaction::AnchorTransaction,
};

use crate::{
    actors::{
        chain::ChainParams,
        messages::{Action, ChainEvent, StateTransitionMsg},
    },
    collaborators::StatePersistence,
    error::ChainError,
    utils::elapsed,
};

mod sync;

/// Synchronization status of the solid state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Loading the persisted state
    Bootstrapping,
    /// Waiting for the ledger to confirm the loaded or the origin state
    Waiting,
    /// Up to date with the committee
    Synced,
    /// Fetching missing blocks from peers
    Syncing,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Bootstrapping => "Bootstrapping",
            SyncStatus::Waiting => "Waiting",
            SyncStatus::Synced => "Synced",
            SyncStatus::Syncing => "Syncing",
        };
        f.write_str(s)
    }
}

/// Candidate block waiting for its anchoring transaction
#[derive(Clone, Debug)]
struct PendingBlock {
    block: Block,
    next_state: VirtualState,
    deadline: SystemTime,
}

/// Block being fetched from a peer
#[derive(Clone, Debug)]
struct SyncBlock {
    index: u32,
    header: Option<BlockHeaderMsg>,
    updates: Vec<Option<StateUpdate>>,
    last_request: SystemTime,
}

////////////////////////////////////////////////////////////////////////////////////////
// BASIC STRUCTURE
////////////////////////////////////////////////////////////////////////////////////////
/// State manager of one chain
pub struct StateManager {
    params: ChainParams,
    config: Chain,
    persistence: Arc<dyn StatePersistence>,

    status: SyncStatus,
    /// Last confirmed state
    solid_state: VirtualState,
    /// False while the loaded state has not been confirmed again by the ledger
    solid_state_valid: bool,
    /// Candidate blocks by the hash of the state they produce
    pending_blocks: HashMap<Hash, PendingBlock>,
    /// Largest state index carried by any peer message
    largest_evidenced_index: u32,
    /// Confirmed transaction whose block is not known yet
    pending_anchor: Option<AnchorTransaction>,
    syncing: Option<SyncBlock>,
    /// Order in which peers are asked for blocks
    get_block_peers: Permutation16,
    last_ping: Option<SystemTime>,
    /// Since when the node is one block behind without a matching pending block
    behind_since: Option<SystemTime>,
}

impl StateManager {
    /// State manager of the chain described by `params`. Nothing happens until [`bootstrap`].
    ///
    /// [`bootstrap`]: StateManager::bootstrap
    pub fn new(params: ChainParams, config: Chain, persistence: Arc<dyn StatePersistence>) -> Self {
        StateManager {
            get_block_peers: Permutation16::new(params.size, params.chain_id.as_bytes()),
            solid_state: VirtualState::pre_origin(params.chain_id),
            params,
            config,
            persistence,
            status: SyncStatus::Bootstrapping,
            solid_state_valid: false,
            pending_blocks: HashMap::new(),
            largest_evidenced_index: 0,
            pending_anchor: None,
            syncing: None,
            last_ping: None,
            behind_since: None,
        }
    }

    /// Synchronization status
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Last confirmed state, possibly not validated yet
    pub fn solid_state(&self) -> &VirtualState {
        &self.solid_state
    }

    /// Index of the solid state, `None` before the origin block
    pub fn solid_index(&self) -> Option<u32> {
        if self.solid_state.initialized {
            Some(self.solid_state.block_index)
        } else {
            None
        }
    }

    /// Whether the solid state was confirmed by the ledger
    pub fn is_solid_state_valid(&self) -> bool {
        self.solid_state_valid
    }

    /// Largest state index seen in peer messages
    pub fn largest_evidenced_index(&self) -> u32 {
        self.largest_evidenced_index
    }

    /// Number of candidate blocks
    pub fn num_pending_blocks(&self) -> usize {
        self.pending_blocks.len()
    }

    fn log_prefix(&self) -> String {
        format!("[{}:{}]", self.params.chain_id.short(), self.params.own_index)
    }

    /// Index of the next block to apply
    fn next_index(&self) -> u32 {
        match self.solid_index() {
            Some(index) => index.saturating_add(1),
            None => 0,
        }
    }

    fn solid_index_or_zero(&self) -> u32 {
        self.solid_index().unwrap_or(0)
    }

    /// Fold an index carried by a peer message
    fn evidence(&mut self, index: u32) {
        if index > self.largest_evidenced_index {
            trace!(
                "{} largest evidenced state index {} -> {}",
                self.log_prefix(),
                self.largest_evidenced_index,
                index
            );
            self.largest_evidenced_index = index;
        }
    }

    fn persistence_failure(&self, e: ChainError) -> Vec<Action> {
        error!("{} {}", self.log_prefix(), e);

        vec![Action::Dismiss(e.to_string())]
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // BOOTSTRAP
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Load the persisted solid state, or prepare the origin block if there is none.
    pub fn bootstrap(&mut self, now: SystemTime) -> Vec<Action> {
        let loaded = match self.persistence.load_solid_state(&self.params.chain_id) {
            Ok(loaded) => loaded,
            Err(e) => return self.persistence_failure(ChainError::PersistenceFailure(e)),
        };

        match loaded {
            Some((state, block)) => {
                info!(
                    "{} loaded solid state #{} {}, waiting for confirmation",
                    self.log_prefix(),
                    state.block_index,
                    state.state_hash
                );
                self.largest_evidenced_index = state.block_index;
                // The pending block of an unvalidated state resolves to the state itself
                self.pending_blocks.insert(
                    state.state_hash,
                    PendingBlock {
                        block,
                        next_state: state.clone(),
                        deadline: now + self.config.pending_block_deadline,
                    },
                );
                self.solid_state = state;
            }
            None => {
                info!(
                    "{} no solid state found, waiting for the origin transaction",
                    self.log_prefix()
                );
                let origin = Block::origin();
                let next_state = match self.solid_state.with_block(&origin) {
                    Ok(next_state) => next_state,
                    Err(e) => {
                        let e = ChainError::InvalidBlock(e);
                        error!("{} origin block: {}", self.log_prefix(), e);
                        return vec![Action::Dismiss(e.to_string())];
                    }
                };
                self.pending_blocks.insert(
                    next_state.state_hash,
                    PendingBlock {
                        block: origin,
                        next_state,
                        deadline: now + self.config.pending_block_deadline,
                    },
                );
            }
        }
        self.status = SyncStatus::Waiting;

        vec![Action::StateManagerReady]
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // PENDING BLOCKS AND CONFIRMATION
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Register a candidate block for the next index
    pub fn event_pending_block(&mut self, block: Block, now: SystemTime) -> Vec<Action> {
        let expected = self.next_index();
        if block.block_index != expected {
            debug!(
                "{} pending block #{} ignored, expected #{}",
                self.log_prefix(),
                block.block_index,
                expected
            );
            return vec![];
        }
        let next_state = match self.solid_state.with_block(&block) {
            Ok(next_state) => next_state,
            Err(e) => {
                warn!(
                    "{} pending block #{} rejected: {}",
                    self.log_prefix(),
                    block.block_index,
                    ChainError::InvalidBlock(e)
                );
                return vec![];
            }
        };
        let hash = next_state.state_hash;
        if self.pending_blocks.contains_key(&hash) {
            trace!("{} pending block for {} already known", self.log_prefix(), hash);
            return vec![];
        }
        debug!(
            "{} new pending block #{} -> {} ({} updates)",
            self.log_prefix(),
            block.block_index,
            hash.short(),
            block.size()
        );
        self.pending_blocks.insert(
            hash,
            PendingBlock {
                block,
                next_state,
                deadline: now + self.config.pending_block_deadline,
            },
        );

        match self.pending_anchor.take() {
            Some(tx) if tx.state_hash == hash => self.confirm(hash, tx),
            other => {
                self.pending_anchor = other;
                vec![]
            }
        }
    }

    /// A confirmed anchoring transaction of the chain
    pub fn event_state_transaction(&mut self, tx: AnchorTransaction, now: SystemTime) -> Vec<Action> {
        self.evidence(tx.state_index);

        let matches_pending = self
            .pending_blocks
            .get(&tx.state_hash)
            .map(|pb| pb.next_state.block_index == tx.state_index)
            .unwrap_or(false);
        if matches_pending {
            return self.confirm(tx.state_hash, tx);
        }
        if self.solid_state_valid && tx.state_hash == self.solid_state.state_hash {
            trace!(
                "{} state transaction for the solid state #{} again",
                self.log_prefix(),
                tx.state_index
            );
            return vec![];
        }
        if self.solid_state_valid && tx.state_index <= self.solid_index_or_zero() {
            debug!(
                "{} state transaction #{} older than solid state #{}",
                self.log_prefix(),
                tx.state_index,
                self.solid_index_or_zero()
            );
            return vec![];
        }

        info!(
            "{} state transaction #{} for unknown state {}, syncing",
            self.log_prefix(),
            tx.state_index,
            tx.state_hash.short()
        );
        self.pending_anchor = Some(tx);

        self.check_sync(now)
    }

    /// Apply the pending block producing `hash`, confirmed by `tx`
    fn confirm(&mut self, hash: Hash, tx: AnchorTransaction) -> Vec<Action> {
        let pending = match self.pending_blocks.remove(&hash) {
            Some(pending) => pending,
            None => return vec![],
        };
        let mut block = pending.block;
        block.state_tx_id = Some(tx.id());

        let revalidated = !self.solid_state_valid
            && self.solid_state.initialized
            && pending.next_state.state_hash == self.solid_state.state_hash;
        if !revalidated {
            if let Err(e) = self.persistence.commit(&pending.next_state, &block) {
                return self.persistence_failure(ChainError::PersistenceFailure(e));
            }
            self.solid_state = pending.next_state;
        }
        self.solid_state_valid = true;

        // Every other candidate was built for the same index
        self.pending_blocks.clear();
        let solid_index = self.solid_state.block_index;
        if self
            .pending_anchor
            .as_ref()
            .map_or(false, |a| a.state_index <= solid_index)
        {
            self.pending_anchor = None;
        }
        if self.syncing.as_ref().map_or(false, |s| s.index <= solid_index) {
            self.syncing = None;
        }
        self.evidence(solid_index);
        self.behind_since = None;
        self.status = if self.largest_evidenced_index > solid_index || self.pending_anchor.is_some()
        {
            SyncStatus::Syncing
        } else {
            SyncStatus::Synced
        };

        info!(
            "{} {} #{} {} ({} requests){}",
            self.log_prefix(),
            Green.bold().paint("[State transition]"),
            Green.bold().paint(solid_index.to_string()),
            self.solid_state.state_hash.short(),
            block.size(),
            if revalidated { ", loaded state confirmed" } else { "" }
        );

        vec![Action::Enqueue(ChainEvent::StateTransition(
            StateTransitionMsg {
                state: self.solid_state.clone(),
                request_ids: block.request_ids(),
                tx,
            },
        ))]
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // TIMER
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Periodic work: state index probes, pending block deadlines and synchronization
    pub fn event_timer_tick(&mut self, _tick: u64, now: SystemTime) -> Vec<Action> {
        if self.status == SyncStatus::Bootstrapping {
            return vec![];
        }
        let mut actions = vec![];

        let ping_due = self
            .last_ping
            .map_or(true, |t| elapsed(t, now) >= self.config.ping_pong_period);
        if ping_due {
            self.last_ping = Some(now);
            actions.push(Action::Broadcast(PeerMsg::StateIndexPingPong(
                StateIndexPingPongMsg {
                    block_index: self.solid_index_or_zero(),
                    rsvp: true,
                },
            )));
        }

        let deadline = self.config.pending_block_deadline;
        let mut expired = false;
        for pending in self.pending_blocks.values_mut() {
            if now >= pending.deadline {
                pending.deadline = now + deadline;
                expired = true;
            }
        }
        if expired {
            debug!(
                "{} pending block deadline expired, asking the ledger for the state transaction",
                self.log_prefix()
            );
            actions.push(Action::RequestStateTransaction);
        }

        actions.extend(self.check_sync(now));

        actions
    }

    /// Time after which a node one block behind starts fetching it
    fn behind_timeout(&self) -> Duration {
        self.config.pending_block_deadline
    }
}

#[cfg(test)]
mod tests;
