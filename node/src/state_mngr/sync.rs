use std::{convert::TryFrom, time::SystemTime};

use log::{debug, error, info, trace, warn};

use scchain_data_structures::{
    messages::{
        BlockHeaderMsg, GetBlockMsg, PeerMsg, StateIndexPingPongMsg, StateUpdateMsg,
    },
    state::Block,
};

use super::{StateManager, SyncBlock, SyncStatus};
use crate::{actors::messages::Action, error::ChainError, utils::elapsed};

impl StateManager {
    /// Handle a message of a peer.
    ///
    /// The state index carried by the message is folded as evidence, except for `GetBlock`
    /// which only says what the sender is missing.
    pub fn event_peer_msg(&mut self, from: u16, msg: &PeerMsg, now: SystemTime) -> Vec<Action> {
        if !matches!(msg, PeerMsg::GetBlock(_)) {
            if let Some(index) = msg.block_index() {
                self.evidence(index);
            }
        }

        let mut actions = match msg {
            PeerMsg::StateIndexPingPong(m) => self.on_ping_pong(from, m),
            PeerMsg::GetBlock(m) => self.on_get_block(from, m),
            PeerMsg::BlockHeader(m) => self.on_block_header(from, m, now),
            PeerMsg::StateUpdate(m) => self.on_state_update(from, m, now),
            PeerMsg::NotifyRequests(_)
            | PeerMsg::NotifyFinalResultPosted(_)
            | PeerMsg::StartProcessingBatch(_)
            | PeerMsg::SignedHash(_)
            | PeerMsg::TestTrace(_) => vec![],
        };
        actions.extend(self.check_sync(now));

        actions
    }

    fn on_ping_pong(&mut self, from: u16, msg: &StateIndexPingPongMsg) -> Vec<Action> {
        trace!(
            "{} state index of peer #{}: {} (rsvp: {})",
            self.log_prefix(),
            from,
            msg.block_index,
            msg.rsvp
        );
        if !msg.rsvp {
            return vec![];
        }

        vec![Action::SendToPeer {
            index: from,
            msg: PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
                block_index: self.solid_index_or_zero(),
                rsvp: false,
            }),
        }]
    }

    /// Answer with the header and every update of a committed block
    fn on_get_block(&mut self, from: u16, msg: &GetBlockMsg) -> Vec<Action> {
        let block = match self
            .persistence
            .load_block(&self.params.chain_id, msg.block_index)
        {
            Ok(Some(block)) => block,
            Ok(None) => {
                debug!(
                    "{} peer #{} asked for unknown block #{}",
                    self.log_prefix(),
                    from,
                    msg.block_index
                );
                return vec![];
            }
            Err(e) => return self.persistence_failure(ChainError::PersistenceFailure(e)),
        };
        let anchor_tx_id = match block.state_tx_id {
            Some(tx_id) => tx_id,
            None => {
                warn!(
                    "{} committed block #{} has no anchoring transaction",
                    self.log_prefix(),
                    block.block_index
                );
                return vec![];
            }
        };
        let size = match u16::try_from(block.size()) {
            Ok(size) => size,
            Err(_) => {
                error!(
                    "{} block #{} has too many updates to be sent",
                    self.log_prefix(),
                    block.block_index
                );
                return vec![];
            }
        };
        debug!(
            "{} sending block #{} ({} updates) to peer #{}",
            self.log_prefix(),
            block.block_index,
            size,
            from
        );

        let mut actions = vec![Action::SendToPeer {
            index: from,
            msg: PeerMsg::BlockHeader(BlockHeaderMsg {
                block_index: block.block_index,
                size,
                anchor_tx_id,
            }),
        }];
        for (i, update) in block.state_updates.into_iter().enumerate() {
            actions.push(Action::SendToPeer {
                index: from,
                msg: PeerMsg::StateUpdate(StateUpdateMsg {
                    block_index: block.block_index,
                    state_update: update,
                    // Bounded by `size`
                    index_in_block: i as u16,
                }),
            });
        }

        actions
    }

    fn on_block_header(&mut self, from: u16, msg: &BlockHeaderMsg, now: SystemTime) -> Vec<Action> {
        let prefix = self.log_prefix();
        let sync = match self.syncing.as_mut() {
            Some(sync) if sync.index == msg.block_index => sync,
            _ => {
                debug!(
                    "{} unexpected header of block #{} from peer #{}",
                    prefix, msg.block_index, from
                );
                return vec![];
            }
        };
        if sync.header.is_some() {
            trace!("{} duplicate header of block #{}", prefix, msg.block_index);
            return vec![];
        }
        debug!(
            "{} header of block #{} from peer #{}: {} updates",
            prefix, msg.block_index, from, msg.size
        );
        sync.header = Some(msg.clone());
        sync.updates = vec![None; usize::from(msg.size)];

        self.try_complete_sync_block(now)
    }

    fn on_state_update(&mut self, from: u16, msg: &StateUpdateMsg, now: SystemTime) -> Vec<Action> {
        let prefix = self.log_prefix();
        let sync = match self.syncing.as_mut() {
            Some(sync) if sync.index == msg.block_index && sync.header.is_some() => sync,
            _ => {
                debug!(
                    "{} unexpected update of block #{} from peer #{}",
                    prefix, msg.block_index, from
                );
                return vec![];
            }
        };
        match sync.updates.get_mut(usize::from(msg.index_in_block)) {
            Some(slot) => *slot = Some(msg.state_update.clone()),
            None => {
                warn!(
                    "{} update {} of block #{} from peer #{} out of range",
                    prefix, msg.index_in_block, msg.block_index, from
                );
                return vec![];
            }
        }

        self.try_complete_sync_block(now)
    }

    /// Turn the block being fetched into a pending block once every update arrived
    fn try_complete_sync_block(&mut self, now: SystemTime) -> Vec<Action> {
        let sync = match self.syncing.as_mut() {
            Some(sync) => sync,
            None => return vec![],
        };
        let header = match &sync.header {
            Some(header) if sync.updates.iter().all(Option::is_some) => header.clone(),
            _ => return vec![],
        };
        let updates = std::mem::take(&mut sync.updates).into_iter().flatten().collect();
        sync.header = None;

        let mut block = Block::new(header.block_index, updates);
        block.state_tx_id = Some(header.anchor_tx_id);
        info!(
            "{} block #{} fetched, asking for anchoring transaction {}",
            self.log_prefix(),
            header.block_index,
            header.anchor_tx_id.short()
        );

        let mut actions = self.event_pending_block(block, now);
        if self.next_index() == header.block_index {
            // Not confirmed by an already known transaction
            actions.push(Action::RequestConfirmedTransaction(header.anchor_tx_id));
        }

        actions
    }

    /// Number of blocks the solid state is behind the evidence
    fn gap(&self) -> u32 {
        match self.solid_index() {
            Some(index) => self.largest_evidenced_index.saturating_sub(index),
            None => self.largest_evidenced_index,
        }
    }

    /// Decide whether blocks must be fetched and ask for the next one when due
    pub(super) fn check_sync(&mut self, now: SystemTime) -> Vec<Action> {
        if self.status == SyncStatus::Bootstrapping {
            return vec![];
        }
        let next = self.next_index();
        let gap = self.gap();
        let has_candidate = self
            .pending_blocks
            .values()
            .any(|pb| pb.next_state.block_index == next);

        let behind = if self.pending_anchor.is_some() || gap > 1 {
            true
        } else if gap == 1 && !has_candidate {
            let since = *self.behind_since.get_or_insert(now);
            elapsed(since, now) >= self.behind_timeout()
        } else {
            if gap == 0 || has_candidate {
                self.behind_since = None;
            }
            false
        };

        if !behind {
            if self.status == SyncStatus::Syncing {
                debug!("{} caught up at #{}", self.log_prefix(), self.solid_index_or_zero());
                self.status = SyncStatus::Synced;
            }
            self.syncing = None;
            return vec![];
        }

        if self.status != SyncStatus::Syncing {
            info!(
                "{} {}",
                self.log_prefix(),
                ChainError::SyncGap {
                    solid: self.solid_index_or_zero(),
                    evidenced: self.largest_evidenced_index,
                }
            );
            self.status = SyncStatus::Syncing;
        }

        let due = match &self.syncing {
            Some(sync) if sync.index == next => {
                elapsed(sync.last_request, now) >= self.config.sync_retry_period
            }
            _ => true,
        };
        if !due {
            return vec![];
        }
        let peer = match self.next_block_peer() {
            Some(peer) => peer,
            None => return vec![],
        };
        debug!(
            "{} asking peer #{} for block #{}",
            self.log_prefix(),
            peer,
            next
        );
        self.syncing = Some(SyncBlock {
            index: next,
            header: None,
            updates: vec![],
            last_request: now,
        });

        vec![Action::SendToPeer {
            index: peer,
            msg: PeerMsg::GetBlock(GetBlockMsg { block_index: next }),
        }]
    }

    /// Next peer to ask for a block, never self
    fn next_block_peer(&mut self) -> Option<u16> {
        for _ in 0..self.get_block_peers.size() {
            let peer = self.get_block_peers.next();
            if peer != self.params.own_index {
                return Some(peer);
            }
        }

        None
    }
}
