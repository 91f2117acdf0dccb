use std::time::SystemTime;

use ansi_term::Color::Yellow;
use log::{debug, error, info, trace, warn};

use scchain_data_structures::{
    chain::{Balances, RequestId},
    messages::{
        NotifyFinalResultPostedMsg, NotifyReqMsg, PeerMsg, SignedHashMsg, StartProcessingBatchMsg,
    },
    peer_set::PeerSet,
    request::{batch_hash, request_ids_short, RequestPayload},
};

use super::{Operator, Request, Round, Stage};
use crate::{
    actors::messages::{
        Action, ChainEvent, PendingBlockMsg, SignatureRound, SignaturesCollectedMsg,
        StateTransitionMsg, TransactionInclusionLevelMsg, VmResultMsg,
    },
    collaborators::{InclusionLevel, VmTask},
    error::ChainError,
};

impl Operator {
    /// The solid state advanced: prune the processed requests and start a new round
    pub fn event_state_transition(&mut self, msg: StateTransitionMsg, now: SystemTime) -> Vec<Action> {
        if let Some(current) = self.state_index() {
            if msg.state.block_index <= current {
                debug!(
                    "{} state transition to #{} while at #{}, ignored",
                    self.log_prefix(),
                    msg.state.block_index,
                    current
                );
                return vec![];
            }
        }

        let mut actions = vec![];
        for id in &msg.request_ids {
            if self.requests.remove(id).is_some() {
                trace!("{} request {} processed", self.log_prefix(), id.short());
            }
            actions.push(Action::RequestProcessed(*id));
        }
        for request in self.requests.values_mut() {
            request.notifications.clear();
        }
        self.notified.clear();

        self.leader_permutation.shuffle(msg.state.state_hash.as_bytes());
        self.state = Some((msg.state, msg.tx));
        self.select_leader(false);
        self.leader_since = now;
        self.round = None;
        self.final_tx = None;
        self.consecutive_failures = 0;
        self.restart_after = None;
        self.set_stage(Stage::Init, now);
        debug!(
            "{} new round at #{}, leader is #{}",
            self.log_prefix(),
            self.state_index().unwrap_or_default(),
            self.leader_permutation.current()
        );

        self.replay_notifications(now);
        actions.extend(self.take_action(now));

        actions
    }

    /// Apply the buffered notifications for the new state index and drop the stale ones
    fn replay_notifications(&mut self, now: SystemTime) {
        let current = match self.state_index() {
            Some(current) => current,
            None => return,
        };
        let buffered = std::mem::take(&mut self.notification_backlog);
        for (from, msg) in buffered {
            if msg.block_index < current {
                debug!(
                    "{} {}",
                    self.log_prefix(),
                    ChainError::StaleMessage {
                        msg: "NotifyRequests",
                        index: msg.block_index,
                        current,
                    }
                );
            } else if msg.block_index == current {
                self.apply_notification(from, &msg.request_ids, now);
            } else {
                self.notification_backlog.push_back((from, msg));
            }
        }
    }

    /// A request sent to the chain
    pub fn event_request(&mut self, payload: RequestPayload, now: SystemTime) -> Vec<Action> {
        let prefix = self.log_prefix();
        let size = self.params.size;
        let request = self
            .requests
            .entry(payload.request_id)
            .or_insert_with(|| Request::new(size, now));
        if request.payload.is_some() {
            trace!("{} request {} already known", prefix, payload.request_id.short());
            return vec![];
        }
        debug!(
            "{} new request {} (timelock {})",
            prefix,
            payload.request_id.short(),
            payload.timelock
        );
        request.payload = Some(payload);
        self.solidify_requests();

        vec![]
    }

    /// Balances of the chain address, used in the next batch proposals
    pub fn event_balances(&mut self, balances: Balances) -> Vec<Action> {
        trace!("{} balances updated: {} outputs", self.log_prefix(), balances.len());
        self.balances = balances;

        vec![]
    }

    /// Peers currently reachable
    pub fn event_connectivity(&mut self, alive: PeerSet) -> Vec<Action> {
        self.alive = alive;

        vec![]
    }

    /// From now on, peers which are not alive are skipped as leaders
    pub fn event_connect_period_over(&mut self, now: SystemTime) -> Vec<Action> {
        self.connect_period_over = true;
        if self.state.is_some() && !self.is_eligible_leader(self.leader_permutation.current()) {
            self.rotate_leader(now, "leader not connected");
        }

        vec![]
    }

    /// Periodic work
    pub fn event_timer_tick(&mut self, _tick: u64, now: SystemTime) -> Vec<Action> {
        self.take_action(now)
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // PEER MESSAGES
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Handle a consensus message of a peer. `timestamp` is the one of the envelope.
    pub fn event_peer_msg(
        &mut self,
        from: u16,
        msg: &PeerMsg,
        timestamp: i64,
        now: SystemTime,
    ) -> Vec<Action> {
        match msg {
            PeerMsg::NotifyRequests(m) => self.on_notify_requests(from, m, now),
            PeerMsg::StartProcessingBatch(m) => self.on_start_processing_batch(from, m, timestamp, now),
            PeerMsg::NotifyFinalResultPosted(m) => self.on_notify_final_result(from, m),
            PeerMsg::SignedHash(m) => self.on_signed_hash(from, m),
            PeerMsg::StateIndexPingPong(_)
            | PeerMsg::GetBlock(_)
            | PeerMsg::BlockHeader(_)
            | PeerMsg::StateUpdate(_)
            | PeerMsg::TestTrace(_) => vec![],
        }
    }

    fn apply_notification(&mut self, from: u16, request_ids: &[RequestId], now: SystemTime) {
        let size = self.params.size;
        for id in request_ids {
            self.requests
                .entry(*id)
                .or_insert_with(|| Request::new(size, now))
                .notifications
                .mark_seen(from);
        }
    }

    fn on_notify_requests(&mut self, from: u16, msg: &NotifyReqMsg, now: SystemTime) -> Vec<Action> {
        match self.state_index() {
            Some(current) if msg.block_index == current => {
                trace!(
                    "{} peer #{} notified {}",
                    self.log_prefix(),
                    from,
                    request_ids_short(&msg.request_ids)
                );
                self.apply_notification(from, &msg.request_ids, now);
                self.take_action(now)
            }
            Some(current) if msg.block_index < current => {
                debug!(
                    "{} {}",
                    self.log_prefix(),
                    ChainError::StaleMessage {
                        msg: "NotifyRequests",
                        index: msg.block_index,
                        current,
                    }
                );
                vec![]
            }
            _ => {
                // Ahead of us: kept until the state catches up, oldest dropped first
                if self.notification_backlog.len() >= self.config.notification_backlog_capacity {
                    self.notification_backlog.pop_front();
                }
                self.notification_backlog.push_back((from, msg.clone()));
                vec![]
            }
        }
    }

    fn on_notify_final_result(&mut self, from: u16, msg: &NotifyFinalResultPostedMsg) -> Vec<Action> {
        if self.state_index() != Some(msg.block_index) {
            return vec![];
        }
        debug!(
            "{} peer #{} posted transaction {}",
            self.log_prefix(),
            from,
            msg.tx_id.short()
        );
        self.final_tx = Some(msg.tx_id);

        vec![]
    }

    fn on_signed_hash(&mut self, from: u16, msg: &SignedHashMsg) -> Vec<Action> {
        trace!(
            "{} signed hash from peer #{} for #{} outside of a signature round",
            self.log_prefix(),
            from,
            msg.block_index
        );

        vec![]
    }

    /// Non-leader side of a batch: run it and answer with a signature share
    fn on_start_processing_batch(
        &mut self,
        from: u16,
        msg: &StartProcessingBatchMsg,
        timestamp: i64,
        now: SystemTime,
    ) -> Vec<Action> {
        let current = match self.state_index() {
            Some(current) => current,
            None => return vec![],
        };
        if msg.block_index != current {
            debug!(
                "{} StartProcessingBatch for #{} while at #{}",
                self.log_prefix(),
                msg.block_index,
                current
            );
            return vec![];
        }
        if from != self.leader_permutation.current() || from == self.params.own_index {
            debug!(
                "{} StartProcessingBatch from #{} which is not the leader",
                self.log_prefix(),
                from
            );
            return vec![];
        }

        let hash = batch_hash(&msg.request_ids, timestamp, from);
        if let Some(round) = &self.round {
            if round.batch_hash == hash {
                return match &round.signed_hash {
                    Some(signed) => vec![Action::SendToPeer {
                        index: from,
                        msg: PeerMsg::SignedHash(signed.clone()),
                    }],
                    None => vec![],
                };
            }
        }

        let mut requests = Vec::with_capacity(msg.request_ids.len());
        for id in &msg.request_ids {
            match self.requests.get(id) {
                Some(request) if request.is_ready(now) => requests.push(request.batch_request()),
                _ => {
                    debug!(
                        "{} cannot process batch {}: request {} not ready",
                        self.log_prefix(),
                        hash.short(),
                        id.short()
                    );
                    return vec![];
                }
            }
        }

        let state = match &self.state {
            Some((state, _)) => state.clone(),
            None => return vec![],
        };
        debug!(
            "{} running batch {} of leader #{}: {}",
            self.log_prefix(),
            hash.short(),
            from,
            request_ids_short(&msg.request_ids)
        );
        self.round = Some(Round {
            batch_hash: hash,
            leader: from,
            request_ids: msg.request_ids.clone(),
            timestamp,
            output: None,
            signed_hash: None,
            posted_tx: None,
        });
        self.set_stage(Stage::RunVm, now);

        vec![Action::RunVm(VmTask {
            batch_hash: hash,
            state,
            requests,
            timestamp,
            leader: from,
            fee_destination: msg.fee_destination,
            balances: msg.balances.clone(),
        })]
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // RESULTS OF HELPER TASKS
    ////////////////////////////////////////////////////////////////////////////////////////

    /// The virtual machine finished a batch
    pub fn event_vm_result(&mut self, msg: VmResultMsg, now: SystemTime) -> Vec<Action> {
        let current = match self.state_index() {
            Some(current) => current,
            None => return vec![],
        };
        let round = match &self.round {
            Some(round) if round.batch_hash == msg.batch_hash && self.stage == Stage::RunVm => {
                round.clone()
            }
            _ => {
                debug!(
                    "{} result of batch {} which is not running",
                    self.log_prefix(),
                    msg.batch_hash.short()
                );
                return vec![];
            }
        };

        let output = match msg.result {
            Ok(output) => output,
            Err(e) => return self.restart_round(now, &ChainError::Vm(e).to_string()),
        };
        let next = current.saturating_add(1);
        if output.block.block_index != next || output.tx.state_index != next {
            error!(
                "{} virtual machine produced block #{} and transaction #{} for state #{}",
                self.log_prefix(),
                output.block.block_index,
                output.tx.state_index,
                current
            );
            return self.restart_round(now, "inconsistent virtual machine output");
        }
        let essence_hash = output.tx.essence_hash();
        let share = match self.signer.sign_share(&essence_hash) {
            Ok(share) => share,
            Err(e) => return self.restart_round(now, &ChainError::Signer(e).to_string()),
        };

        let mut actions = vec![Action::Enqueue(ChainEvent::PendingBlock(PendingBlockMsg {
            block: output.block.clone(),
        }))];

        if round.leader == self.params.own_index {
            let targets: Vec<u16> = (0..self.params.size)
                .filter(|i| *i != self.params.own_index)
                .filter(|i| !self.connect_period_over || self.alive.is_seen(*i))
                .collect();
            debug!(
                "{} collecting signatures over {} from {:?}",
                self.log_prefix(),
                essence_hash.short(),
                targets
            );
            actions.push(Action::CollectSignatures(SignatureRound {
                batch_hash: round.batch_hash,
                essence_hash,
                timestamp: round.timestamp,
                start: StartProcessingBatchMsg {
                    block_index: current,
                    request_ids: round.request_ids.clone(),
                    fee_destination: self.fee_destination,
                    balances: self.balances.clone(),
                },
                own_share: (self.params.own_index, share),
                targets,
            }));
            self.set_stage(Stage::CollectSignatures, now);
        } else {
            let signed = SignedHashMsg {
                block_index: current,
                orig_timestamp: round.timestamp,
                batch_hash: round.batch_hash,
                essence_hash,
                sig_share: share,
            };
            actions.push(Action::SendToPeer {
                index: round.leader,
                msg: PeerMsg::SignedHash(signed.clone()),
            });
            if let Some(r) = self.round.as_mut() {
                r.signed_hash = Some(signed);
            }
            self.set_stage(Stage::SignatureSent, now);
        }
        if let Some(r) = self.round.as_mut() {
            r.output = Some(output);
        }

        actions
    }

    /// A signature round ended
    pub fn event_signatures_collected(
        &mut self,
        msg: SignaturesCollectedMsg,
        now: SystemTime,
    ) -> Vec<Action> {
        let output = match &self.round {
            Some(Round {
                batch_hash,
                output: Some(output),
                ..
            }) if *batch_hash == msg.batch_hash && self.stage == Stage::CollectSignatures => {
                output.clone()
            }
            _ => {
                debug!(
                    "{} signatures of batch {} which is not collecting",
                    self.log_prefix(),
                    msg.batch_hash.short()
                );
                return vec![];
            }
        };
        if let Some(e) = &msg.error {
            debug!("{} signature round ended early: {}", self.log_prefix(), e);
        }
        if msg.shares.len() < usize::from(self.params.quorum) {
            let reason = match msg.error {
                Some(e) => ChainError::RoundTimeout(e).to_string(),
                None => format!("only {} shares collected", msg.shares.len()),
            };
            return self.restart_round(now, &reason);
        }

        let essence_hash = output.tx.essence_hash();
        let signature = match self.signer.aggregate(&essence_hash, &msg.shares) {
            Ok(signature) => signature,
            Err(e) => return self.restart_round(now, &ChainError::Signer(e).to_string()),
        };
        let mut tx = output.tx;
        tx.signature = Some(signature);
        let tx_id = tx.id();
        let current = self.state_index().unwrap_or_default();
        info!(
            "{} {} #{} {} with {} shares",
            self.log_prefix(),
            Yellow.bold().paint("[Posting anchor]"),
            Yellow.bold().paint(tx.state_index.to_string()),
            tx_id.short(),
            msg.shares.len()
        );
        if let Some(r) = self.round.as_mut() {
            r.posted_tx = Some(tx_id);
        }
        self.final_tx = Some(tx_id);
        self.consecutive_failures = 0;
        self.set_stage(Stage::PostTransaction, now);

        vec![
            Action::PostTransaction(tx),
            Action::Broadcast(PeerMsg::NotifyFinalResultPosted(NotifyFinalResultPostedMsg {
                block_index: current,
                tx_id,
            })),
        ]
    }

    /// Inclusion level of a transaction asked to the ledger
    pub fn event_inclusion_level(
        &mut self,
        msg: TransactionInclusionLevelMsg,
        now: SystemTime,
    ) -> Vec<Action> {
        let posted = self.round.as_ref().and_then(|r| r.posted_tx);
        if posted != Some(msg.tx_id) && self.final_tx != Some(msg.tx_id) {
            trace!(
                "{} inclusion level of unrelated transaction {}",
                self.log_prefix(),
                msg.tx_id.short()
            );
            return vec![];
        }
        match msg.level {
            InclusionLevel::Rejected => {
                warn!(
                    "{} transaction {} rejected by the ledger",
                    self.log_prefix(),
                    msg.tx_id.short()
                );
                self.restart_round(now, "anchoring transaction rejected")
            }
            InclusionLevel::Confirmed => vec![Action::RequestConfirmedTransaction(msg.tx_id)],
            InclusionLevel::Undefined | InclusionLevel::Booked => vec![],
        }
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // ROUND CONTROL
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Abort the round and start again from `NotifyLeader` after a backoff
    pub(super) fn restart_round(&mut self, now: SystemTime, reason: &str) -> Vec<Action> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let backoff = self.backoff();
        warn!(
            "{} round at #{} restarted in {:?}: {}",
            self.log_prefix(),
            self.state_index().unwrap_or_default(),
            backoff,
            reason
        );
        self.round = None;
        self.notified.clear();
        self.restart_after = Some(now + backoff);
        self.set_stage(Stage::NotifyLeader, now);

        vec![]
    }

    /// Give up on the current leader and move to the next eligible one
    pub(super) fn rotate_leader(&mut self, now: SystemTime, reason: &str) {
        let previous = self.leader_permutation.current();
        self.select_leader(true);
        info!(
            "{} leader #{} -> #{}: {}",
            self.log_prefix(),
            previous,
            self.leader_permutation.current(),
            reason
        );
        self.leader_since = now;
        self.round = None;
        self.notified.clear();
        self.set_stage(Stage::NotifyLeader, now);
    }
}
