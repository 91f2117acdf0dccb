use std::time::SystemTime;

use log::{debug, info};

use scchain_data_structures::{
    chain::unix_nanos,
    messages::{NotifyReqMsg, PeerMsg},
    request::{batch_hash, request_ids_short},
};

use super::{
    select::{select_batch, Candidate},
    Operator, Round, Stage,
};
use crate::{actors::messages::Action, collaborators::VmTask, utils::elapsed};

impl Operator {
    /// Advance the round as far as the current knowledge allows
    pub(super) fn take_action(&mut self, now: SystemTime) -> Vec<Action> {
        if self.state.is_none() {
            return vec![];
        }
        self.solidify_requests();
        self.mark_own_notifications(now);
        if let Some(restart_after) = self.restart_after {
            if now < restart_after {
                return vec![];
            }
            self.restart_after = None;
        }

        let mut actions = vec![];
        if self.stage == Stage::Init {
            if self.alive.count_seen() < usize::from(self.params.quorum) {
                return actions;
            }
            self.set_stage(Stage::NotifyLeader, now);
        }
        if self.stage == Stage::NotifyLeader {
            let stage = if self.is_leader() {
                Stage::CollectNotifications
            } else {
                Stage::NotificationsSent
            };
            self.set_stage(stage, now);
        }

        match self.stage {
            Stage::NotificationsSent => {
                actions.extend(self.notify_leader(now));
                self.check_leader_timeout(now);
            }
            Stage::CollectNotifications => {
                actions.extend(self.start_batch_if_possible(now));
                if self.stage == Stage::CollectNotifications {
                    self.check_leader_timeout(now);
                }
            }
            Stage::SignatureSent => {
                if elapsed(self.stage_since, now) >= self.config.post_transaction_timeout {
                    actions.push(match self.final_tx {
                        Some(tx_id) => Action::RequestConfirmedTransaction(tx_id),
                        None => Action::RequestStateTransaction,
                    });
                    actions.extend(self.restart_round(now, "no state transition after signing"));
                }
            }
            Stage::PostTransaction => {
                if elapsed(self.stage_since, now) >= self.config.post_transaction_timeout {
                    if let Some(tx_id) = self.round.as_ref().and_then(|r| r.posted_tx) {
                        debug!(
                            "{} transaction {} not confirmed yet, asking the ledger",
                            self.log_prefix(),
                            tx_id.short()
                        );
                        actions.push(Action::RequestInclusionLevel(tx_id));
                    }
                    self.stage_since = now;
                }
            }
            Stage::Init | Stage::NotifyLeader | Stage::RunVm | Stage::CollectSignatures => {}
        }

        actions
    }

    /// Send the leader the ids of the ready requests it was not told about yet
    fn notify_leader(&mut self, now: SystemTime) -> Vec<Action> {
        let current = match self.state_index() {
            Some(current) => current,
            None => return vec![],
        };
        let new_ids: Vec<_> = self
            .ready_requests(now)
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !self.notified.contains(id))
            .collect();
        if new_ids.is_empty() {
            return vec![];
        }
        // The leader must know every request this node can process, not only the new ones
        let all_ids: Vec<_> = self
            .ready_requests(now)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        self.notified.extend(new_ids);
        let leader = self.leader_permutation.current();
        debug!(
            "{} notifying leader #{} of {}",
            self.log_prefix(),
            leader,
            request_ids_short(&all_ids)
        );

        vec![Action::SendToPeer {
            index: leader,
            msg: PeerMsg::NotifyRequests(NotifyReqMsg {
                block_index: current,
                request_ids: all_ids,
            }),
        }]
    }

    /// Leader side: select a batch notified by a quorum and hand it to the virtual machine
    fn start_batch_if_possible(&mut self, now: SystemTime) -> Vec<Action> {
        let state = match &self.state {
            Some((state, _)) => state.clone(),
            None => return vec![],
        };
        let ready = self.ready_requests(now);
        let candidates: Vec<Candidate<'_>> = ready
            .iter()
            .map(|(id, r)| Candidate {
                request_id: *id,
                notifications: &r.notifications,
            })
            .collect();
        let batch = select_batch(&candidates, self.params.quorum);
        if batch.is_empty() {
            return vec![];
        }
        // Selected among the ready requests, so every id is in the backlog
        let requests = batch
            .iter()
            .filter_map(|id| self.requests.get(id))
            .map(|request| request.batch_request())
            .collect();

        let own_index = self.params.own_index;
        // Strictly after the solid state
        let timestamp = unix_nanos(now).max(state.timestamp.saturating_add(1));
        let hash = batch_hash(&batch, timestamp, own_index);
        info!(
            "{} leading batch {} at #{}: {}",
            self.log_prefix(),
            hash.short(),
            state.block_index,
            request_ids_short(&batch)
        );
        self.round = Some(Round {
            batch_hash: hash,
            leader: own_index,
            request_ids: batch,
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
            leader: own_index,
            fee_destination: self.fee_destination,
            balances: self.balances.clone(),
        })]
    }

    /// Rotate the leader if requests are waiting and no batch started in time
    fn check_leader_timeout(&mut self, now: SystemTime) {
        if self.ready_requests(now).is_empty() {
            self.leader_since = now;
            return;
        }
        if elapsed(self.leader_since, now) >= self.config.leader_rotation_period {
            self.rotate_leader(now, "no batch started in time");
            // Continue at once with the new leader
            let stage = if self.is_leader() {
                Stage::CollectNotifications
            } else {
                Stage::NotificationsSent
            };
            self.set_stage(stage, now);
        }
    }
}
