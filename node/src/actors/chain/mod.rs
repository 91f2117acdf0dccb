//! # Chain actor
//!
//! Sequential event loop of one chain. Every inbound item (peer messages, ledger events, timer
//! ticks, results of helper tasks) becomes a [`ChainEvent`] processed in arrival order. The
//! events are routed to the [`StateManager`], to the [`Operator`] or to both, and the actions
//! they return are executed here: sending peer messages, querying the ledger, spawning the
//! virtual machine and the signature rounds.
use std::{sync::Arc, time::SystemTime};

use actix::prelude::*;
use ansi_term::Color::{Cyan, Green, Red};
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use scchain_config::config::Chain;
use scchain_data_structures::{
    chain::{from_unix_nanos, unix_nanos, AgentId, ChainId, Hash},
    messages::{PeerMsg, SignedHashMsg, TestTraceMsg},
    peer_set::PeerSet,
    permutation::Permutation16,
};
use scchain_p2p::{
    group::PeerGroup,
    network::{AttachId, NetworkProvider, PeerMessage, RecvEvent},
};

use crate::{
    actors::messages::{
        Action, ChainEvent, ChainStatus, Readiness, RequestProcessed, SignatureRound,
        SignaturesCollectedMsg, TransactionInclusionLevelMsg, VmResultMsg,
    },
    collaborators::{
        BlobCache, InclusionLevel, LedgerClient, StatePersistence, SubscriptionId,
        ThresholdSigner, Vm, VmTask,
    },
    consensus::Operator,
    error::ChainError,
    state_mngr::StateManager,
};

mod actor;
mod handlers;

/// Identity of a chain and of this node in its committee
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainParams {
    /// Chain
    pub chain_id: ChainId,
    /// Number of committee members
    pub size: u16,
    /// Shares needed for a committee signature
    pub quorum: u16,
    /// Index of this node in the committee
    pub own_index: u16,
}

/// Collaborators of a chain
#[derive(Clone)]
pub struct ChainDeps {
    /// Transport shared by the chains of the node
    pub net: Arc<dyn NetworkProvider>,
    /// Virtual machine
    pub vm: Arc<dyn Vm>,
    /// Threshold signer holding the share of this node
    pub signer: Arc<dyn ThresholdSigner>,
    /// Ledger client
    pub ledger: Arc<dyn LedgerClient>,
    /// Persistence of the solid state
    pub persistence: Arc<dyn StatePersistence>,
    /// Cache of request argument blobs
    pub blobs: Arc<dyn BlobCache>,
    /// Agent receiving the fees of the batches led by this node
    pub fee_destination: AgentId,
    /// Told about every processed request
    pub request_processed: Option<Recipient<RequestProcessed>>,
}

/// Signature round running on a helper task
struct RunningRound {
    batch_hash: Hash,
    /// Delivers the `SignedHash` answers to the round
    answers: mpsc::UnboundedSender<RecvEvent>,
}

////////////////////////////////////////////////////////////////////////////////////////
// ACTOR BASIC STRUCTURE
////////////////////////////////////////////////////////////////////////////////////////
/// Chain actor
pub struct ChainActor {
    params: ChainParams,
    config: Chain,
    peers: Arc<PeerGroup>,
    sm: StateManager,
    op: Operator,

    vm: Arc<dyn Vm>,
    signer: Arc<dyn ThresholdSigner>,
    ledger: Arc<dyn LedgerClient>,
    request_processed: Option<Recipient<RequestProcessed>>,

    readiness: Readiness,
    /// Closed until the state manager finished its bootstrap
    queue_open: bool,
    tick: u64,
    attach_id: Option<AttachId>,
    subscription: Option<SubscriptionId>,
    /// Fired on dismissal, ends the running signature round
    cancel: CancellationToken,
    round: Option<RunningRound>,
    last_trace_rtt: Option<i64>,
    dismissed: bool,
}

impl ChainActor {
    /// Chain actor for `params`, talking to the committee through `peers`
    pub fn new(params: ChainParams, config: Chain, peers: Arc<PeerGroup>, deps: ChainDeps) -> Self {
        let now = SystemTime::now();
        let sm = StateManager::new(params, config.clone(), deps.persistence);
        let mut op = Operator::new(params, config.clone(), deps.signer.clone(), deps.blobs, now);
        op.set_fee_destination(deps.fee_destination);

        ChainActor {
            params,
            config,
            peers,
            sm,
            op,
            vm: deps.vm,
            signer: deps.signer,
            ledger: deps.ledger,
            request_processed: deps.request_processed,
            readiness: Readiness::NotReady,
            queue_open: false,
            tick: 0,
            attach_id: None,
            subscription: None,
            cancel: CancellationToken::new(),
            round: None,
            last_trace_rtt: None,
            dismissed: false,
        }
    }

    fn log_prefix(&self) -> String {
        format!("[{}:{}]", self.params.chain_id.short(), self.params.own_index)
    }

    /// Snapshot of the chain
    pub fn status(&self) -> ChainStatus {
        ChainStatus {
            chain_id: self.params.chain_id,
            own_index: self.params.own_index,
            readiness: self.readiness,
            sync_status: self.sm.status(),
            solid_index: self.sm.solid_index(),
            state_hash: self.sm.solid_state().state_hash,
            largest_evidenced_index: self.sm.largest_evidenced_index(),
            stage: self.op.stage(),
            leader: self.op.leader(),
            backlog: self.op.backlog_len(),
            last_trace_rtt: self.last_trace_rtt,
        }
    }

    /// Route an event to the state manager, the operator or both
    fn dispatch(&mut self, event: ChainEvent, ctx: &mut Context<Self>) -> Vec<Action> {
        let now = SystemTime::now();
        match event {
            ChainEvent::Peer(ev) => self.dispatch_peer_msg(ev, now),
            ChainEvent::Request(msg) => self.op.event_request(msg.payload, now),
            ChainEvent::StateTransaction(msg) => self.sm.event_state_transaction(msg.tx, now),
            ChainEvent::TransactionInclusionLevel(msg) => self.op.event_inclusion_level(msg, now),
            ChainEvent::Balances(msg) => self.op.event_balances(msg.balances),
            ChainEvent::StateTransition(msg) => self.op.event_state_transition(msg, now),
            ChainEvent::PendingBlock(msg) => self.sm.event_pending_block(msg.block, now),
            ChainEvent::VmResult(msg) => self.op.event_vm_result(msg, now),
            ChainEvent::SignaturesCollected(msg) => {
                if self.round.as_ref().map(|r| r.batch_hash) == Some(msg.batch_hash) {
                    self.round = None;
                }
                self.op.event_signatures_collected(msg, now)
            }
            ChainEvent::TimerTick(tick) if tick % 2 == 0 => self.sm.event_timer_tick(tick / 2, now),
            ChainEvent::TimerTick(tick) => self.op.event_timer_tick(tick / 2, now),
            ChainEvent::Connectivity(msg) => self.update_readiness(msg.alive, ctx),
            ChainEvent::ConnectPeriodOver => {
                if self.readiness != Readiness::QuorumReached {
                    return vec![];
                }
                self.readiness = Readiness::ConnectPeriodOver;
                info!(
                    "{} connect period over: {}",
                    self.log_prefix(),
                    self.peers.peer_status()
                );
                self.op.event_connect_period_over(now)
            }
            ChainEvent::Dismiss(reason) => vec![Action::Dismiss(reason)],
        }
    }

    fn dispatch_peer_msg(&mut self, ev: RecvEvent, now: SystemTime) -> Vec<Action> {
        let from = match self.peers.peer_index_by_net_id(&ev.from) {
            Some(from) => from,
            None => {
                warn!("{} {}", self.log_prefix(), ChainError::UnknownSender(ev.from));
                return vec![];
            }
        };
        let msg = match ev.msg.decode() {
            Ok(msg) => msg,
            Err(e) => {
                error!(
                    "{} malformed message of type {} from peer #{}: {}",
                    self.log_prefix(),
                    ev.msg.msg_type,
                    from,
                    e
                );
                return vec![];
            }
        };
        trace!(
            "{} message type {} from peer #{}",
            self.log_prefix(),
            msg.msg_type(),
            from
        );

        match &msg {
            PeerMsg::StateIndexPingPong(_)
            | PeerMsg::GetBlock(_)
            | PeerMsg::BlockHeader(_)
            | PeerMsg::StateUpdate(_) => self.sm.event_peer_msg(from, &msg, now),
            PeerMsg::SignedHash(_) => {
                let mut actions = self.sm.event_peer_msg(from, &msg, now);
                let forwarded = match &self.round {
                    Some(round) => round.answers.send(ev.clone()).is_ok(),
                    None => false,
                };
                if !forwarded {
                    actions.extend(self.op.event_peer_msg(from, &msg, ev.msg.timestamp, now));
                }
                actions
            }
            PeerMsg::NotifyRequests(_)
            | PeerMsg::NotifyFinalResultPosted(_)
            | PeerMsg::StartProcessingBatch(_) => {
                let mut actions = self.sm.event_peer_msg(from, &msg, now);
                actions.extend(self.op.event_peer_msg(from, &msg, ev.msg.timestamp, now));
                actions
            }
            PeerMsg::TestTrace(trace) => self.forward_test_trace(from, trace, now),
        }
    }

    fn update_readiness(&mut self, alive: PeerSet, ctx: &mut Context<Self>) -> Vec<Action> {
        if self.readiness == Readiness::NotReady
            && alive.count_seen() >= usize::from(self.params.quorum)
        {
            self.readiness = Readiness::QuorumReached;
            info!(
                "{} {} {}",
                self.log_prefix(),
                Green.bold().paint("[Quorum reached]"),
                self.peers.peer_status()
            );
            ctx.run_later(self.config.additional_connect_period, |_act, ctx| {
                ctx.notify(ChainEvent::ConnectPeriodOver);
            });
        }

        self.op.event_connectivity(alive)
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // ACTIONS
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Execute the actions returned by the state manager and the operator, in order
    fn execute(&mut self, actions: Vec<Action>, ctx: &mut Context<Self>) {
        let chain_id = self.params.chain_id;
        for action in actions {
            if self.dismissed {
                return;
            }
            match action {
                Action::SendToPeer { index, msg } => self.send_to_peer(index, &msg),
                Action::Broadcast(msg) => self.broadcast(&msg),
                Action::Enqueue(event) => ctx.notify(event),
                Action::RunVm(task) => self.run_vm(task, ctx),
                Action::CollectSignatures(round) => self.collect_signatures(round, ctx),
                Action::PostTransaction(tx) => {
                    if let Err(e) = self.ledger.post_transaction(&tx) {
                        warn!("{} {}", self.log_prefix(), ChainError::Ledger(e));
                        ctx.notify(ChainEvent::TransactionInclusionLevel(
                            TransactionInclusionLevelMsg {
                                tx_id: tx.id(),
                                level: InclusionLevel::Rejected,
                            },
                        ));
                    }
                }
                Action::RequestConfirmedTransaction(tx_id) => {
                    self.ledger.request_confirmed_transaction(&chain_id, &tx_id)
                }
                Action::RequestStateTransaction => self.ledger.request_state_transaction(&chain_id),
                Action::RequestInclusionLevel(tx_id) => {
                    self.ledger.request_inclusion_level(&chain_id, &tx_id)
                }
                Action::RequestProcessed(request_id) => {
                    if let Some(recipient) = &self.request_processed {
                        recipient.do_send(RequestProcessed {
                            chain_id,
                            request_id,
                        });
                    }
                }
                Action::StateManagerReady => {
                    debug!("{} state manager ready, event queue open", self.log_prefix());
                    self.queue_open = true;
                }
                Action::Dismiss(reason) => self.dismiss(&reason, ctx),
            }
        }
    }

    fn envelope(&self, msg: &PeerMsg, at: SystemTime) -> Option<PeerMessage> {
        match PeerMessage::new(self.params.chain_id, msg, at) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                error!(
                    "{} cannot encode message type {}: {}",
                    self.log_prefix(),
                    msg.msg_type(),
                    e
                );
                None
            }
        }
    }

    fn send_to_peer(&self, index: u16, msg: &PeerMsg) {
        if let Some(envelope) = self.envelope(msg, SystemTime::now()) {
            self.peers.send_to_index(index, &envelope);
        }
    }

    fn broadcast(&self, msg: &PeerMsg) {
        if let Some(envelope) = self.envelope(msg, SystemTime::now()) {
            self.peers.broadcast(&envelope, false);
        }
    }

    /// Run the batch outside of the event loop, the result comes back as a `VmResult` event
    fn run_vm(&self, task: VmTask, ctx: &mut Context<Self>) {
        let batch_hash = task.batch_hash;
        self.vm
            .run_batch(task)
            .into_actor(self)
            .map(move |result, _act, ctx| {
                ctx.notify(ChainEvent::VmResult(VmResultMsg { batch_hash, result }));
            })
            .spawn(ctx);
    }

    /// Collect the signature shares of the committee on a helper task. The answers reach the
    /// task through a channel fed by the event loop, the outcome comes back as a
    /// `SignaturesCollected` event as soon as the own share and the valid answers reach the
    /// quorum.
    fn collect_signatures(&mut self, round: SignatureRound, ctx: &mut Context<Self>) {
        let batch_hash = round.batch_hash;
        let (answers, mut recv) = mpsc::unbounded_channel();
        self.round = Some(RunningRound {
            batch_hash,
            answers,
        });

        // Peers derive the batch hash from the timestamp of the envelope
        let start = PeerMsg::StartProcessingBatch(round.start.clone());
        let envelope = match self.envelope(&start, from_unix_nanos(round.timestamp)) {
            Some(envelope) => envelope,
            None => {
                ctx.notify(ChainEvent::SignaturesCollected(SignaturesCollectedMsg {
                    batch_hash,
                    shares: vec![round.own_share],
                    error: None,
                }));
                return;
            }
        };

        let peers = Arc::clone(&self.peers);
        let signer = Arc::clone(&self.signer);
        let cancel = self.cancel.clone();
        let retry = self.config.signature_retry_timeout;
        let give_up = self.config.signature_give_up_timeout;
        let prefix = self.log_prefix();
        // The own share counts towards the quorum
        let required = usize::from(self.params.quorum).saturating_sub(1);

        async move {
            let mut shares = vec![round.own_share.clone()];
            let result = peers
                .exchange_round(
                    &round.targets,
                    required,
                    &mut recv,
                    retry,
                    give_up,
                    &cancel,
                    |index, peer| {
                        trace!("{} asking peer #{} for a signature share", prefix, index);
                        peer.send_msg(&envelope);
                    },
                    |index, ev| {
                        let signed = match ev.msg.decode() {
                            Ok(PeerMsg::SignedHash(signed)) => signed,
                            Ok(other) => {
                                return Err(format!("unexpected message type {}", other.msg_type()))
                            }
                            Err(e) => return Err(e.to_string()),
                        };
                        check_share(&round, signer.as_ref(), index, &signed)?;
                        shares.push((index, signed.sig_share));
                        Ok(true)
                    },
                )
                .await;

            SignaturesCollectedMsg {
                batch_hash,
                shares,
                error: result.err(),
            }
        }
        .into_actor(self)
        .map(|msg, _act, ctx| ctx.notify(ChainEvent::SignaturesCollected(msg)))
        .spawn(ctx);
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // TEST TRACE
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Send a test trace through every peer, in a random order
    fn start_test_trace(&mut self) -> Vec<Action> {
        let seed: [u8; 32] = rand::random();
        let sequence = Permutation16::new(self.params.size, &seed).as_slice().to_vec();
        info!(
            "{} starting test trace along {:?}",
            self.log_prefix(),
            sequence
        );
        let msg = TestTraceMsg {
            init_time: unix_nanos(SystemTime::now()),
            init_peer: self.params.own_index,
            sequence,
            num_hops: 0,
        };

        self.forward_test_trace(self.params.own_index, &msg, SystemTime::now())
    }

    fn forward_test_trace(&mut self, from: u16, msg: &TestTraceMsg, now: SystemTime) -> Vec<Action> {
        let sequence = match Permutation16::from_sequence(msg.sequence.clone()) {
            Ok(sequence) if sequence.size() == self.params.size => sequence,
            Ok(_) | Err(_) => {
                error!(
                    "{} malformed test trace from peer #{}: sequence {:?}",
                    self.log_prefix(),
                    from,
                    msg.sequence
                );
                return vec![];
            }
        };
        let own = self.params.own_index;
        if msg.init_peer == own && msg.num_hops > 0 {
            let rtt = unix_nanos(now).saturating_sub(msg.init_time);
            self.last_trace_rtt = Some(rtt);
            info!(
                "{} {} back after {} hops in {} µs",
                self.log_prefix(),
                Cyan.bold().paint("[Test trace]"),
                msg.num_hops,
                rtt / 1_000
            );
            return vec![];
        }
        let next = match sequence.successor_of(own) {
            Some(next) => next,
            None => return vec![],
        };

        vec![Action::SendToPeer {
            index: next,
            msg: PeerMsg::TestTrace(TestTraceMsg {
                num_hops: msg.num_hops.saturating_add(1),
                ..msg.clone()
            }),
        }]
    }

    ////////////////////////////////////////////////////////////////////////////////////////
    // DISMISSAL
    ////////////////////////////////////////////////////////////////////////////////////////

    /// Stop the chain: end the running round, stop receiving messages and ledger events
    fn dismiss(&mut self, reason: &str, ctx: &mut Context<Self>) {
        if self.dismissed {
            return;
        }
        self.dismissed = true;
        warn!(
            "{} {} {}",
            self.log_prefix(),
            Red.bold().paint("[Dismissed]"),
            reason
        );
        self.release();
        ctx.stop();
    }

    /// Detach from the transport and the ledger. Safe to call more than once.
    fn release(&mut self) {
        self.cancel.cancel();
        self.round = None;
        if let Some(attach_id) = self.attach_id.take() {
            self.peers.detach(attach_id);
        }
        if let Some(subscription) = self.subscription.take() {
            self.ledger
                .unsubscribe(&self.params.chain_id, subscription);
        }
    }
}

/// Accept `signed` as the share of peer `index` for `round`
fn check_share(
    round: &SignatureRound,
    signer: &dyn ThresholdSigner,
    index: u16,
    signed: &SignedHashMsg,
) -> Result<(), String> {
    if signed.block_index != round.start.block_index {
        return Err(format!(
            "share for state #{} instead of #{}",
            signed.block_index, round.start.block_index
        ));
    }
    if signed.batch_hash != round.batch_hash {
        return Err(format!("share for batch {}", signed.batch_hash.short()));
    }
    if signed.essence_hash != round.essence_hash {
        return Err(format!(
            "share over essence {} instead of {}",
            signed.essence_hash.short(),
            round.essence_hash.short()
        ));
    }
    if !signer.verify_share(index, &round.essence_hash, &signed.sig_share) {
        return Err("invalid signature share".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use scchain_data_structures::messages::StartProcessingBatchMsg;
    use scchain_p2p::local::LocalNetwork;
    use scchain_storage::backends::hashmap;

    use super::*;
    use crate::{
        actors::messages::ConnectivityMsg,
        simulation::{InMemoryBlobCache, SimulatedLedger, SimulatedSigner, SimulatedVm},
        storage_mngr::SolidStateStore,
        utils::test_actix_system,
    };

    /// Actor of node 0 in a committee of 4 with quorum 3, not started
    fn chain_actor() -> ChainActor {
        let network = LocalNetwork::new();
        let committee: Vec<String> = (0..4).map(|i| format!("node-{}", i)).collect();
        let nodes: Vec<_> = committee.iter().map(|n| network.node(n)).collect();
        let peers = PeerGroup::new(nodes[0].clone(), &committee).unwrap();
        let params = ChainParams {
            chain_id: ChainId([5; 32]),
            size: 4,
            quorum: 3,
            own_index: 0,
        };
        let deps = ChainDeps {
            net: nodes[0].clone(),
            vm: Arc::new(SimulatedVm),
            signer: Arc::new(SimulatedSigner::new(0, 3)),
            ledger: Arc::new(SimulatedLedger::new()),
            persistence: Arc::new(SolidStateStore::new(Arc::new(hashmap::Backend::new()))),
            blobs: Arc::new(InMemoryBlobCache::new()),
            fee_destination: AgentId::default(),
            request_processed: None,
        };

        ChainActor::new(
            params,
            scchain_config::config::Config::default().chain,
            Arc::new(peers),
            deps,
        )
    }

    fn open_queue(actor: &mut ChainActor, ctx: &mut Context<ChainActor>) {
        let actions = actor.sm.bootstrap(SystemTime::now());
        actor.execute(actions, ctx);
        assert!(actor.queue_open);
    }

    #[test]
    fn events_are_dropped_until_the_state_manager_is_ready() {
        test_actix_system(|| async {
            let mut actor = chain_actor();
            let mut ctx = Context::new();
            let alive = actor.peers.alive_set();
            assert_eq!(alive.count_seen(), 4);

            let connectivity = ChainEvent::Connectivity(ConnectivityMsg {
                alive: alive.clone(),
            });
            Handler::<ChainEvent>::handle(&mut actor, connectivity, &mut ctx);
            assert_eq!(actor.status().readiness, Readiness::NotReady);

            open_queue(&mut actor, &mut ctx);
            let connectivity = ChainEvent::Connectivity(ConnectivityMsg { alive });
            Handler::<ChainEvent>::handle(&mut actor, connectivity, &mut ctx);
            assert_eq!(actor.status().readiness, Readiness::QuorumReached);
        });
    }

    #[test]
    fn connect_period_over_needs_a_quorum_first() {
        test_actix_system(|| async {
            let mut actor = chain_actor();
            let mut ctx = Context::new();
            open_queue(&mut actor, &mut ctx);

            let mut alive = PeerSet::new(4);
            alive.mark_seen(0);
            alive.mark_seen(1);
            actor.dispatch(
                ChainEvent::Connectivity(ConnectivityMsg {
                    alive: alive.clone(),
                }),
                &mut ctx,
            );
            assert_eq!(actor.readiness, Readiness::NotReady);
            actor.dispatch(ChainEvent::ConnectPeriodOver, &mut ctx);
            assert_eq!(actor.readiness, Readiness::NotReady);

            alive.mark_seen(3);
            actor.dispatch(ChainEvent::Connectivity(ConnectivityMsg { alive }), &mut ctx);
            assert_eq!(actor.readiness, Readiness::QuorumReached);
            actor.dispatch(ChainEvent::ConnectPeriodOver, &mut ctx);
            assert_eq!(actor.readiness, Readiness::ConnectPeriodOver);
        });
    }

    #[test]
    fn even_ticks_go_to_the_state_manager_and_odd_ones_to_the_operator() {
        test_actix_system(|| async {
            let mut actor = chain_actor();
            let mut ctx = Context::new();
            open_queue(&mut actor, &mut ctx);

            // The operator has no state yet and stays idle
            let actions = actor.dispatch(ChainEvent::TimerTick(1), &mut ctx);
            assert!(actions.is_empty());

            // The state manager pings the committee on its first tick
            let actions = actor.dispatch(ChainEvent::TimerTick(2), &mut ctx);
            assert!(actions
                .iter()
                .any(|a| matches!(a, Action::Broadcast(PeerMsg::StateIndexPingPong(_)))));
        });
    }

    #[test]
    fn test_trace_is_forwarded_and_measured_at_the_initiator() {
        test_actix_system(|| async {
            let mut actor = chain_actor();
            let now = SystemTime::now();
            let msg = TestTraceMsg {
                init_time: unix_nanos(now),
                init_peer: 2,
                sequence: vec![2, 0, 3, 1],
                num_hops: 1,
            };

            let actions = actor.forward_test_trace(2, &msg, now);
            match actions.as_slice() {
                [Action::SendToPeer {
                    index: 3,
                    msg: PeerMsg::TestTrace(forwarded),
                }] => assert_eq!(forwarded.num_hops, 2),
                other => panic!("unexpected actions {:?}", other),
            }
            assert_eq!(actor.last_trace_rtt, None);

            // Back at the initiator
            let back = TestTraceMsg {
                init_peer: 0,
                num_hops: 4,
                ..msg.clone()
            };
            assert!(actor.forward_test_trace(1, &back, now).is_empty());
            assert_eq!(actor.last_trace_rtt, Some(0));

            // Sequence of another committee size
            let malformed = TestTraceMsg {
                sequence: vec![1, 0],
                ..msg
            };
            assert!(actor.forward_test_trace(2, &malformed, now).is_empty());
        });
    }

    fn round() -> SignatureRound {
        let essence_hash = Hash::of(b"essence");
        SignatureRound {
            batch_hash: Hash::of(b"batch"),
            essence_hash,
            timestamp: 7,
            start: StartProcessingBatchMsg {
                block_index: 3,
                request_ids: vec![],
                fee_destination: Default::default(),
                balances: Default::default(),
            },
            own_share: (0, SimulatedSigner::new(0, 3).sign_share(&essence_hash).unwrap()),
            targets: vec![1, 2, 3],
        }
    }

    fn signed(index: u16, round: &SignatureRound) -> SignedHashMsg {
        SignedHashMsg {
            block_index: round.start.block_index,
            orig_timestamp: round.timestamp,
            batch_hash: round.batch_hash,
            essence_hash: round.essence_hash,
            sig_share: SimulatedSigner::new(index, 3)
                .sign_share(&round.essence_hash)
                .unwrap(),
        }
    }

    #[test]
    fn valid_share_is_accepted() {
        let round = round();
        let signer = SimulatedSigner::new(0, 3);
        assert!(check_share(&round, &signer, 2, &signed(2, &round)).is_ok());
    }

    #[test]
    fn share_of_another_peer_is_rejected() {
        let round = round();
        let signer = SimulatedSigner::new(0, 3);
        assert!(check_share(&round, &signer, 1, &signed(2, &round)).is_err());
    }

    #[test]
    fn share_for_another_batch_or_index_is_rejected() {
        let round = round();
        let signer = SimulatedSigner::new(0, 3);

        let mut other_batch = signed(2, &round);
        other_batch.batch_hash = Hash::of(b"other");
        assert!(check_share(&round, &signer, 2, &other_batch).is_err());

        let mut other_index = signed(2, &round);
        other_index.block_index = 4;
        assert!(check_share(&round, &signer, 2, &other_index).is_err());

        let mut other_essence = signed(2, &round);
        other_essence.essence_hash = Hash::of(b"other");
        assert!(check_share(&round, &signer, 2, &other_essence).is_err());
    }
}
