use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use scchain_config::config::Config;
use scchain_data_structures::{
    chain::{ChainId, RequestId, TransactionId},
    messages::{BlockHeaderMsg, GetBlockMsg, PeerMsg, StateIndexPingPongMsg, StateUpdateMsg},
    state::{Block, Mutation, StateUpdate, VirtualState},
    transaction::AnchorTransaction,
};
use scchain_storage::{backends::hashmap, error::StorageError};

use super::*;
use crate::{
    actors::messages::{Action, ChainEvent},
    collaborators::StatePersistence,
    storage_mngr::SolidStateStore,
};

const CHAIN: ChainId = ChainId([7; 32]);

fn t0() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000)
}

fn params(own_index: u16) -> ChainParams {
    ChainParams {
        chain_id: CHAIN,
        size: 4,
        quorum: 3,
        own_index,
    }
}

fn store() -> Arc<SolidStateStore> {
    Arc::new(SolidStateStore::new(Arc::new(hashmap::Backend::new())))
}

fn state_manager(persistence: Arc<dyn StatePersistence>) -> StateManager {
    let mut sm = StateManager::new(params(0), Config::default().chain, persistence);
    sm.bootstrap(t0());
    sm
}

fn origin_state() -> VirtualState {
    VirtualState::pre_origin(CHAIN)
        .with_block(&Block::origin())
        .unwrap()
}

fn anchor(state: &VirtualState) -> AnchorTransaction {
    let mut tx = AnchorTransaction::new(
        CHAIN,
        state.block_index,
        state.state_hash,
        state.timestamp,
        vec![],
    );
    tx.signature = Some(vec![1, 2, 3]);
    tx
}

fn block(index: u32, req: u8, value: u8) -> Block {
    Block::new(
        index,
        vec![StateUpdate {
            request_id: RequestId([req; 16]),
            timestamp: i64::from(index) * 1000 + i64::from(value),
            mutations: vec![Mutation::Set {
                key: b"counter".to_vec(),
                value: vec![value],
            }],
        }],
    )
}

fn transitions(actions: &[Action]) -> Vec<&VirtualState> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Enqueue(ChainEvent::StateTransition(msg)) => Some(&msg.state),
            _ => None,
        })
        .collect()
}

fn get_block_requests(actions: &[Action]) -> Vec<u32> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::SendToPeer {
                msg: PeerMsg::GetBlock(m),
                ..
            } => Some(m.block_index),
            _ => None,
        })
        .collect()
}

/// State manager with the origin state confirmed
fn at_origin(persistence: Arc<dyn StatePersistence>) -> StateManager {
    let mut sm = state_manager(persistence);
    let actions = sm.event_state_transaction(anchor(&origin_state()), t0());
    assert_eq!(transitions(&actions).len(), 1);
    sm
}

#[test]
fn bootstrap_without_persisted_state_waits_for_origin() {
    let mut sm = StateManager::new(params(0), Config::default().chain, store());
    assert_eq!(sm.status(), SyncStatus::Bootstrapping);

    let actions = sm.bootstrap(t0());
    assert!(matches!(actions.as_slice(), [Action::StateManagerReady]));
    assert_eq!(sm.status(), SyncStatus::Waiting);
    assert_eq!(sm.solid_index(), None);
    // The origin block waits for the origin transaction
    assert_eq!(sm.num_pending_blocks(), 1);
}

#[test]
fn origin_transaction_confirms_origin_block() {
    let persistence = store();
    let mut sm = state_manager(persistence.clone());

    let actions = sm.event_state_transaction(anchor(&origin_state()), t0());
    let states = transitions(&actions);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].block_index, 0);
    assert_eq!(sm.solid_index(), Some(0));
    assert!(sm.is_solid_state_valid());
    assert_eq!(sm.status(), SyncStatus::Synced);
    assert_eq!(sm.num_pending_blocks(), 0);

    let (persisted, origin) = persistence.load_solid_state(&CHAIN).unwrap().unwrap();
    assert_eq!(persisted, origin_state());
    assert_eq!(origin.state_tx_id, Some(anchor(&origin_state()).id()));
}

#[test]
fn confirming_the_same_block_twice_is_a_no_op() {
    let mut sm = at_origin(store());
    let b1 = block(1, 1, 1);
    let s1 = origin_state().with_block(&b1).unwrap();
    sm.event_pending_block(b1, t0());

    let tx = anchor(&s1);
    assert_eq!(transitions(&sm.event_state_transaction(tx.clone(), t0())).len(), 1);
    assert_eq!(sm.solid_index(), Some(1));

    // Same transaction again: nothing changes
    let actions = sm.event_state_transaction(tx, t0());
    assert!(transitions(&actions).is_empty());
    assert_eq!(sm.solid_index(), Some(1));
    assert_eq!(sm.solid_state(), &s1);
}

#[test]
fn pending_block_for_wrong_index_is_ignored() {
    let mut sm = at_origin(store());
    assert!(sm.event_pending_block(block(2, 1, 1), t0()).is_empty());
    assert!(sm.event_pending_block(block(0, 1, 1), t0()).is_empty());
    assert_eq!(sm.num_pending_blocks(), 0);

    sm.event_pending_block(block(1, 1, 1), t0());
    // The same block twice is registered once
    sm.event_pending_block(block(1, 1, 1), t0());
    assert_eq!(sm.num_pending_blocks(), 1);
}

#[test]
fn competing_pending_blocks_second_one_confirmed() {
    let persistence = store();
    let mut sm = at_origin(persistence.clone());

    let first = block(1, 1, 10);
    let second = block(1, 2, 20);
    let first_state = origin_state().with_block(&first).unwrap();
    let second_state = origin_state().with_block(&second).unwrap();
    assert_ne!(first_state.state_hash, second_state.state_hash);

    sm.event_pending_block(first, t0());
    sm.event_pending_block(second.clone(), t0());
    assert_eq!(sm.num_pending_blocks(), 2);

    let tx = anchor(&second_state);
    let actions = sm.event_state_transaction(tx.clone(), t0());
    assert_eq!(transitions(&actions), vec![&second_state]);
    // The first candidate is gone
    assert_eq!(sm.num_pending_blocks(), 0);
    assert_eq!(sm.solid_state(), &second_state);
    assert_eq!(sm.solid_state().get(b"counter"), Some(&[20][..]));

    let stored = persistence.load_block(&CHAIN, 1).unwrap().unwrap();
    assert_eq!(stored.state_updates, second.state_updates);
    assert_eq!(stored.state_tx_id, Some(tx.id()));

    // A late transaction for the discarded candidate does not touch the solid state
    let actions = sm.event_state_transaction(anchor(&first_state), t0());
    assert!(transitions(&actions).is_empty());
    assert_eq!(sm.solid_state(), &second_state);
}

#[test]
fn transaction_before_block_confirms_when_block_arrives() {
    let mut sm = at_origin(store());
    let b1 = block(1, 1, 1);
    let s1 = origin_state().with_block(&b1).unwrap();

    // Unknown state: remembered, and the block is requested
    let actions = sm.event_state_transaction(anchor(&s1), t0());
    assert!(transitions(&actions).is_empty());
    assert_eq!(sm.status(), SyncStatus::Syncing);
    assert_eq!(get_block_requests(&actions), vec![1]);

    let actions = sm.event_pending_block(b1, t0());
    assert_eq!(transitions(&actions), vec![&s1]);
    assert_eq!(sm.status(), SyncStatus::Synced);
}

#[test]
fn block_header_two_indices_ahead_starts_sync_from_next_block() {
    let mut sm = at_origin(store());
    assert_eq!(sm.largest_evidenced_index(), 0);

    let header = PeerMsg::BlockHeader(BlockHeaderMsg {
        block_index: 2,
        size: 1,
        anchor_tx_id: TransactionId([9; 32]),
    });
    let actions = sm.event_peer_msg(2, &header, t0());

    assert_eq!(sm.largest_evidenced_index(), 2);
    assert_eq!(sm.status(), SyncStatus::Syncing);
    // Block 1 is requested first, block 2 is not skipped to
    assert_eq!(get_block_requests(&actions), vec![1]);
    assert_eq!(sm.num_pending_blocks(), 0);
    assert_eq!(sm.solid_index(), Some(0));
}

#[test]
fn block_requests_are_retried_on_other_peers() {
    let mut sm = at_origin(store());
    sm.event_peer_msg(
        1,
        &PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
            block_index: 5,
            rsvp: false,
        }),
        t0(),
    );

    let retry = Config::default().chain.sync_retry_period;
    let mut asked = vec![];
    for i in 1..=3u32 {
        let now = t0() + retry * i;
        for action in sm.event_timer_tick(u64::from(i), now) {
            if let Action::SendToPeer {
                index,
                msg: PeerMsg::GetBlock(m),
            } = action
            {
                assert_eq!(m.block_index, 1);
                asked.push(index);
            }
        }
    }

    assert_eq!(asked.len(), 3);
    // Never self, and three distinct peers out of the other three
    assert!(!asked.contains(&0));
    asked.sort_unstable();
    asked.dedup();
    assert_eq!(asked.len(), 3);
}

#[test]
fn fetched_block_becomes_pending_and_is_confirmed() {
    let mut sm = at_origin(store());
    let b1 = block(1, 1, 1);
    let s1 = origin_state().with_block(&b1).unwrap();
    let tx = anchor(&s1);

    let actions = sm.event_state_transaction(tx.clone(), t0());
    assert_eq!(get_block_requests(&actions), vec![1]);

    let header = PeerMsg::BlockHeader(BlockHeaderMsg {
        block_index: 1,
        size: 1,
        anchor_tx_id: tx.id(),
    });
    sm.event_peer_msg(3, &header, t0());

    let update = PeerMsg::StateUpdate(StateUpdateMsg {
        block_index: 1,
        state_update: b1.state_updates[0].clone(),
        index_in_block: 0,
    });
    let actions = sm.event_peer_msg(3, &update, t0());
    // The transaction was already known: confirmed right away
    assert_eq!(transitions(&actions), vec![&s1]);
    assert_eq!(sm.status(), SyncStatus::Synced);
}

#[test]
fn fetched_block_asks_for_its_transaction() {
    let mut sm = at_origin(store());
    let b1 = block(1, 1, 1);
    let tx_id = TransactionId([4; 32]);

    // Behind by two, block 1 is fetched first
    sm.event_peer_msg(
        1,
        &PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
            block_index: 2,
            rsvp: false,
        }),
        t0(),
    );
    sm.event_peer_msg(
        1,
        &PeerMsg::BlockHeader(BlockHeaderMsg {
            block_index: 1,
            size: 1,
            anchor_tx_id: tx_id,
        }),
        t0(),
    );
    let actions = sm.event_peer_msg(
        1,
        &PeerMsg::StateUpdate(StateUpdateMsg {
            block_index: 1,
            state_update: b1.state_updates[0].clone(),
            index_in_block: 0,
        }),
        t0(),
    );

    assert!(actions.iter().any(|a| matches!(
        a,
        Action::RequestConfirmedTransaction(id) if *id == tx_id
    )));
    assert_eq!(sm.num_pending_blocks(), 1);
}

#[test]
fn get_block_is_answered_from_persistence() {
    let persistence = store();
    let mut sm = at_origin(persistence);
    let b1 = block(1, 1, 1);
    let s1 = origin_state().with_block(&b1).unwrap();
    sm.event_pending_block(b1.clone(), t0());
    let tx = anchor(&s1);
    sm.event_state_transaction(tx.clone(), t0());

    let actions = sm.event_peer_msg(2, &PeerMsg::GetBlock(GetBlockMsg { block_index: 1 }), t0());
    assert_eq!(actions.len(), 2);
    match &actions[0] {
        Action::SendToPeer {
            index: 2,
            msg: PeerMsg::BlockHeader(h),
        } => {
            assert_eq!(h.block_index, 1);
            assert_eq!(h.size, 1);
            assert_eq!(h.anchor_tx_id, tx.id());
        }
        other => panic!("unexpected action {:?}", other),
    }
    match &actions[1] {
        Action::SendToPeer {
            index: 2,
            msg: PeerMsg::StateUpdate(u),
        } => {
            assert_eq!(u.index_in_block, 0);
            assert_eq!(u.state_update, b1.state_updates[0]);
        }
        other => panic!("unexpected action {:?}", other),
    }

    // GetBlock does not count as evidence, and unknown blocks are ignored
    let actions = sm.event_peer_msg(2, &PeerMsg::GetBlock(GetBlockMsg { block_index: 8 }), t0());
    assert!(actions.is_empty());
    assert_eq!(sm.largest_evidenced_index(), 1);
}

#[test]
fn loaded_state_is_validated_without_reapplying() {
    let persistence = store();
    {
        let mut sm = at_origin(persistence.clone());
        let b1 = block(1, 1, 1);
        let s1 = origin_state().with_block(&b1).unwrap();
        sm.event_pending_block(b1, t0());
        sm.event_state_transaction(anchor(&s1), t0());
    }

    let mut sm = StateManager::new(params(0), Config::default().chain, persistence);
    sm.bootstrap(t0());
    assert_eq!(sm.solid_index(), Some(1));
    assert!(!sm.is_solid_state_valid());
    assert_eq!(sm.largest_evidenced_index(), 1);
    assert_eq!(sm.status(), SyncStatus::Waiting);

    let s1 = sm.solid_state().clone();
    let actions = sm.event_state_transaction(anchor(&s1), t0());
    assert_eq!(transitions(&actions), vec![&s1]);
    assert!(sm.is_solid_state_valid());
    assert_eq!(sm.solid_index(), Some(1));
}

#[test]
fn ping_is_answered_and_sent_periodically() {
    let mut sm = at_origin(store());
    let actions = sm.event_peer_msg(
        3,
        &PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
            block_index: 0,
            rsvp: true,
        }),
        t0(),
    );
    assert!(matches!(
        actions.as_slice(),
        [Action::SendToPeer {
            index: 3,
            msg: PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
                block_index: 0,
                rsvp: false
            })
        }]
    ));

    let is_ping = |a: &Action| {
        matches!(
            a,
            Action::Broadcast(PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
                rsvp: true,
                ..
            }))
        )
    };
    let period = Config::default().chain.ping_pong_period;
    assert!(sm.event_timer_tick(0, t0()).iter().any(is_ping));
    assert!(!sm
        .event_timer_tick(2, t0() + period / 2)
        .iter()
        .any(is_ping));
    assert!(sm.event_timer_tick(4, t0() + period).iter().any(is_ping));
}

#[test]
fn one_behind_without_candidate_syncs_after_deadline() {
    let mut sm = at_origin(store());
    let ping = PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
        block_index: 1,
        rsvp: false,
    });
    let actions = sm.event_peer_msg(1, &ping, t0());
    assert!(get_block_requests(&actions).is_empty());
    assert_eq!(sm.status(), SyncStatus::Synced);

    let deadline = Config::default().chain.pending_block_deadline;
    let actions = sm.event_timer_tick(2, t0() + deadline);
    assert_eq!(get_block_requests(&actions), vec![1]);
    assert_eq!(sm.status(), SyncStatus::Syncing);
}

struct FailingCommit;

impl StatePersistence for FailingCommit {
    fn load_solid_state(
        &self,
        _chain_id: &ChainId,
    ) -> Result<Option<(VirtualState, Block)>, StorageError> {
        Ok(None)
    }

    fn commit(&self, _state: &VirtualState, _block: &Block) -> Result<(), StorageError> {
        Err(StorageError::Backend("disk full".to_string()))
    }

    fn load_block(&self, _chain_id: &ChainId, _index: u32) -> Result<Option<Block>, StorageError> {
        Ok(None)
    }
}

#[test]
fn persistence_failure_dismisses_the_chain() {
    let mut sm = state_manager(Arc::new(FailingCommit));
    let actions = sm.event_state_transaction(anchor(&origin_state()), t0());

    assert!(matches!(actions.as_slice(), [Action::Dismiss(_)]));
    assert_eq!(sm.solid_index(), None);
}
