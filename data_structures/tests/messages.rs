use std::collections::BTreeMap;

use scchain_data_structures::{
    chain::{AgentId, Balance, Color, Hash, RequestId, TransactionId},
    error::WireError,
    messages::*,
    state::{Mutation, StateUpdate},
    wire::Wire,
};

#[test]
fn ping_pong_to_bytes() {
    let msg = PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
        block_index: 0x0102_0304,
        rsvp: true,
    });

    assert_eq!(msg.msg_type(), 1);
    assert_eq!(msg.encode().unwrap(), vec![1, 2, 3, 4, 1]);
}

#[test]
fn ping_pong_from_bytes() {
    let expected = PeerMsg::StateIndexPingPong(StateIndexPingPongMsg {
        block_index: 7,
        rsvp: false,
    });

    assert_eq!(PeerMsg::decode(1, &[0, 0, 0, 7, 0]).unwrap(), expected);
    // A boolean byte other than 0 or 1 is malformed
    assert_eq!(
        PeerMsg::decode(1, &[0, 0, 0, 7, 2]),
        Err(WireError::InvalidBool(2))
    );
}

#[test]
fn notify_requests_to_bytes() {
    let msg = NotifyReqMsg {
        block_index: 5,
        request_ids: vec![RequestId([0xaa; 16])],
    };
    let mut expected = vec![0, 0, 0, 5, 0, 1];
    expected.extend_from_slice(&[0xaa; 16]);

    assert_eq!(msg.to_wire().unwrap(), expected);
}

#[test]
fn notify_requests_empty_and_full() {
    // Zero-length request list
    let empty = PeerMsg::NotifyRequests(NotifyReqMsg {
        block_index: 0,
        request_ids: vec![],
    });
    let bytes = empty.encode().unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0]);
    assert_eq!(PeerMsg::decode(2, &bytes).unwrap(), empty);

    // One request per committee member in a large committee
    let full = PeerMsg::NotifyRequests(NotifyReqMsg {
        block_index: u32::MAX,
        request_ids: (0..=255u8).map(|i| RequestId([i; 16])).collect(),
    });
    let bytes = full.encode().unwrap();
    assert_eq!(bytes.len(), 4 + 2 + 256 * 16);
    assert_eq!(PeerMsg::decode(2, &bytes).unwrap(), full);
}

#[test]
fn start_processing_batch_with_balances() {
    let mut balances = BTreeMap::new();
    balances.insert(
        TransactionId([1; 32]),
        vec![
            Balance {
                color: Color([2; 32]),
                value: 100,
            },
            Balance {
                color: Color([3; 32]),
                value: -1,
            },
        ],
    );
    let msg = PeerMsg::StartProcessingBatch(StartProcessingBatchMsg {
        block_index: 9,
        request_ids: vec![RequestId([4; 16]), RequestId([5; 16])],
        fee_destination: AgentId([6; 37]),
        balances,
    });
    let bytes = msg.encode().unwrap();

    // index, 2 ids, agent, 1 txid with 2 colored balances
    assert_eq!(bytes.len(), 4 + 2 + 32 + 37 + 2 + 32 + 2 + 2 * 40);
    assert_eq!(PeerMsg::decode(4, &bytes).unwrap(), msg);
}

#[test]
fn signed_hash_from_bytes() {
    let mut bytes = vec![0, 0, 0, 3];
    bytes.extend_from_slice(&(-2i64).to_be_bytes());
    bytes.extend_from_slice(&[1; 32]);
    bytes.extend_from_slice(&[2; 32]);
    bytes.extend_from_slice(&[0, 3, 7, 8, 9]);

    let expected = PeerMsg::SignedHash(SignedHashMsg {
        block_index: 3,
        orig_timestamp: -2,
        batch_hash: Hash([1; 32]),
        essence_hash: Hash([2; 32]),
        sig_share: vec![7, 8, 9],
    });
    assert_eq!(PeerMsg::decode(5, &bytes).unwrap(), expected);

    // Missing the last byte of the signature share
    bytes.pop();
    assert_eq!(
        PeerMsg::decode(5, &bytes),
        Err(WireError::Truncated("signature share"))
    );
}

#[test]
fn block_sync_messages() {
    let header = PeerMsg::BlockHeader(BlockHeaderMsg {
        block_index: 12,
        size: 2,
        anchor_tx_id: TransactionId([8; 32]),
    });
    let bytes = header.encode().unwrap();
    assert_eq!(&bytes[..6], &[0, 0, 0, 12, 0, 2]);
    assert_eq!(PeerMsg::decode(7, &bytes).unwrap(), header);

    let update = PeerMsg::StateUpdate(StateUpdateMsg {
        block_index: 12,
        state_update: StateUpdate {
            request_id: RequestId([1; 16]),
            timestamp: 77,
            mutations: vec![
                Mutation::Set {
                    key: b"counter".to_vec(),
                    value: vec![1],
                },
                Mutation::Delete {
                    key: b"old".to_vec(),
                },
            ],
        },
        index_in_block: 1,
    });
    let bytes = update.encode().unwrap();
    assert_eq!(PeerMsg::decode(8, &bytes).unwrap(), update);

    let get = PeerMsg::GetBlock(GetBlockMsg { block_index: 12 });
    assert_eq!(get.encode().unwrap(), vec![0, 0, 0, 12]);
    assert_eq!(get.block_index(), Some(12));
}

#[test]
fn invalid_mutation_tag() {
    let mut bytes = vec![0, 0, 0, 1];
    bytes.extend_from_slice(&[1; 16]);
    bytes.extend_from_slice(&0i64.to_be_bytes());
    // One mutation with tag 3
    bytes.extend_from_slice(&[0, 1, 3]);

    assert_eq!(
        PeerMsg::decode(8, &bytes),
        Err(WireError::InvalidMutationTag(3))
    );
}

#[test]
fn test_trace_has_no_index_header() {
    let msg = PeerMsg::TestTrace(TestTraceMsg {
        init_time: 1,
        init_peer: 2,
        sequence: vec![2, 0, 1],
        num_hops: 1,
    });
    let bytes = msg.encode().unwrap();

    assert_eq!(msg.block_index(), None);
    assert_eq!(
        bytes,
        vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 2, 0, 3, 0, 2, 0, 0, 0, 1, 0, 1]
    );
    assert_eq!(PeerMsg::decode(9, &bytes).unwrap(), msg);
}

#[test]
fn test_trace_rejects_invalid_sequence() {
    let bytes = vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 1, 0, 1, 0, 0];

    assert_eq!(
        PeerMsg::decode(9, &bytes),
        Err(WireError::InvalidPermutation(vec![1, 1]))
    );
}

#[test]
fn unknown_message_type() {
    assert_eq!(PeerMsg::decode(0, &[]), Err(WireError::UnknownMsgType(0)));
    assert_eq!(
        PeerMsg::decode(42, &[1, 2]),
        Err(WireError::UnknownMsgType(42))
    );
}

#[test]
fn final_result_posted_truncated() {
    let bytes = [0u8, 0, 0, 1, 9, 9];

    assert_eq!(
        PeerMsg::decode(3, &bytes),
        Err(WireError::Truncated("transaction id"))
    );
}
