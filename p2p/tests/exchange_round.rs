use std::time::{Duration, Instant, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use scchain_data_structures::{
    chain::ChainId,
    messages::{GetBlockMsg, PeerMsg},
};
use scchain_p2p::{
    error::ExchangeError,
    group::PeerGroup,
    local::LocalNetwork,
    network::{PeerMessage, PeerSender, RecvEvent},
};

fn committee() -> Vec<String> {
    (0..4).map(|i| format!("node{}", i)).collect()
}

fn group_of_node0() -> PeerGroup {
    let net = LocalNetwork::new();
    for id in committee() {
        net.node(&id);
    }

    PeerGroup::new(net.node("node0"), &committee()).unwrap()
}

fn reply_from(index: u16) -> RecvEvent {
    let msg = PeerMsg::GetBlock(GetBlockMsg { block_index: 1 });

    RecvEvent {
        from: format!("node{}", index),
        msg: PeerMessage::new(ChainId([1; 32]), &msg, SystemTime::now()).unwrap(),
    }
}

#[tokio::test]
async fn round_fails_listing_exactly_the_silent_target() {
    let group = group_of_node0();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut sends_to_silent = 0;

    let start = Instant::now();
    let result = group
        .exchange_round(
            &[1, 2, 3],
            3,
            &mut rx,
            Duration::from_millis(100),
            Duration::from_millis(500),
            &cancel,
            |idx, _peer: &dyn PeerSender| {
                // Peers 1 and 2 answer every request (so they also send duplicates on retries),
                // peer 3 never answers
                if idx == 3 {
                    sends_to_silent += 1;
                } else {
                    tx.send(reply_from(idx)).unwrap();
                }
            },
            |_idx, _ev| Ok(true),
        )
        .await;
    let elapsed = start.elapsed();

    assert_eq!(
        result,
        Err(ExchangeError::RoundTimeout {
            timeout: Duration::from_millis(500),
            unacked: vec![(3, "no response".to_string())],
        })
    );
    assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);
    // Initial send plus the retries
    assert!(sends_to_silent >= 3, "{}", sends_to_silent);
}

#[tokio::test]
async fn round_succeeds_when_every_target_acknowledges() {
    let group = group_of_node0();
    let (tx, mut rx) = mpsc::unbounded_channel();
    // A message from outside the committee is dropped without failing the round
    tx.send(RecvEvent {
        from: "intruder".to_string(),
        ..reply_from(1)
    })
    .unwrap();
    let cancel = CancellationToken::new();
    let mut received = vec![];

    let result = group
        .exchange_round(
            &[1, 2, 3],
            3,
            &mut rx,
            Duration::from_millis(100),
            Duration::from_secs(5),
            &cancel,
            |idx, _peer: &dyn PeerSender| tx.send(reply_from(idx)).unwrap(),
            |idx, _ev| {
                received.push(idx);
                Ok(true)
            },
        )
        .await;

    assert_eq!(result, Ok(()));
    received.sort_unstable();
    assert_eq!(received, vec![1, 2, 3]);
}

#[tokio::test]
async fn round_ends_once_enough_targets_acknowledge() {
    let group = group_of_node0();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut received = vec![];

    let start = Instant::now();
    let result = group
        .exchange_round(
            &[1, 2, 3],
            2,
            &mut rx,
            Duration::from_millis(100),
            Duration::from_secs(3),
            &cancel,
            |idx, _peer: &dyn PeerSender| {
                if idx != 3 {
                    tx.send(reply_from(idx)).unwrap();
                }
            },
            |idx, _ev| {
                received.push(idx);
                Ok(true)
            },
        )
        .await;

    assert_eq!(result, Ok(()));
    assert!(start.elapsed() < Duration::from_secs(1), "{:?}", start.elapsed());
    received.sort_unstable();
    assert_eq!(received, vec![1, 2]);
}

#[tokio::test]
async fn rejected_answers_do_not_count_towards_the_required_acks() {
    let group = group_of_node0();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let result = group
        .exchange_round(
            &[1, 2, 3],
            2,
            &mut rx,
            Duration::from_millis(50),
            Duration::from_millis(200),
            &cancel,
            |idx, _peer: &dyn PeerSender| tx.send(reply_from(idx)).unwrap(),
            |idx, _ev| {
                if idx == 1 {
                    Ok(true)
                } else {
                    Err("invalid share".to_string())
                }
            },
        )
        .await;

    assert_eq!(
        result,
        Err(ExchangeError::RoundTimeout {
            timeout: Duration::from_millis(200),
            unacked: vec![
                (2, "invalid share".to_string()),
                (3, "invalid share".to_string())
            ],
        })
    );
}

#[tokio::test]
async fn rejected_answers_are_reported() {
    let group = group_of_node0();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let result = group
        .exchange_round(
            &[1, 2],
            2,
            &mut rx,
            Duration::from_millis(50),
            Duration::from_millis(200),
            &cancel,
            |idx, _peer: &dyn PeerSender| tx.send(reply_from(idx)).unwrap(),
            |idx, _ev| {
                if idx == 2 {
                    Err("invalid share".to_string())
                } else {
                    Ok(true)
                }
            },
        )
        .await;

    assert_eq!(
        result,
        Err(ExchangeError::RoundTimeout {
            timeout: Duration::from_millis(200),
            unacked: vec![(2, "invalid share".to_string())],
        })
    );
}

#[tokio::test]
async fn cancelled_round_terminates_early() {
    let group = group_of_node0();
    let (_tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let result = group
        .exchange_round(
            &[1, 2, 3],
            3,
            &mut rx,
            Duration::from_millis(100),
            Duration::from_secs(10),
            &cancel,
            |_idx, _peer: &dyn PeerSender| {},
            |_idx, _ev| Ok(true),
        )
        .await;

    assert_eq!(result, Err(ExchangeError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn closed_channel_fails_the_round() {
    let group = group_of_node0();
    let (tx, mut rx) = mpsc::unbounded_channel::<RecvEvent>();
    drop(tx);
    let cancel = CancellationToken::new();

    let result = group
        .exchange_round(
            &[1],
            1,
            &mut rx,
            Duration::from_millis(100),
            Duration::from_secs(10),
            &cancel,
            |_idx, _peer: &dyn PeerSender| {},
            |_idx, _ev| Ok(true),
        )
        .await;

    assert_eq!(result, Err(ExchangeError::ChannelClosed));
}

#[tokio::test]
async fn target_outside_the_group() {
    let group = group_of_node0();
    let (_tx, mut rx) = mpsc::unbounded_channel();

    let result = group
        .exchange_round(
            &[1, 9],
            2,
            &mut rx,
            Duration::from_millis(100),
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_idx, _peer: &dyn PeerSender| {},
            |_idx, _ev| Ok(true),
        )
        .await;

    assert_eq!(result, Err(ExchangeError::InvalidTarget(9)));
}
