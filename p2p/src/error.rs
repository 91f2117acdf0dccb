//! Error type definitions for the p2p module.

use std::time::Duration;

use thiserror::Error;

use crate::network::NetId;

/// Errors forming or using a peer group
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PeeringError {
    /// The transport does not know the peer
    #[error("peer {0} not found")]
    PeerNotFound(NetId),
    /// The same network id appears twice in the committee
    #[error("duplicate node {0} in committee")]
    DuplicateNodes(NetId),
    /// A message came from someone outside of the committee
    #[error("message from unknown sender {0}")]
    UnknownSender(NetId),
    /// This node is not a member of the committee
    #[error("own network id {0} is not part of the committee")]
    NotInGroup(NetId),
}

/// Errors of an exchange round
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Some targets did not acknowledge before the give up timeout
    #[error("round timed out after {timeout:?}, not acknowledged: {}", format_unacked(.unacked))]
    RoundTimeout {
        /// Give up timeout of the round
        timeout: Duration,
        /// Peer index and last known reason of every unacknowledged target
        unacked: Vec<(u16, String)>,
    },
    /// The round was cancelled from outside
    #[error("round cancelled")]
    Cancelled,
    /// The channel delivering peer messages was closed
    #[error("receive channel closed")]
    ChannelClosed,
    /// A target is not a peer index of the group
    #[error("peer index {0} is not part of the group")]
    InvalidTarget(u16),
}

fn format_unacked(unacked: &[(u16, String)]) -> String {
    unacked
        .iter()
        .map(|(idx, reason)| format!("[{}:{}]", idx, reason))
        .collect::<Vec<_>>()
        .join(" ")
}
