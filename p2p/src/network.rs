use std::{sync::Arc, time::SystemTime};

use scchain_data_structures::{
    chain::{unix_nanos, ChainId},
    error::WireError,
    messages::PeerMsg,
};

/// Network identity of a node, e.g. its `host:port`
pub type NetId = String;

/// Handle returned by [`NetworkProvider::attach`]
pub type AttachId = u64;

/// Callback receiving the messages of one chain
pub type RecvCallback = Arc<dyn Fn(RecvEvent) + Send + Sync>;

/// Envelope of every message sent between committee members
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerMessage {
    /// Chain the message belongs to
    pub chain_id: ChainId,
    /// Unix nanoseconds at the sender
    pub timestamp: i64,
    /// Type code of the body
    pub msg_type: u8,
    /// Encoded body
    pub data: Vec<u8>,
}

impl PeerMessage {
    /// Wrap `msg` into an envelope stamped with `now`
    pub fn new(chain_id: ChainId, msg: &PeerMsg, now: SystemTime) -> Result<Self, WireError> {
        Ok(PeerMessage {
            chain_id,
            timestamp: unix_nanos(now),
            msg_type: msg.msg_type(),
            data: msg.encode()?,
        })
    }

    /// Decode the body
    pub fn decode(&self) -> Result<PeerMsg, WireError> {
        PeerMsg::decode(self.msg_type, &self.data)
    }
}

/// Message received from the network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecvEvent {
    /// Network id of the sender
    pub from: NetId,
    /// Envelope
    pub msg: PeerMessage,
}

/// Outbound side of the connection to one peer
pub trait PeerSender: Send + Sync {
    /// Network id of the peer
    fn net_id(&self) -> &str;

    /// Send without waiting for delivery. Failures are handled by the transport.
    fn send_msg(&self, msg: &PeerMessage);

    /// Whether the connection to the peer is up
    fn is_alive(&self) -> bool;
}

/// Transport shared by every chain of the node
pub trait NetworkProvider: Send + Sync {
    /// Network id of this node
    fn self_net_id(&self) -> &str;

    /// Connection to a peer
    fn peer_by_net_id(&self, net_id: &str) -> Option<Arc<dyn PeerSender>>;

    /// Deliver every message for `chain_id` to `callback`
    fn attach(&self, chain_id: ChainId, callback: RecvCallback) -> AttachId;

    /// Stop delivering messages to a callback
    fn detach(&self, attach_id: AttachId);
}
