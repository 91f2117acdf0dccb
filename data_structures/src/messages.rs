//! Messages exchanged between the members of a chain committee.
//!
//! Every message except [`TestTraceMsg`] starts with the big-endian index of the state it
//! refers to.

use crate::{
    chain::{AgentId, Balances, Hash, RequestId, TransactionId},
    error::WireError,
    permutation::valid_permutation,
    state::StateUpdate,
    wire::{
        read_balances, read_bool, read_bytes16, read_i64, read_u16, read_u32, read_vec,
        write_balances, write_bool, write_bytes16, write_i64, write_len, write_u16, write_u32,
        write_vec, Wire,
    },
};

/// Type code of [`StateIndexPingPongMsg`]
pub const MSG_STATE_INDEX_PING_PONG: u8 = 1;
/// Type code of [`NotifyReqMsg`]
pub const MSG_NOTIFY_REQUESTS: u8 = 2;
/// Type code of [`NotifyFinalResultPostedMsg`]
pub const MSG_NOTIFY_FINAL_RESULT_POSTED: u8 = 3;
/// Type code of [`StartProcessingBatchMsg`]
pub const MSG_START_PROCESSING_BATCH: u8 = 4;
/// Type code of [`SignedHashMsg`]
pub const MSG_SIGNED_HASH: u8 = 5;
/// Type code of [`GetBlockMsg`]
pub const MSG_GET_BLOCK: u8 = 6;
/// Type code of [`BlockHeaderMsg`]
pub const MSG_BLOCK_HEADER: u8 = 7;
/// Type code of [`StateUpdateMsg`]
pub const MSG_STATE_UPDATE: u8 = 8;
/// Type code of [`TestTraceMsg`]
pub const MSG_TEST_TRACE: u8 = 9;

/// Probe (`rsvp = true`) or answer carrying the sender's state index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateIndexPingPongMsg {
    pub block_index: u32,
    pub rsvp: bool,
}

/// Ids of the requests the sender is able to process, sent to the leader
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyReqMsg {
    pub block_index: u32,
    pub request_ids: Vec<RequestId>,
}

/// Sent by the leader after posting the anchoring transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyFinalResultPostedMsg {
    pub block_index: u32,
    pub tx_id: TransactionId,
}

/// Batch proposal from the leader. The batch timestamp travels in the message envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartProcessingBatchMsg {
    pub block_index: u32,
    pub request_ids: Vec<RequestId>,
    pub fee_destination: AgentId,
    pub balances: Balances,
}

/// Signature share over the essence of the anchoring transaction computed for a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHashMsg {
    pub block_index: u32,
    pub orig_timestamp: i64,
    pub batch_hash: Hash,
    pub essence_hash: Hash,
    pub sig_share: Vec<u8>,
}

/// Ask for the block with the given index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBlockMsg {
    pub block_index: u32,
}

/// First answer to [`GetBlockMsg`], announcing how many updates follow
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeaderMsg {
    pub block_index: u32,
    pub size: u16,
    pub anchor_tx_id: TransactionId,
}

/// One update of a block being synchronized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateUpdateMsg {
    pub block_index: u32,
    pub state_update: StateUpdate,
    pub index_in_block: u16,
}

/// Diagnostic message travelling through every peer of the committee once
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestTraceMsg {
    /// Unix nanoseconds when the initiator sent it
    pub init_time: i64,
    pub init_peer: u16,
    /// Order in which peers forward the message
    pub sequence: Vec<u16>,
    pub num_hops: u16,
}

impl Wire for StateIndexPingPongMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)?;
        write_bool(buf, self.rsvp)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(StateIndexPingPongMsg {
            block_index: read_u32(r, "block index")?,
            rsvp: read_bool(r, "rsvp")?,
        })
    }
}

impl Wire for NotifyReqMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)?;
        write_vec(buf, &self.request_ids, "request ids")
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(NotifyReqMsg {
            block_index: read_u32(r, "block index")?,
            request_ids: read_vec(r, "request ids")?,
        })
    }
}

impl Wire for NotifyFinalResultPostedMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)?;
        self.tx_id.write_to(buf)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(NotifyFinalResultPostedMsg {
            block_index: read_u32(r, "block index")?,
            tx_id: TransactionId::read_from(r)?,
        })
    }
}

impl Wire for StartProcessingBatchMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)?;
        write_vec(buf, &self.request_ids, "request ids")?;
        self.fee_destination.write_to(buf)?;
        write_balances(buf, &self.balances)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(StartProcessingBatchMsg {
            block_index: read_u32(r, "block index")?,
            request_ids: read_vec(r, "request ids")?,
            fee_destination: AgentId::read_from(r)?,
            balances: read_balances(r)?,
        })
    }
}

impl Wire for SignedHashMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)?;
        write_i64(buf, self.orig_timestamp)?;
        self.batch_hash.write_to(buf)?;
        self.essence_hash.write_to(buf)?;
        write_bytes16(buf, &self.sig_share, "signature share")
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(SignedHashMsg {
            block_index: read_u32(r, "block index")?,
            orig_timestamp: read_i64(r, "timestamp")?,
            batch_hash: Hash::read_from(r)?,
            essence_hash: Hash::read_from(r)?,
            sig_share: read_bytes16(r, "signature share")?,
        })
    }
}

impl Wire for GetBlockMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(GetBlockMsg {
            block_index: read_u32(r, "block index")?,
        })
    }
}

impl Wire for BlockHeaderMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)?;
        write_u16(buf, self.size)?;
        self.anchor_tx_id.write_to(buf)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(BlockHeaderMsg {
            block_index: read_u32(r, "block index")?,
            size: read_u16(r, "block size")?,
            anchor_tx_id: TransactionId::read_from(r)?,
        })
    }
}

impl Wire for StateUpdateMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_u32(buf, self.block_index)?;
        self.state_update.write_to(buf)?;
        write_u16(buf, self.index_in_block)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        Ok(StateUpdateMsg {
            block_index: read_u32(r, "block index")?,
            state_update: StateUpdate::read_from(r)?,
            index_in_block: read_u16(r, "index in block")?,
        })
    }
}

impl Wire for TestTraceMsg {
    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        write_i64(buf, self.init_time)?;
        write_u16(buf, self.init_peer)?;
        write_len(buf, self.sequence.len(), "trace sequence")?;
        for idx in &self.sequence {
            write_u16(buf, *idx)?;
        }
        write_u16(buf, self.num_hops)
    }

    fn read_from(r: &mut &[u8]) -> Result<Self, WireError> {
        let init_time = read_i64(r, "init time")?;
        let init_peer = read_u16(r, "init peer")?;
        let count = read_u16(r, "trace sequence")?;
        let sequence = (0..count)
            .map(|_| read_u16(r, "trace sequence"))
            .collect::<Result<Vec<_>, _>>()?;
        if !valid_permutation(&sequence) {
            return Err(WireError::InvalidPermutation(sequence));
        }
        let num_hops = read_u16(r, "hop count")?;

        Ok(TestTraceMsg {
            init_time,
            init_peer,
            sequence,
            num_hops,
        })
    }
}

/// Any committee message, tagged by its type code
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerMsg {
    StateIndexPingPong(StateIndexPingPongMsg),
    NotifyRequests(NotifyReqMsg),
    NotifyFinalResultPosted(NotifyFinalResultPostedMsg),
    StartProcessingBatch(StartProcessingBatchMsg),
    SignedHash(SignedHashMsg),
    GetBlock(GetBlockMsg),
    BlockHeader(BlockHeaderMsg),
    StateUpdate(StateUpdateMsg),
    TestTrace(TestTraceMsg),
}

impl PeerMsg {
    /// Type code sent in the message envelope
    pub fn msg_type(&self) -> u8 {
        match self {
            PeerMsg::StateIndexPingPong(_) => MSG_STATE_INDEX_PING_PONG,
            PeerMsg::NotifyRequests(_) => MSG_NOTIFY_REQUESTS,
            PeerMsg::NotifyFinalResultPosted(_) => MSG_NOTIFY_FINAL_RESULT_POSTED,
            PeerMsg::StartProcessingBatch(_) => MSG_START_PROCESSING_BATCH,
            PeerMsg::SignedHash(_) => MSG_SIGNED_HASH,
            PeerMsg::GetBlock(_) => MSG_GET_BLOCK,
            PeerMsg::BlockHeader(_) => MSG_BLOCK_HEADER,
            PeerMsg::StateUpdate(_) => MSG_STATE_UPDATE,
            PeerMsg::TestTrace(_) => MSG_TEST_TRACE,
        }
    }

    /// State index carried by the message, if any
    pub fn block_index(&self) -> Option<u32> {
        match self {
            PeerMsg::StateIndexPingPong(m) => Some(m.block_index),
            PeerMsg::NotifyRequests(m) => Some(m.block_index),
            PeerMsg::NotifyFinalResultPosted(m) => Some(m.block_index),
            PeerMsg::StartProcessingBatch(m) => Some(m.block_index),
            PeerMsg::SignedHash(m) => Some(m.block_index),
            PeerMsg::GetBlock(m) => Some(m.block_index),
            PeerMsg::BlockHeader(m) => Some(m.block_index),
            PeerMsg::StateUpdate(m) => Some(m.block_index),
            PeerMsg::TestTrace(_) => None,
        }
    }

    /// Encode the message body
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            PeerMsg::StateIndexPingPong(m) => m.to_wire(),
            PeerMsg::NotifyRequests(m) => m.to_wire(),
            PeerMsg::NotifyFinalResultPosted(m) => m.to_wire(),
            PeerMsg::StartProcessingBatch(m) => m.to_wire(),
            PeerMsg::SignedHash(m) => m.to_wire(),
            PeerMsg::GetBlock(m) => m.to_wire(),
            PeerMsg::BlockHeader(m) => m.to_wire(),
            PeerMsg::StateUpdate(m) => m.to_wire(),
            PeerMsg::TestTrace(m) => m.to_wire(),
        }
    }

    /// Decode a message body given the type code from its envelope
    pub fn decode(msg_type: u8, data: &[u8]) -> Result<Self, WireError> {
        let msg = match msg_type {
            MSG_STATE_INDEX_PING_PONG => {
                PeerMsg::StateIndexPingPong(StateIndexPingPongMsg::from_wire(data)?)
            }
            MSG_NOTIFY_REQUESTS => PeerMsg::NotifyRequests(NotifyReqMsg::from_wire(data)?),
            MSG_NOTIFY_FINAL_RESULT_POSTED => {
                PeerMsg::NotifyFinalResultPosted(NotifyFinalResultPostedMsg::from_wire(data)?)
            }
            MSG_START_PROCESSING_BATCH => {
                PeerMsg::StartProcessingBatch(StartProcessingBatchMsg::from_wire(data)?)
            }
            MSG_SIGNED_HASH => PeerMsg::SignedHash(SignedHashMsg::from_wire(data)?),
            MSG_GET_BLOCK => PeerMsg::GetBlock(GetBlockMsg::from_wire(data)?),
            MSG_BLOCK_HEADER => PeerMsg::BlockHeader(BlockHeaderMsg::from_wire(data)?),
            MSG_STATE_UPDATE => PeerMsg::StateUpdate(StateUpdateMsg::from_wire(data)?),
            MSG_TEST_TRACE => PeerMsg::TestTrace(TestTraceMsg::from_wire(data)?),
            other => return Err(WireError::UnknownMsgType(other)),
        };

        Ok(msg)
    }
}
