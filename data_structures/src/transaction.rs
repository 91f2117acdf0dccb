use serde::{Deserialize, Serialize};

use crate::chain::{ChainId, Hash, RequestId, TransactionId};

/// Transaction anchoring a chain state on the external ledger.
///
/// The committee signs the essence hash; the aggregated signature completes the transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTransaction {
    /// Chain being anchored
    pub chain_id: ChainId,
    /// Index of the anchored state
    pub state_index: u32,
    /// Hash of the anchored state
    pub state_hash: Hash,
    /// Timestamp of the batch producing the state
    pub timestamp: i64,
    /// Requests consumed by the transaction
    pub request_ids: Vec<RequestId>,
    /// Aggregated committee signature, once collected
    pub signature: Option<Vec<u8>>,
}

impl AnchorTransaction {
    /// Unsigned transaction
    pub fn new(
        chain_id: ChainId,
        state_index: u32,
        state_hash: Hash,
        timestamp: i64,
        request_ids: Vec<RequestId>,
    ) -> Self {
        AnchorTransaction {
            chain_id,
            state_index,
            state_hash,
            timestamp,
            request_ids,
            signature: None,
        }
    }

    /// Hash of everything except the signature. This is what committee members sign.
    pub fn essence_hash(&self) -> Hash {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(4 + self.request_ids.len());
        let index = self.state_index.to_be_bytes();
        let timestamp = self.timestamp.to_be_bytes();
        parts.push(self.chain_id.as_bytes());
        parts.push(&index);
        parts.push(self.state_hash.as_bytes());
        parts.push(&timestamp);
        parts.extend(self.request_ids.iter().map(RequestId::as_bytes));

        Hash::of_parts(&parts)
    }

    /// Whether the aggregated signature is present
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Ledger identifier of the transaction
    pub fn id(&self) -> TransactionId {
        let signature = self.signature.as_deref().unwrap_or_default();
        let h = Hash::of_parts(&[self.essence_hash().as_bytes(), signature]);

        TransactionId(h.0)
    }
}
