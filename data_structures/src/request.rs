use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::chain::{Hash, RequestId, TransactionId};

/// Argument of a request, either carried inline or referenced by the hash of a blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgValue {
    /// Value carried by the request itself
    Inline(Vec<u8>),
    /// Hash of a blob which must be fetched before the request can run
    Blob(Hash),
}

/// Named arguments as sent by the requester
pub type RequestArgs = BTreeMap<String, ArgValue>;

/// Arguments with every blob reference resolved
pub type SolidArgs = BTreeMap<String, Vec<u8>>;

/// Resolve every blob reference in `args` through `lookup`.
///
/// Returns `None` if at least one blob is not available yet.
pub fn solidify<F>(args: &RequestArgs, mut lookup: F) -> Option<SolidArgs>
where
    F: FnMut(&Hash) -> Option<Vec<u8>>,
{
    args.iter()
        .map(|(name, value)| {
            let data = match value {
                ArgValue::Inline(data) => data.clone(),
                ArgValue::Blob(hash) => lookup(hash)?,
            };
            Some((name.clone(), data))
        })
        .collect()
}

/// Request as known from its sending transaction on the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Request identifier
    pub request_id: RequestId,
    /// Ledger transaction carrying the request
    pub sender_tx: TransactionId,
    /// Unix seconds before which the request may not run. Zero means no timelock.
    pub timelock: u32,
    /// Arguments
    pub args: RequestArgs,
}

impl RequestPayload {
    /// Whether the request cannot be processed yet at `now`
    pub fn is_time_locked(&self, now: SystemTime) -> bool {
        self.timelock != 0 && now < UNIX_EPOCH + Duration::from_secs(u64::from(self.timelock))
    }
}

/// Hash identifying a batch proposal: the request ids, the batch timestamp and its leader
pub fn batch_hash(request_ids: &[RequestId], timestamp: i64, leader: u16) -> Hash {
    let mut buf = Vec::with_capacity(request_ids.len() * 16 + 10);
    for id in request_ids {
        buf.extend_from_slice(id.as_bytes());
    }
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&leader.to_be_bytes());

    Hash::of(&buf)
}

/// Derive a request id from the transaction carrying it and the position inside it
pub fn request_id_from(sender_tx: &TransactionId, output_index: u16) -> RequestId {
    let h = Hash::of_parts(&[sender_tx.as_bytes(), &output_index.to_be_bytes()[..]]);
    let mut id = [0; 16];
    id.copy_from_slice(&h.0[..16]);

    RequestId(id)
}

/// Encoded list of request ids, used when logging batches
pub fn request_ids_short(ids: &[RequestId]) -> String {
    let strs: Vec<String> = ids.iter().map(RequestId::short).collect();

    format!("[{}]", strs.join(", "))
}
