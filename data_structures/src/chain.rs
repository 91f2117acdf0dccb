use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length in bytes of every hash used by the chain
pub const HASH_LENGTH: usize = 32;

/// Length in bytes of a request identifier
pub const REQUEST_ID_LENGTH: usize = 16;

/// Length in bytes of an agent identifier
pub const AGENT_ID_LENGTH: usize = 37;

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Raw bytes
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// First 8 hex characters, used in log lines
            pub fn short(&self) -> String {
                let mut s = hex::encode(&self.0);
                s.truncate(8);
                s
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(x: [u8; $len]) -> Self {
                Self(x)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }
    };
}

fixed_bytes!(
    /// SHA-256 digest
    Hash,
    HASH_LENGTH
);

fixed_bytes!(
    /// Identifier of a chain, i.e. of the committee operating it
    ChainId,
    HASH_LENGTH
);

fixed_bytes!(
    /// Identifier of a transaction on the external ledger
    TransactionId,
    HASH_LENGTH
);

fixed_bytes!(
    /// Token color
    Color,
    HASH_LENGTH
);

fixed_bytes!(
    /// Unique identifier of a pending request
    RequestId,
    REQUEST_ID_LENGTH
);

impl Hash {
    /// Hash of a single byte slice
    pub fn of(data: &[u8]) -> Self {
        Self::of_parts(&[data])
    }

    /// Hash of the concatenation of several byte slices
    pub fn of_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(hasher.finalize().into())
    }
}

/// Identifier of the agent which receives the fees of a batch.
///
/// Serde does not cover arrays of this length, so the type stays out of anything persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub [u8; AGENT_ID_LENGTH]);

impl Default for AgentId {
    fn default() -> Self {
        AgentId([0; AGENT_ID_LENGTH])
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", hex::encode(&self.0[..4]))
    }
}

/// Amount of tokens of one color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Token color
    pub color: Color,
    /// Amount
    pub value: i64,
}

/// Colored balances of the chain address, grouped by the output transaction holding them
pub type Balances = BTreeMap<TransactionId, Vec<Balance>>;

/// Nanoseconds since the unix epoch, saturating. Times before the epoch map to 0.
pub fn unix_nanos(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Inverse of [`unix_nanos`]
pub fn from_unix_nanos(nanos: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_of_parts_equals_hash_of_concatenation() {
        let joined = Hash::of(b"helloworld");
        let parts = Hash::of_parts(&[b"hello", b"world"]);
        assert_eq!(joined, parts);
        assert_ne!(joined, Hash::of(b"hello"));
    }

    #[test]
    fn short_ids_are_eight_hex_chars() {
        let id = ChainId([0xab; HASH_LENGTH]);
        assert_eq!(id.short(), "abababab");
        assert_eq!(id.to_string().len(), 64);
    }

    #[test]
    fn unix_nanos_conversion() {
        let t = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(unix_nanos(t), 1_500_000_000);
        assert_eq!(from_unix_nanos(1_500_000_000), t);
        assert_eq!(unix_nanos(UNIX_EPOCH - Duration::from_secs(1)), 0);
    }
}
