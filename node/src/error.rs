//! Errors of the chain engine

use thiserror::Error;

use scchain_data_structures::error::StateError;
use scchain_p2p::error::{ExchangeError, PeeringError};
use scchain_storage::error::StorageError;

/// Everything that can go wrong while operating a chain.
///
/// Only `CommitteeInconsistency` is ever returned to a caller; the other kinds are logged where
/// they happen and either dropped, retried or turned into a dismissal of the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The committee description does not match the local node
    #[error("committee inconsistency: {0}")]
    CommitteeInconsistency(String),
    /// The chain record is not marked as active
    #[error("chain {0} is not active")]
    NotActive(String),
    /// Message for a state index older than the current one
    #[error("stale message {msg} for state index {index}, current is {current}")]
    StaleMessage {
        /// Message type
        msg: &'static str,
        /// Index carried by the message
        index: u32,
        /// Current solid index
        current: u32,
    },
    /// Message from somebody outside of the committee
    #[error("unknown sender {0}")]
    UnknownSender(String),
    /// A signature round did not collect enough shares
    #[error("round timeout: {0}")]
    RoundTimeout(#[from] ExchangeError),
    /// The local state is behind the evidenced one
    #[error("sync gap: solid index {solid}, evidenced index {evidenced}")]
    SyncGap {
        /// Local solid index
        solid: u32,
        /// Largest index evidenced by peers
        evidenced: u32,
    },
    /// The solid state could not be read or written
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StorageError),
    /// A block could not be applied to the solid state
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] StateError),
    /// The virtual machine failed to run a batch
    #[error("vm error: {0}")]
    Vm(String),
    /// The ledger client failed
    #[error("ledger error: {0}")]
    Ledger(String),
    /// The threshold signer failed
    #[error("signer error: {0}")]
    Signer(String),
}

impl From<PeeringError> for ChainError {
    fn from(e: PeeringError) -> Self {
        ChainError::CommitteeInconsistency(e.to_string())
    }
}
