//! Data structures shared by the committee node crates: identifiers, the chain's virtual
//! state, anchoring transactions, request payloads and the peer wire messages.

#![deny(rust_2018_idioms)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

/// Identifiers, hashes and balances
pub mod chain;

/// Errors produced while decoding wire messages or applying blocks
pub mod error;

/// Peer wire messages
pub mod messages;

/// Fixed-size peer index bit-vector
pub mod peer_set;

/// Deterministic permutation of peer indices
pub mod permutation;

/// Request payloads and their arguments
pub mod request;

/// Virtual state, blocks and state updates
pub mod state;

/// Anchoring transaction
pub mod transaction;

/// Low level binary encoding helpers
pub mod wire;
