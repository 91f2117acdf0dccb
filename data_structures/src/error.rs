//! Error type definitions for the data structures crate.

use std::io;

use thiserror::Error;

/// Errors decoding or encoding peer wire messages
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The message ended before the field could be read
    #[error("unexpected end of message while reading {0}")]
    Truncated(&'static str),
    /// The message type code is not one of the known peer messages
    #[error("unknown peer message type {0}")]
    UnknownMsgType(u8),
    /// A boolean field holds something other than 0 or 1
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
    /// A state mutation has an unknown tag
    #[error("invalid mutation tag {0}")]
    InvalidMutationTag(u8),
    /// A collection or byte string does not fit in its u16 length prefix
    #[error("{what} is too long to be encoded ({len} items)")]
    TooLong {
        /// Field name
        what: &'static str,
        /// Actual length
        len: usize,
    },
    /// A trace sequence is not a permutation of the peer indices
    #[error("trace sequence is not a valid permutation: {0:?}")]
    InvalidPermutation(Vec<u16>),
    /// Underlying writer failed
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        WireError::Io(e.to_string())
    }
}

/// Errors applying blocks to a virtual state
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// Block does not extend the state by exactly one index
    #[error("block #{block} cannot be applied on top of state #{state}")]
    IndexMismatch {
        /// Index of the state
        state: u32,
        /// Index of the block
        block: u32,
    },
    /// First block applied to a pre-origin state must be the origin block
    #[error("the origin block must have index 0, got #{0}")]
    InvalidOrigin(u32),
}

/// Errors building a permutation of peer indices
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermutationError {
    /// The sequence does not contain every index in `0..size` exactly once
    #[error("sequence {sequence:?} is not a permutation of 0..{size}")]
    NotAPermutation {
        /// Expected size
        size: u16,
        /// Offending sequence
        sequence: Vec<u16>,
    },
}
