//! Error type definitions for the Storage module.

use thiserror::Error;

/// Storage Errors while operating on a backend
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not be opened
    #[error("cannot open storage backend: {0}")]
    Connection(String),
    /// The backend failed to complete an operation
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A value could not be converted into bytes
    #[error("error when encoding value: {0}")]
    Encode(String),
    /// A stored value could not be converted back from bytes
    #[error("error when decoding value: {0}")]
    Decode(String),
}
