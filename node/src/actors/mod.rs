/// Chain actor module
pub mod chain;

/// Module running system actor
pub mod node;

/// Actor messages module
pub mod messages;

/// Storage keys constants
pub mod storage_keys;
