//! # Node
//!
//! Replicated-state engine of a committee node: every chain run by the node is a
//! [`ChainActor`](actors::chain::ChainActor) driving a state manager and a consensus operator.

#![deny(rust_2018_idioms)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(missing_docs)]

/// Actors module
pub mod actors;

/// Interfaces of the services a chain talks to
pub mod collaborators;

/// Consensus operator
pub mod consensus;

/// Errors of the chain engine
pub mod error;

/// Chain registry
pub mod registry;

/// In-process implementations of the collaborators
pub mod simulation;

/// State manager
pub mod state_mngr;

/// Storage of the solid state
pub mod storage_mngr;

/// Utilities for actor behaviour
pub mod utils;
