//! Committee peering: transport contracts, the `PeerGroup` of a chain committee with its
//! request/acknowledge exchange rounds, and an in-process transport.
#![deny(rust_2018_idioms)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(missing_docs)]

/// Errors module
pub mod error;

/// Peer group of a committee
pub mod group;

/// In-process transport
pub mod local;

/// Transport contracts and message envelope
pub mod network;
