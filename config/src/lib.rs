//! # Configuration
//!
//! Loading and defaults of the node configuration: log level, storage backend, timings of the
//! chain protocol and the shape of the local committee.

#![deny(rust_2018_idioms)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(missing_docs)]

pub mod config;
pub mod defaults;
pub mod dirs;
pub mod loaders;

pub use crate::config::Config;
