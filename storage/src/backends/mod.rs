//! # Storage backends
//!
//! Implementations of the [`Storage`](crate::storage::Storage) trait. The in-memory backend is
//! always available; RocksDB is behind the `rocksdb-backend` feature.

pub mod hashmap;
#[cfg(feature = "rocksdb-backend")]
pub mod rocksdb;
