//! # Default per-environment values
//!
//! Every configuration param which is absent from the configuration file takes its value from
//! the [`Defaults`] implementation of the selected environment.
use std::{path::PathBuf, time::Duration};

use crate::config::StorageBackend;

/// Trait defining all the configuration params that have a suitable default value depending on
/// the environment.
pub trait Defaults {
    /// Default log level
    fn log_level(&self) -> log::LevelFilter {
        log::LevelFilter::Info
    }

    /// Default storage backend
    fn storage_backend(&self) -> StorageBackend {
        StorageBackend::HashMap
    }

    /// Default path for the database
    fn storage_db_path(&self) -> PathBuf;

    /// Period of the timer ticks fed into every chain
    fn chain_timer_tick_period(&self) -> Duration {
        Duration::from_millis(20)
    }

    /// Period of the committee connectivity check
    fn chain_quorum_poll_period(&self) -> Duration {
        Duration::from_millis(500)
    }

    /// Extra time given to slow peers after the quorum is connected
    fn chain_additional_connect_period(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Capacity of the inbound event queue of a chain
    fn chain_inbound_queue_capacity(&self) -> usize {
        100
    }

    /// Time a pending block waits for its anchoring transaction before it is requested
    fn chain_pending_block_deadline(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Period between block requests while syncing
    fn chain_sync_retry_period(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Period of the state index probes sent to the other peers
    fn chain_ping_pong_period(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Time without a started batch after which the next leader takes over
    fn chain_leader_rotation_period(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Resend period of the signature collection round
    fn chain_signature_retry_timeout(&self) -> Duration {
        Duration::from_millis(500)
    }

    /// Give up period of the signature collection round
    fn chain_signature_give_up_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Time to wait for the posted anchoring transaction to be confirmed
    fn chain_post_transaction_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Initial backoff before restarting a failed round
    fn chain_round_restart_backoff(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Maximum backoff before restarting a failed round
    fn chain_round_restart_backoff_max(&self) -> Duration {
        Duration::from_secs(8)
    }

    /// Maximum number of buffered request notifications
    fn chain_notification_backlog_capacity(&self) -> usize {
        1000
    }

    /// Number of peers of the local committee
    fn committee_size(&self) -> u16 {
        4
    }

    /// Quorum of the local committee
    fn committee_quorum(&self) -> u16 {
        3
    }

    /// Number of chains run by the local committee
    fn committee_chains(&self) -> u16 {
        1
    }
}

/// Struct that will implement all the development defaults
pub struct Development;

/// Struct that will implement all the production defaults
pub struct Production;

impl Defaults for Development {
    fn storage_db_path(&self) -> PathBuf {
        PathBuf::from(".scchain")
    }
}

impl Defaults for Production {
    fn storage_backend(&self) -> StorageBackend {
        StorageBackend::RocksDB
    }

    fn storage_db_path(&self) -> PathBuf {
        crate::dirs::data_dir()
    }

    fn chain_additional_connect_period(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn chain_signature_give_up_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}
