//! # Config
//!
//! This module contains the `Config` struct, which holds all the configuration params of the
//! node. The `Config` struct is __total__: it contains every field needed by the rest of the
//! application. The loaders return a __partial__ config instead, where every field is optional
//! and missing ones take the default value of the selected environment
//! ([defaults](crate::defaults)). Use `Config::from_partial` to go from one to the other.
//!
//! ```
//! use scchain_config::config::{Config, PartialConfig};
//!
//! let config = Config::from_partial(&PartialConfig::default());
//! assert_eq!(config, Config::default());
//! ```
use std::{path::PathBuf, str::FromStr, time::Duration};

use log::warn;
use serde::{Deserialize, Deserializer};

use crate::defaults::{Defaults, Development, Production};

/// Environment selecting the set of defaults
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum Environment {
    /// Local committees, in-memory storage
    #[default]
    #[serde(rename = "development")]
    Development,
    /// Persistent storage, longer timeouts
    #[serde(rename = "production")]
    Production,
}

/// The total configuration object
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Environment the defaults were taken from
    pub environment: Environment,
    /// Logging
    pub log: Log,
    /// Storage backend
    pub storage: Storage,
    /// Timings and limits of every chain
    pub chain: Chain,
    /// Shape of the committee run by the local runner
    pub committee: Committee,
}

/// Partial version of [`Config`], as read from a configuration file
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PartialConfig {
    /// Environment
    #[serde(default)]
    pub environment: Environment,
    /// Logging
    #[serde(default)]
    pub log: PartialLog,
    /// Storage backend
    #[serde(default)]
    pub storage: PartialStorage,
    /// Chain timings
    #[serde(default)]
    pub chain: PartialChain,
    /// Local committee
    #[serde(default)]
    pub committee: PartialCommittee,
}

/// Log-specific configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Log {
    /// Level for the crates of the node
    pub level: log::LevelFilter,
}

/// Partial version of [`Log`]
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PartialLog {
    /// Level name: off, error, warn, info, debug, trace
    pub level: Option<String>,
}

/// Available storage backends
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-memory, lost on exit
    #[serde(rename = "hashmap")]
    HashMap,
    /// On-disk RocksDB database
    #[serde(rename = "rocksdb")]
    RocksDB,
}

/// Storage-specific configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Storage {
    /// Storage backend to use
    pub backend: StorageBackend,
    /// Path to the directory that will contain the database. Used only if backend is RocksDB.
    pub db_path: PathBuf,
}

/// Partial version of [`Storage`]
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PartialStorage {
    /// Storage backend to use
    pub backend: Option<StorageBackend>,
    /// Path to the database directory
    pub db_path: Option<PathBuf>,
}

/// Timings and limits of the chain protocol
#[derive(Clone, Debug, PartialEq)]
pub struct Chain {
    /// Period of the timer ticks
    pub timer_tick_period: Duration,
    /// Period of the connectivity check
    pub quorum_poll_period: Duration,
    /// Grace period after the quorum of peers is connected
    pub additional_connect_period: Duration,
    /// Capacity of the inbound event queue
    pub inbound_queue_capacity: usize,
    /// Time a pending block waits for its anchoring transaction
    pub pending_block_deadline: Duration,
    /// Period between block requests while syncing
    pub sync_retry_period: Duration,
    /// Period of the state index probes
    pub ping_pong_period: Duration,
    /// Leadership timeout
    pub leader_rotation_period: Duration,
    /// Resend period of the signature round
    pub signature_retry_timeout: Duration,
    /// Give up period of the signature round
    pub signature_give_up_timeout: Duration,
    /// Time to wait for a posted transaction to be confirmed
    pub post_transaction_timeout: Duration,
    /// Initial backoff before restarting a failed round
    pub round_restart_backoff: Duration,
    /// Maximum backoff before restarting a failed round
    pub round_restart_backoff_max: Duration,
    /// Maximum number of buffered notifications
    pub notification_backlog_capacity: usize,
}

/// Partial version of [`Chain`]. Durations are written as integer milliseconds or seconds.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PartialChain {
    /// Period of the timer ticks
    #[serde(default, deserialize_with = "from_millis", rename = "timer_tick_period_millis")]
    pub timer_tick_period: Option<Duration>,
    /// Period of the connectivity check
    #[serde(default, deserialize_with = "from_millis", rename = "quorum_poll_period_millis")]
    pub quorum_poll_period: Option<Duration>,
    /// Grace period after quorum
    #[serde(
        default,
        deserialize_with = "from_secs",
        rename = "additional_connect_period_seconds"
    )]
    pub additional_connect_period: Option<Duration>,
    /// Capacity of the inbound event queue
    pub inbound_queue_capacity: Option<usize>,
    /// Pending block deadline
    #[serde(
        default,
        deserialize_with = "from_secs",
        rename = "pending_block_deadline_seconds"
    )]
    pub pending_block_deadline: Option<Duration>,
    /// Period between block requests
    #[serde(default, deserialize_with = "from_millis", rename = "sync_retry_period_millis")]
    pub sync_retry_period: Option<Duration>,
    /// Period of the state index probes
    #[serde(default, deserialize_with = "from_secs", rename = "ping_pong_period_seconds")]
    pub ping_pong_period: Option<Duration>,
    /// Leadership timeout
    #[serde(
        default,
        deserialize_with = "from_millis",
        rename = "leader_rotation_period_millis"
    )]
    pub leader_rotation_period: Option<Duration>,
    /// Resend period of the signature round
    #[serde(
        default,
        deserialize_with = "from_millis",
        rename = "signature_retry_timeout_millis"
    )]
    pub signature_retry_timeout: Option<Duration>,
    /// Give up period of the signature round
    #[serde(
        default,
        deserialize_with = "from_millis",
        rename = "signature_give_up_timeout_millis"
    )]
    pub signature_give_up_timeout: Option<Duration>,
    /// Confirmation timeout of posted transactions
    #[serde(
        default,
        deserialize_with = "from_secs",
        rename = "post_transaction_timeout_seconds"
    )]
    pub post_transaction_timeout: Option<Duration>,
    /// Initial round restart backoff
    #[serde(
        default,
        deserialize_with = "from_millis",
        rename = "round_restart_backoff_millis"
    )]
    pub round_restart_backoff: Option<Duration>,
    /// Maximum round restart backoff
    #[serde(
        default,
        deserialize_with = "from_millis",
        rename = "round_restart_backoff_max_millis"
    )]
    pub round_restart_backoff_max: Option<Duration>,
    /// Maximum number of buffered notifications
    pub notification_backlog_capacity: Option<usize>,
}

/// Committee run by the local runner
#[derive(Clone, Debug, PartialEq)]
pub struct Committee {
    /// Number of peers
    pub size: u16,
    /// Quorum
    pub quorum: u16,
    /// Number of chains
    pub chains: u16,
}

/// Partial version of [`Committee`]
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PartialCommittee {
    /// Number of peers
    pub size: Option<u16>,
    /// Quorum
    pub quorum: Option<u16>,
    /// Number of chains
    pub chains: Option<u16>,
}

fn from_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Duration::from_millis(u64::deserialize(deserializer)?)))
}

fn from_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Duration::from_secs(u64::deserialize(deserializer)?)))
}

impl Default for Config {
    fn default() -> Self {
        Config::from_partial(&PartialConfig::default())
    }
}

impl Config {
    /// Fill the missing fields of `config` with the defaults of its environment
    pub fn from_partial(config: &PartialConfig) -> Self {
        let defaults: &dyn Defaults = match config.environment {
            Environment::Development => &Development,
            Environment::Production => &Production,
        };

        Config {
            environment: config.environment,
            log: Log::from_partial(&config.log, defaults),
            storage: Storage::from_partial(&config.storage, defaults),
            chain: Chain::from_partial(&config.chain, defaults),
            committee: Committee::from_partial(&config.committee, defaults),
        }
    }
}

impl Log {
    /// Total log config from a partial one
    pub fn from_partial(config: &PartialLog, defaults: &dyn Defaults) -> Self {
        let level = match &config.level {
            None => defaults.log_level(),
            Some(name) => log::LevelFilter::from_str(name).unwrap_or_else(|_| {
                warn!(
                    "Unknown log level {:?}, using {}",
                    name,
                    defaults.log_level()
                );
                defaults.log_level()
            }),
        };

        Log { level }
    }
}

impl Storage {
    /// Total storage config from a partial one
    pub fn from_partial(config: &PartialStorage, defaults: &dyn Defaults) -> Self {
        Storage {
            backend: config.backend.unwrap_or_else(|| defaults.storage_backend()),
            db_path: config
                .db_path
                .to_owned()
                .unwrap_or_else(|| defaults.storage_db_path()),
        }
    }
}

impl Chain {
    /// Total chain config from a partial one
    pub fn from_partial(config: &PartialChain, defaults: &dyn Defaults) -> Self {
        let chain = Chain {
            timer_tick_period: config
                .timer_tick_period
                .unwrap_or_else(|| defaults.chain_timer_tick_period()),
            quorum_poll_period: config
                .quorum_poll_period
                .unwrap_or_else(|| defaults.chain_quorum_poll_period()),
            additional_connect_period: config
                .additional_connect_period
                .unwrap_or_else(|| defaults.chain_additional_connect_period()),
            inbound_queue_capacity: config
                .inbound_queue_capacity
                .unwrap_or_else(|| defaults.chain_inbound_queue_capacity()),
            pending_block_deadline: config
                .pending_block_deadline
                .unwrap_or_else(|| defaults.chain_pending_block_deadline()),
            sync_retry_period: config
                .sync_retry_period
                .unwrap_or_else(|| defaults.chain_sync_retry_period()),
            ping_pong_period: config
                .ping_pong_period
                .unwrap_or_else(|| defaults.chain_ping_pong_period()),
            leader_rotation_period: config
                .leader_rotation_period
                .unwrap_or_else(|| defaults.chain_leader_rotation_period()),
            signature_retry_timeout: config
                .signature_retry_timeout
                .unwrap_or_else(|| defaults.chain_signature_retry_timeout()),
            signature_give_up_timeout: config
                .signature_give_up_timeout
                .unwrap_or_else(|| defaults.chain_signature_give_up_timeout()),
            post_transaction_timeout: config
                .post_transaction_timeout
                .unwrap_or_else(|| defaults.chain_post_transaction_timeout()),
            round_restart_backoff: config
                .round_restart_backoff
                .unwrap_or_else(|| defaults.chain_round_restart_backoff()),
            round_restart_backoff_max: config
                .round_restart_backoff_max
                .unwrap_or_else(|| defaults.chain_round_restart_backoff_max()),
            notification_backlog_capacity: config
                .notification_backlog_capacity
                .unwrap_or_else(|| defaults.chain_notification_backlog_capacity()),
        };

        if chain.round_restart_backoff_max < chain.round_restart_backoff {
            warn!(
                "round_restart_backoff_max ({:?}) is lower than round_restart_backoff ({:?})",
                chain.round_restart_backoff_max, chain.round_restart_backoff
            );
        }

        chain
    }
}

impl Committee {
    /// Total committee config from a partial one
    pub fn from_partial(config: &PartialCommittee, defaults: &dyn Defaults) -> Self {
        Committee {
            size: config.size.unwrap_or_else(|| defaults.committee_size()),
            quorum: config.quorum.unwrap_or_else(|| defaults.committee_quorum()),
            chains: config.chains.unwrap_or_else(|| defaults.committee_chains()),
        }
    }
}
