//! Load the configuration from a file or a `String` written in [Toml format](https://en.wikipedia.org/wiki/TOML)

use std::{io, path::Path};

use thiserror::Error;

use crate::config::PartialConfig;

/// Errors loading the configuration.
///
/// Parsing the configuration from Toml might fail with a `toml::de::Error`, but loading that
/// configuration from a file might also fail with a `std::io::Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// Indicates there was an error when trying to load configuration from a file.
    #[error("cannot read configuration file: {0}")]
    IOError(#[from] io::Error),
    /// Indicates the Toml string is not a valid configuration.
    #[error("invalid configuration: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Just like `std::result::Result` but with the error param fixed to `Error` type in this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Load configuration from a file written in Toml format.
pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<PartialConfig> {
    let contents = read_file_contents(filename.as_ref())?;
    from_str(&contents)
}

#[cfg(not(test))]
fn read_file_contents(filename: &Path) -> io::Result<String> {
    std::fs::read_to_string(filename)
}

#[cfg(test)]
fn read_file_contents(_filename: &Path) -> io::Result<String> {
    Ok(String::new())
}

/// Load configuration from a string written in Toml format.
pub fn from_str(contents: &str) -> Result<PartialConfig> {
    Ok(toml::from_str(contents)?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::{Config, Environment, StorageBackend};

    #[test]
    fn test_load_empty_config() {
        let config = super::from_str("").unwrap();

        assert_eq!(Config::from_partial(&config), Config::default());
    }

    #[test]
    fn test_load_empty_config_from_file() {
        let config = super::from_file("some file name").unwrap();

        assert_eq!(Config::from_partial(&config), Config::default());
    }

    #[test]
    fn test_load_non_empty_config() {
        let config = super::from_str(
            r"
environment = 'production'
[log]
level = 'debug'
[storage]
backend = 'hashmap'
db_path = 'other-path'
[chain]
timer_tick_period_millis = 50
additional_connect_period_seconds = 1
notification_backlog_capacity = 10
[committee]
size = 7
quorum = 5
",
        )
        .unwrap();
        let config = Config::from_partial(&config);

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.log.level, log::LevelFilter::Debug);
        assert_eq!(config.storage.backend, StorageBackend::HashMap);
        assert_eq!(config.storage.db_path.to_str(), Some("other-path"));
        assert_eq!(config.chain.timer_tick_period, Duration::from_millis(50));
        assert_eq!(config.chain.additional_connect_period, Duration::from_secs(1));
        assert_eq!(config.chain.notification_backlog_capacity, 10);
        assert_eq!(config.committee.size, 7);
        assert_eq!(config.committee.quorum, 5);
        assert_eq!(config.committee.chains, 1);
    }

    #[test]
    fn test_load_incorrect_config() {
        let config = super::from_str(
            r"
[chain]
timer_tick_period_millis = 'not a number'
",
        );

        assert!(config.is_err());
    }
}
