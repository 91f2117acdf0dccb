//! Configuration loaders. Every loader returns a [PartialConfig](crate::config::PartialConfig).

pub mod toml;
