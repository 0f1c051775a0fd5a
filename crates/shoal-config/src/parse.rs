//! Configuration file parsing.
//!
//! Parses a `shoal.toml` file into an intermediate `RawConfig` structure
//! that preserves the optional nature of all fields before defaults are applied.

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use serde_with::{OneOrMany, serde_as};
#[cfg(test)]
use toml::de::Error as TomlError;

use crate::{ConfigError, FieldType};

/// Raw configuration as parsed directly from a TOML file.
///
/// All fields are optional so a partial file resolves against defaults.
/// This mirrors the TOML schema exactly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Server section.
    pub server: Option<RawServerSettings>,
    /// Client section.
    pub client: Option<RawClientSettings>,
    /// Search settings section.
    pub search: Option<RawSearchSettings>,
    /// Suggestion settings section.
    pub suggest: Option<RawSuggestSettings>,
    /// Field mappings: `default` or index tag -> field -> type.
    pub mapping: Option<BTreeMap<String, BTreeMap<String, FieldType>>>,
}

/// Raw server settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawServerSettings {
    /// Socket address the RPC service binds to.
    pub listen: Option<String>,
    /// Root directory for index data.
    pub data_dir: Option<String>,
    /// Route document writes through the worker queue.
    pub queue_mode: Option<bool>,
    /// Number of queue workers.
    pub queue_workers: Option<usize>,
    /// Capacity of each worker queue.
    pub queue_capacity: Option<usize>,
}

/// Raw client settings.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawClientSettings {
    /// Peer node addresses.
    /// Accepts either a single string or an array of strings.
    #[serde_as(as = "Option<OneOrMany<_>>")]
    pub nodes: Option<Vec<String>>,
    /// Seconds between node health probes.
    pub probe_interval_secs: Option<u64>,
    /// Capacity of each node's outbound queue.
    pub node_queue_capacity: Option<usize>,
    /// Number of request workers.
    pub request_workers: Option<usize>,
    /// Capacity of the shared request queue.
    pub request_capacity: Option<usize>,
    /// Transport timeout in seconds.
    pub rpc_timeout_secs: Option<u64>,
}

/// Raw search settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSearchSettings {
    /// Stemming language.
    pub stemmer: Option<String>,
    /// Candidate window for custom sorting.
    pub sort_window: Option<usize>,
}

/// Raw suggestion settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSuggestSettings {
    /// Capacity of the async suggestion queue.
    pub queue_capacity: Option<usize>,
}

/// Parses a configuration file from disk.
pub fn parse_config_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    parse_config_str(&contents, path)
}

/// Parses configuration from a TOML string.
///
/// The `path` parameter is used for error reporting.
pub fn parse_config_str(contents: &str, path: &Path) -> Result<RawConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses configuration from a TOML string without path context.
///
/// Useful for validating template content (tests only).
#[cfg(test)]
pub fn parse_config(contents: &str) -> Result<RawConfig, TomlError> {
    toml::from_str(contents)
}
