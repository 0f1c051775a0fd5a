//! Error types for shoal configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use toml::de;

/// Errors that can occur when loading or processing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("failed to parse config file {path}: {source}")]
    ParseToml {
        /// Path to the file that could not be parsed.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: de::Error,
    },

    /// The listen address could not be parsed as a socket address.
    #[error("invalid listen address '{addr}'")]
    InvalidListenAddress {
        /// The offending address.
        addr: String,
    },

    /// A mapping uses a field name reserved by the index schema.
    #[error("mapping '{mapping}' uses reserved field name '{field}'")]
    ReservedField {
        /// Mapping section name.
        mapping: String,
        /// The reserved field name.
        field: String,
    },

    /// Failed to serialize the effective settings.
    #[error("failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),

    /// Failed to determine home directory.
    #[error("could not determine home directory")]
    NoHomeDirectory,
}
