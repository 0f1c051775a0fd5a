//! Configuration system for shoal.
//!
//! shoal reads a single TOML file named `shoal.toml`. Every field is optional; the
//! file is parsed into `Raw*` structures and then resolved against defaults into a
//! [`Config`]. Field mappings describe how document fields are indexed, either for
//! every index (`[mapping.default]`) or for one index tag (`[mapping.<tag>]`).

#![warn(missing_docs)]

mod discovery;
mod error;
mod parse;
mod resolve;
mod templates;
#[cfg(test)]
mod test_support;
mod validate;

use std::{
    collections::BTreeMap,
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

pub use discovery::{CONFIG_FILENAME, discover_config_file, global_config_path};
pub use error::ConfigError;
pub use parse::{
    RawClientSettings, RawConfig, RawSearchSettings, RawServerSettings, RawSuggestSettings,
    parse_config_file, parse_config_str,
};
pub use resolve::resolve_data_dir;
use serde::{Deserialize, Serialize};
pub use templates::config_template;
pub use validate::ConfigWarning;
use validate::validate_config;

/// Field names the index schema reserves for its own use.
pub const RESERVED_FIELDS: [&str; 3] = ["_id", "_source", "_all"];

/// Mapping section that applies to every index tag.
pub const DEFAULT_MAPPING: &str = "default";

/// How a document field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Analyzed full text with positions.
    Text,
    /// Exact, untokenized string.
    Keyword,
    /// 64-bit float.
    F64,
    /// 64-bit signed integer.
    I64,
    /// RFC 3339 timestamp.
    Date,
    /// Boolean.
    Bool,
    /// Geographic point with `lat` and `lon`.
    Geo,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Keyword => "keyword",
            Self::F64 => "f64",
            Self::I64 => "i64",
            Self::Date => "date",
            Self::Bool => "bool",
            Self::Geo => "geo",
        };
        f.write_str(name)
    }
}

/// Field name to type for one index.
pub type Mapping = BTreeMap<String, FieldType>;

/// Top-level resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Server settings.
    pub server: ServerSettings,
    /// Client settings.
    pub client: ClientSettings,
    /// Search-related settings.
    pub search: SearchSettings,
    /// Suggestion settings.
    pub suggest: SuggestSettings,
    /// Field mappings.
    pub mappings: Mappings,
    /// Directory containing the loaded config file, if any.
    pub config_root: Option<PathBuf>,
    /// Warnings raised while applying defaults.
    resolve_warnings: Vec<ConfigWarning>,
}

impl Config {
    /// Loads configuration from an explicit path, the working directory, or the
    /// per-user config dir, in that order.
    ///
    /// Returns `Ok(Config::default())` if no configuration file is found.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        match discover_config_file(explicit, cwd) {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = parse_config_file(path)?;
        let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_raw(raw, config_dir)
    }

    /// Resolves a raw configuration against defaults.
    ///
    /// Relative paths are resolved against `config_dir`.
    pub fn from_raw(raw: RawConfig, config_dir: &Path) -> Result<Self, ConfigError> {
        let mut warnings = Vec::new();
        let server =
            ServerSettings::resolve(raw.server.unwrap_or_default(), config_dir, &mut warnings)?;
        let client = ClientSettings::resolve(raw.client.unwrap_or_default(), &mut warnings);
        let search = SearchSettings::resolve(raw.search.unwrap_or_default());
        let suggest = SuggestSettings::resolve(raw.suggest.unwrap_or_default(), &mut warnings);
        let mappings = Mappings::resolve(raw.mapping.unwrap_or_default())?;

        Ok(Self {
            server,
            client,
            search,
            suggest,
            mappings,
            config_root: Some(config_dir.to_path_buf()),
            resolve_warnings: warnings,
        })
    }

    /// Validates the configuration and returns any warnings.
    ///
    /// This includes values that were clamped while resolving defaults.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = self.resolve_warnings.clone();
        warnings.extend(validate_config(self));
        warnings
    }

    /// Serializes the effective settings to TOML format.
    pub fn settings_to_toml(&self) -> Result<String, ConfigError> {
        let mut mapping = BTreeMap::new();
        mapping.insert(DEFAULT_MAPPING.to_string(), self.mappings.default.clone());
        for (tag, fields) in &self.mappings.tags {
            mapping.insert(tag.clone(), fields.clone());
        }
        let serializable = SerializableSettings {
            server: &self.server,
            client: &self.client,
            search: &self.search,
            suggest: &self.suggest,
            mapping,
        };
        toml::to_string_pretty(&serializable).map_err(ConfigError::Serialize)
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSettings {
    /// Address the RPC service binds to.
    pub listen: SocketAddr,
    /// Root directory for index data.
    pub data_dir: PathBuf,
    /// Route document writes through the worker queue.
    pub queue_mode: bool,
    /// Number of queue workers.
    pub queue_workers: usize,
    /// Capacity of each worker queue.
    pub queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 6060)),
            data_dir: PathBuf::from("data"),
            queue_mode: false,
            queue_workers: 4,
            queue_capacity: 1024,
        }
    }
}

impl ServerSettings {
    /// Applies defaults to raw server settings.
    fn resolve(
        raw: RawServerSettings,
        config_dir: &Path,
        warnings: &mut Vec<ConfigWarning>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let listen = match raw.listen {
            Some(addr) => addr
                .parse()
                .map_err(|_| ConfigError::InvalidListenAddress { addr })?,
            None => defaults.listen,
        };
        let data_dir = match raw.data_dir {
            Some(dir) => resolve_data_dir(&dir, config_dir)?,
            None => config_dir.join(defaults.data_dir),
        };
        Ok(Self {
            listen,
            data_dir,
            queue_mode: raw.queue_mode.unwrap_or(defaults.queue_mode),
            queue_workers: at_least_one(
                "server.queue_workers",
                raw.queue_workers.unwrap_or(defaults.queue_workers),
                warnings,
            ),
            queue_capacity: at_least_one(
                "server.queue_capacity",
                raw.queue_capacity.unwrap_or(defaults.queue_capacity),
                warnings,
            ),
        })
    }
}

/// Client settings.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSettings {
    /// Peer node addresses.
    pub nodes: Vec<String>,
    /// Seconds between node health probes.
    pub probe_interval_secs: u64,
    /// Capacity of each node's outbound queue.
    pub node_queue_capacity: usize,
    /// Number of request workers.
    pub request_workers: usize,
    /// Capacity of the shared request queue.
    pub request_capacity: usize,
    /// Transport timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            probe_interval_secs: 3,
            node_queue_capacity: 1024,
            request_workers: 4,
            request_capacity: 1024,
            rpc_timeout_secs: 10,
        }
    }
}

impl ClientSettings {
    /// Applies defaults to raw client settings.
    fn resolve(raw: RawClientSettings, warnings: &mut Vec<ConfigWarning>) -> Self {
        let defaults = Self::default();
        Self {
            nodes: raw.nodes.unwrap_or(defaults.nodes),
            probe_interval_secs: at_least_one(
                "client.probe_interval_secs",
                raw.probe_interval_secs.unwrap_or(defaults.probe_interval_secs),
                warnings,
            ),
            node_queue_capacity: at_least_one(
                "client.node_queue_capacity",
                raw.node_queue_capacity
                    .unwrap_or(defaults.node_queue_capacity),
                warnings,
            ),
            request_workers: at_least_one(
                "client.request_workers",
                raw.request_workers.unwrap_or(defaults.request_workers),
                warnings,
            ),
            request_capacity: at_least_one(
                "client.request_capacity",
                raw.request_capacity.unwrap_or(defaults.request_capacity),
                warnings,
            ),
            rpc_timeout_secs: at_least_one(
                "client.rpc_timeout_secs",
                raw.rpc_timeout_secs.unwrap_or(defaults.rpc_timeout_secs),
                warnings,
            ),
        }
    }

    /// Returns the probe interval as a duration.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Returns the transport timeout as a duration.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Search-related settings.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSettings {
    /// Stemming language.
    pub stemmer: String,
    /// Candidate window for custom multi-field sorting.
    pub sort_window: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            stemmer: String::from("english"),
            sort_window: 1000,
        }
    }
}

impl SearchSettings {
    /// Applies defaults to raw search settings.
    fn resolve(raw: RawSearchSettings) -> Self {
        let defaults = Self::default();
        Self {
            stemmer: raw.stemmer.unwrap_or(defaults.stemmer),
            sort_window: raw.sort_window.unwrap_or(defaults.sort_window),
        }
    }
}

/// Suggestion settings.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestSettings {
    /// Capacity of the async suggestion queue.
    pub queue_capacity: usize,
}

impl Default for SuggestSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl SuggestSettings {
    /// Applies defaults to raw suggestion settings.
    fn resolve(raw: RawSuggestSettings, warnings: &mut Vec<ConfigWarning>) -> Self {
        Self {
            queue_capacity: at_least_one(
                "suggest.queue_capacity",
                raw.queue_capacity.unwrap_or(Self::default().queue_capacity),
                warnings,
            ),
        }
    }
}

/// Field mappings for all indexes.
#[derive(Debug, Clone, Default)]
pub struct Mappings {
    /// Mapping applied to every tag.
    pub default: Mapping,
    /// Per-tag mappings layered over the default.
    pub tags: BTreeMap<String, Mapping>,
}

impl Mappings {
    /// Splits raw mapping sections into the default and per-tag mappings.
    fn resolve(mut raw: BTreeMap<String, Mapping>) -> Result<Self, ConfigError> {
        for (section, fields) in &raw {
            if let Some(field) = fields
                .keys()
                .find(|field| RESERVED_FIELDS.contains(&field.as_str()))
            {
                return Err(ConfigError::ReservedField {
                    mapping: section.clone(),
                    field: field.clone(),
                });
            }
        }
        let default = raw.remove(DEFAULT_MAPPING).unwrap_or_default();
        Ok(Self { default, tags: raw })
    }

    /// Returns the effective mapping for an index tag.
    ///
    /// Tag-specific fields override default fields of the same name.
    pub fn for_tag(&self, tag: &str) -> Mapping {
        let mut mapping = self.default.clone();
        if let Some(fields) = self.tags.get(tag) {
            mapping.extend(fields.iter().map(|(k, v)| (k.clone(), *v)));
        }
        mapping
    }
}

/// Clamps a numeric setting to at least one, recording a warning when clamped.
fn at_least_one<T>(key: &str, value: T, warnings: &mut Vec<ConfigWarning>) -> T
where
    T: PartialEq + From<u8>,
{
    if value == T::from(0) {
        warnings.push(ConfigWarning::ZeroValue {
            key: key.to_string(),
        });
        T::from(1)
    } else {
        value
    }
}

/// Internal struct for TOML serialization of settings.
#[derive(Serialize)]
struct SerializableSettings<'a> {
    /// Server settings.
    server: &'a ServerSettings,
    /// Client settings.
    client: &'a ClientSettings,
    /// Search-related settings.
    search: &'a SearchSettings,
    /// Suggestion settings.
    suggest: &'a SuggestSettings,
    /// All mappings keyed by section name.
    mapping: BTreeMap<String, Mapping>,
}
