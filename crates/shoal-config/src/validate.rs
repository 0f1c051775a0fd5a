//! Configuration validation.
//!
//! Validates a loaded configuration and reports warnings for potential issues.

use std::fmt;

use crate::Config;

/// A non-fatal warning about the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A numeric setting was zero and has been raised to one.
    ZeroValue {
        /// Dotted key of the setting.
        key: String,
    },
    /// No peer nodes are configured, so writes replicate nowhere.
    NoNodes,
    /// A mapping targets a reserved internal index name.
    ReservedIndexMapping {
        /// The mapping section name.
        tag: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroValue { key } => write!(f, "'{key}' must be at least 1; using 1"),
            Self::NoNodes => write!(f, "no client nodes are configured"),
            Self::ReservedIndexMapping { tag } => {
                write!(f, "mapping '{tag}' targets a reserved index name and is ignored")
            }
        }
    }
}

/// Validates the configuration and returns any warnings.
///
/// This checks for:
/// - An empty node list
/// - Mappings for index names starting with `__`, which are reserved
pub fn validate_config(config: &Config) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.client.nodes.is_empty() {
        warnings.push(ConfigWarning::NoNodes);
    }

    for tag in config.mappings.tags.keys() {
        if tag.starts_with("__") {
            warnings.push(ConfigWarning::ReservedIndexMapping { tag: tag.clone() });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::parse_config_str;

    fn config(toml: &str) -> Config {
        let raw = parse_config_str(toml, Path::new("test.toml")).unwrap();
        Config::from_raw(raw, Path::new("/")).unwrap()
    }

    #[test]
    fn warns_without_nodes() {
        let warnings = validate_config(&config(""));
        assert_eq!(warnings, vec![ConfigWarning::NoNodes]);
    }

    #[test]
    fn clean_config_has_no_warnings() {
        let warnings = validate_config(&config("[client]\nnodes = [\"a:1\"]\n"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn warns_on_reserved_index_mapping() {
        let warnings = validate_config(&config(
            "[client]\nnodes = [\"a:1\"]\n[mapping.__suggester_x]\nkey = \"text\"\n",
        ));
        assert_eq!(
            warnings,
            vec![ConfigWarning::ReservedIndexMapping {
                tag: "__suggester_x".into()
            }]
        );
    }

    #[test]
    fn warning_display() {
        let warning = ConfigWarning::ZeroValue {
            key: "client.request_workers".into(),
        };
        assert_eq!(
            warning.to_string(),
            "'client.request_workers' must be at least 1; using 1"
        );
    }
}
