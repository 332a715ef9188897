//! Declarative filter configuration.
//!
//! A filter YAML is a mapping from filter name to a list of conditions;
//! every condition names a kind (`subnet`, `port`, `asn`), the values to
//! match, and an optional negation. The filter name doubles as the output
//! subdirectory for packets it matches.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level filter config: `filter_name -> conditions`.
pub type FilterConfig = BTreeMap<String, CombinedConfig>;

/// All conditions of one named filter. They AND together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombinedConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionConfig>,
}

/// One condition of a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Condition kind: `subnet`, `port` or `asn`.
    pub kind: String,
    /// Invert the condition.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
    /// Values to match: CIDRs, `<port>/<tcp|udp>` pairs, or AS numbers.
    #[serde(rename = "match")]
    pub match_values: Vec<String>,
}

impl ConditionConfig {
    pub fn new(kind: &str, match_values: Vec<String>) -> Self {
        ConditionConfig {
            kind: kind.to_string(),
            negate: false,
            match_values,
        }
    }
}

/// Load a filter config from a YAML file.
pub fn load_filter_config<P: AsRef<Path>>(path: P) -> Result<FilterConfig> {
    let data = std::fs::read(path.as_ref()).map_err(Error::Io)?;
    let config: FilterConfig = serde_yaml::from_slice(&data)?;
    Ok(config)
}

/// An example config demonstrating every condition kind, for the
/// `example-config` subcommand.
pub fn example_config() -> FilterConfig {
    let mut config = FilterConfig::new();
    config.insert(
        "internal-tls".into(),
        CombinedConfig {
            conditions: vec![
                ConditionConfig::new(
                    "subnet",
                    vec!["10.0.0.0/8".into(), "2001:db8::/32".into()],
                ),
                ConditionConfig::new("port", vec!["443/tcp".into()]),
            ],
        },
    );
    config.insert(
        "not-known-asn".into(),
        CombinedConfig {
            conditions: vec![ConditionConfig {
                kind: "asn".into(),
                negate: true,
                match_values: vec!["64496".into()],
            }],
        },
    );
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
alerts:
  conditions:
    - kind: subnet
      match:
        - 10.0.0.0/24
    - kind: port
      negate: true
      match:
        - 53/udp
"#;

    #[test]
    fn test_parse_yaml() {
        let config: FilterConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let combined = &config["alerts"];
        assert_eq!(combined.conditions.len(), 2);
        assert_eq!(combined.conditions[0].kind, "subnet");
        assert!(!combined.conditions[0].negate);
        assert!(combined.conditions[1].negate);
        assert_eq!(combined.conditions[1].match_values, vec!["53/udp"]);
    }

    #[test]
    fn test_serialize_skips_default_negate() {
        let config = example_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("internal-tls"));
        assert!(yaml.contains("443/tcp"));
        // negate only appears on the condition that sets it
        assert_eq!(yaml.matches("negate").count(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_filter_config(&path).unwrap();
        assert!(config.contains_key("alerts"));
    }

    #[test]
    fn test_load_rejects_broken_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.yml");
        std::fs::write(&path, ": not yaml [").unwrap();
        assert!(load_filter_config(&path).is_err());
    }
}
