use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use balancer::Tables;
use gateway::NamespaceConfig;
use serde::Deserialize;

use crate::error::ProxyError;

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_die_limit() -> usize {
    1
}

/// Proxy configuration, read once at startup from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Minimum live storage connections required to serve writes.
    #[serde(rename = "die-limit", default = "default_die_limit")]
    pub die_limit: usize,

    /// Port appended to hostnames in download-info responses.
    #[serde(rename = "sign-port", default)]
    pub sign_port: Option<String>,

    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceConfig>,

    #[serde(default)]
    pub balancer: Tables,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            die_limit: default_die_limit(),
            sign_port: None,
            namespaces: BTreeMap::new(),
            balancer: Tables::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let raw = r#"{
            "listen": "127.0.0.1:9000",
            "die-limit": 2,
            "sign-port": "10010",
            "namespaces": {
                "default": { "groups-count": 3, "success-copies-num": "quorum" },
                "secure": {
                    "groups-count": 2,
                    "success-copies-num": "all",
                    "auth-key": "s3cret"
                }
            },
            "balancer": {
                "couples": [[1, 2, 3]],
                "weights": {
                    "default": [ { "groups": [1, 2, 3], "weight": 10 } ]
                },
                "cache-groups": { "hot.bin": [9] },
                "bad-groups": []
            }
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();

        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.die_limit, 2);
        assert_eq!(config.sign_port.as_deref(), Some("10010"));
        assert_eq!(config.namespaces.len(), 2);
        assert_eq!(
            config.namespaces["secure"].auth_key.as_deref(),
            Some("s3cret")
        );
        assert_eq!(config.balancer.couples, vec![vec![1, 2, 3]]);
        assert_eq!(config.balancer.cache_groups["hot.bin"], vec![9]);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.die_limit, 1);
        assert!(config.sign_port.is_none());
        assert!(config.namespaces.is_empty());
        assert!(config.balancer.couples.is_empty());
    }
}
