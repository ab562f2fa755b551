use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use storage::SuccessPolicy;
use thiserror::Error;

/// Replication policy bucket for a set of keys.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub name: String,
    pub groups_count: usize,
    pub policy: SuccessPolicy,
    pub auth_secret: Option<String>,
}

/// One namespace as it appears in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceConfig {
    #[serde(rename = "groups-count")]
    pub groups_count: usize,
    /// `all`, `quorum` or `any`.
    #[serde(rename = "success-copies-num")]
    pub success_copies_num: String,
    #[serde(rename = "auth-key", default)]
    pub auth_key: Option<String>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(
        "unknown type of success-copies-num '{value}' in '{namespace}' namespace. \
         Allowed types: any, quorum, all"
    )]
    UnknownPolicy { namespace: String, value: String },

    #[error("invalid groups-count 0 in '{namespace}' namespace")]
    InvalidGroupsCount { namespace: String },
}

/// Static namespace table, read-only after startup.
pub struct Registry {
    namespaces: HashMap<String, Namespace>,
}

impl Registry {
    pub fn from_config(
        config: &BTreeMap<String, NamespaceConfig>,
    ) -> Result<Self, RegistryError> {
        let mut namespaces = HashMap::new();

        for (name, ns) in config {
            if ns.groups_count == 0 {
                return Err(RegistryError::InvalidGroupsCount {
                    namespace: name.clone(),
                });
            }
            let policy = match ns.success_copies_num.as_str() {
                "all" => SuccessPolicy::All,
                "quorum" => SuccessPolicy::Quorum,
                "any" => SuccessPolicy::Any,
                other => {
                    return Err(RegistryError::UnknownPolicy {
                        namespace: name.clone(),
                        value: other.to_string(),
                    })
                }
            };
            namespaces.insert(
                name.clone(),
                Namespace {
                    name: name.clone(),
                    groups_count: ns.groups_count,
                    policy,
                    auth_secret: ns.auth_key.clone(),
                },
            );
        }

        Ok(Self { namespaces })
    }

    /// Look a namespace up by name. `None` covers both "unknown name" and
    /// nothing else: a known namespace with no live groups still resolves
    /// here and only fails later, at group selection.
    pub fn get(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.get(name)
    }
}

/// Filename and namespace parsed from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub filename: String,
    pub namespace: String,
}

/// Parse `/<verb>[-<namespace>]/<filename>` into its target.
///
/// No `-` in the path means the `default` namespace. A `-` with nothing
/// between it and the end of the verb segment leaves the namespace
/// unresolvable, as does a `-` appearing only past the verb segment.
pub fn split_target(path: &str) -> Option<Target> {
    let verb_end = path[1..].find('/')? + 1;
    let filename = path[verb_end + 1..].to_string();

    let namespace = match path.find('-') {
        None => "default".to_string(),
        Some(dash) if dash + 1 < verb_end => path[dash + 1..verb_end].to_string(),
        Some(_) => return None,
    };

    Some(Target {
        filename,
        namespace,
    })
}
