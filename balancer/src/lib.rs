use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BalancerError {
    #[error("invalid balancer tables: {0}")]
    InvalidTables(String),
}

/// Cluster balancer ("mastermind") as seen by the gateway.
///
/// Maps namespaces and keys to candidate replica groups and exposes its
/// internal tables as pre-rendered JSON fragments for introspection.
pub trait Mastermind: Send + Sync {
    /// Candidate groups for an upload into `namespace`, sized to the
    /// namespace's replication factor. Empty when no couple fits.
    fn select_groups(&self, namespace: &str, count: usize) -> Vec<u32>;

    /// All groups of the couple `group` belongs to. A group unknown to the
    /// balancer is its own couple.
    fn symmetric_groups(&self, group: u32) -> Vec<u32>;

    /// Cache groups currently holding a hot copy of `filename`.
    fn cache_groups(&self, filename: &str) -> Vec<u32>;

    fn weights_json(&self) -> String;
    fn symmetric_groups_json(&self) -> String;
    fn bad_groups_json(&self) -> String;
    fn cache_groups_json(&self) -> String;
}

/// A couple of symmetric groups with its balancer weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedCouple {
    pub groups: Vec<u32>,
    pub weight: u64,
}

/// Static balancer tables, loaded once from configuration.
///
/// `couples` lists the symmetric group sets of the cluster; `weights`
/// carries per-namespace weighted couples used to place uploads;
/// `cache_groups` maps hot filenames to their cache groups; `bad_groups`
/// lists couples currently excluded from placement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub couples: Vec<Vec<u32>>,
    #[serde(default)]
    pub weights: BTreeMap<String, Vec<WeightedCouple>>,
    #[serde(rename = "cache-groups", default)]
    pub cache_groups: BTreeMap<String, Vec<u32>>,
    #[serde(rename = "bad-groups", default)]
    pub bad_groups: Vec<Vec<u32>>,
}

/// [`Mastermind`] backed by static [`Tables`].
pub struct TableBalancer {
    tables: Tables,
}

impl TableBalancer {
    pub fn new(tables: Tables) -> Result<Self, BalancerError> {
        for (i, couple) in tables.couples.iter().enumerate() {
            if couple.is_empty() {
                return Err(BalancerError::InvalidTables(format!("couple #{i} is empty")));
            }
        }
        for (namespace, couples) in &tables.weights {
            if couples.is_empty() {
                return Err(BalancerError::InvalidTables(format!(
                    "namespace '{namespace}' has no weighted couples"
                )));
            }
        }
        Ok(Self { tables })
    }
}

impl Mastermind for TableBalancer {
    fn select_groups(&self, namespace: &str, count: usize) -> Vec<u32> {
        let Some(couples) = self.tables.weights.get(namespace) else {
            debug!(namespace, "no weighted couples for namespace");
            return Vec::new();
        };

        couples
            .iter()
            .filter(|c| c.groups.len() == count)
            .max_by_key(|c| c.weight)
            .map(|c| c.groups.clone())
            .unwrap_or_default()
    }

    fn symmetric_groups(&self, group: u32) -> Vec<u32> {
        self.tables
            .couples
            .iter()
            .find(|couple| couple.contains(&group))
            .cloned()
            .unwrap_or_else(|| vec![group])
    }

    fn cache_groups(&self, filename: &str) -> Vec<u32> {
        self.tables
            .cache_groups
            .get(filename)
            .cloned()
            .unwrap_or_default()
    }

    fn weights_json(&self) -> String {
        serde_json::to_string(&self.tables.weights).unwrap_or_else(|_| "{}".into())
    }

    fn symmetric_groups_json(&self) -> String {
        serde_json::to_string(&self.tables.couples).unwrap_or_else(|_| "[]".into())
    }

    fn bad_groups_json(&self) -> String {
        serde_json::to_string(&self.tables.bad_groups).unwrap_or_else(|_| "[]".into())
    }

    fn cache_groups_json(&self) -> String {
        serde_json::to_string(&self.tables.cache_groups).unwrap_or_else(|_| "{}".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balancer() -> TableBalancer {
        let mut weights = BTreeMap::new();
        weights.insert(
            "default".to_string(),
            vec![
                WeightedCouple { groups: vec![1, 2, 3], weight: 10 },
                WeightedCouple { groups: vec![4, 5, 6], weight: 30 },
                WeightedCouple { groups: vec![7, 8], weight: 100 },
            ],
        );
        let mut cache_groups = BTreeMap::new();
        cache_groups.insert("hot.bin".to_string(), vec![10, 11]);
        TableBalancer::new(Tables {
            couples: vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8]],
            weights,
            cache_groups,
            bad_groups: vec![vec![4, 5, 6]],
        })
        .unwrap()
    }

    #[test]
    fn select_prefers_heaviest_couple_of_matching_size() {
        let b = balancer();
        assert_eq!(b.select_groups("default", 3), vec![4, 5, 6]);
        assert_eq!(b.select_groups("default", 2), vec![7, 8]);
        assert!(b.select_groups("default", 4).is_empty());
        assert!(b.select_groups("unknown", 3).is_empty());
    }

    #[test]
    fn symmetric_groups_returns_whole_couple() {
        let b = balancer();
        assert_eq!(b.symmetric_groups(2), vec![1, 2, 3]);
        assert_eq!(b.symmetric_groups(42), vec![42]);
    }

    #[test]
    fn cache_groups_by_filename() {
        let b = balancer();
        assert_eq!(b.cache_groups("hot.bin"), vec![10, 11]);
        assert!(b.cache_groups("cold.bin").is_empty());
    }

    #[test]
    fn json_fragments_are_valid_json() {
        let b = balancer();
        for fragment in [
            b.weights_json(),
            b.symmetric_groups_json(),
            b.bad_groups_json(),
            b.cache_groups_json(),
        ] {
            serde_json::from_str::<serde_json::Value>(&fragment).unwrap();
        }
    }

    #[test]
    fn empty_couple_is_rejected() {
        let err = TableBalancer::new(Tables {
            couples: vec![vec![]],
            ..Tables::default()
        });
        assert!(err.is_err());
    }
}
