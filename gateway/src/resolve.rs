//! Replica-group selection for a request.

use balancer::Mastermind;
use storage::Session;
use tracing::{error, info};

use crate::registry::Namespace;

/// Group set and key name resolved from a read/delete style path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub groups: Vec<u32>,
    pub filename: String,
}

impl ResolvedTarget {
    fn empty() -> Self {
        Self {
            groups: Vec::new(),
            filename: String::new(),
        }
    }
}

/// Resolve `/<verb>/<group-token>/<filename>` into groups and key name.
///
/// Failures are non-fatal here: an unparsable path yields an empty group
/// set and the request 404s downstream.
pub fn resolve_target(balancer: &dyn Mastermind, path: &str) -> ResolvedTarget {
    let Some(verb_end) = path[1..].find('/') else {
        error!("cannot determine groups: path has no group segment");
        return ResolvedTarget::empty();
    };
    let rest = &path[verb_end + 2..];

    let Some((token, filename)) = rest.split_once('/') else {
        error!("cannot determine groups: path has no filename segment");
        return ResolvedTarget::empty();
    };

    ResolvedTarget {
        groups: resolve_groups(balancer, token, filename),
        filename: filename.to_string(),
    }
}

/// Union the symmetric groups of a literal group token with the cache
/// groups of the filename, keeping first-seen order.
pub fn resolve_groups(balancer: &dyn Mastermind, token: &str, filename: &str) -> Vec<u32> {
    let group: u32 = match token.parse() {
        Ok(group) => group,
        Err(_) => {
            error!(token, "cannot determine groups");
            return Vec::new();
        }
    };

    let mut groups = balancer.symmetric_groups(group);
    for cache_group in balancer.cache_groups(filename) {
        if !groups.contains(&cache_group) {
            groups.push(cache_group);
        }
    }

    info!(?groups, filename, "fetched groups for request");
    groups
}

/// Balancer-selected groups for an upload, sized to the namespace's
/// replication factor.
pub fn upload_groups(balancer: &dyn Mastermind, namespace: &Namespace) -> Vec<u32> {
    balancer.select_groups(&namespace.name, namespace.groups_count)
}

/// Install the namespace's completion checker on the session.
pub fn apply_success_policy(session: &mut Session, namespace: &Namespace) {
    session.set_success_policy(namespace.policy);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use balancer::{TableBalancer, Tables, WeightedCouple};

    use super::*;

    fn balancer() -> TableBalancer {
        let mut cache_groups = BTreeMap::new();
        cache_groups.insert("hot.bin".to_string(), vec![9, 2]);
        let mut weights = BTreeMap::new();
        weights.insert(
            "photos".to_string(),
            vec![WeightedCouple { groups: vec![4, 5], weight: 1 }],
        );
        TableBalancer::new(Tables {
            couples: vec![vec![1, 2, 3]],
            weights,
            cache_groups,
            bad_groups: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn numeric_token_unions_symmetric_and_cache_groups() {
        let b = balancer();
        let t = resolve_target(&b, "/get/1/hot.bin");
        // symmetric groups first, then cache groups, duplicates dropped
        assert_eq!(t.groups, vec![1, 2, 3, 9]);
        assert_eq!(t.filename, "hot.bin");
    }

    #[test]
    fn unknown_group_is_its_own_couple() {
        let b = balancer();
        let t = resolve_target(&b, "/get/42/cold.bin");
        assert_eq!(t.groups, vec![42]);
    }

    #[test]
    fn non_numeric_token_yields_empty_set() {
        let b = balancer();
        let t = resolve_target(&b, "/get/abc/file.bin");
        assert!(t.groups.is_empty());
        assert_eq!(t.filename, "file.bin");
    }

    #[test]
    fn pathological_paths_yield_empty_set() {
        let b = balancer();
        assert!(resolve_target(&b, "/get").groups.is_empty());
        assert!(resolve_target(&b, "/get/3").groups.is_empty());
    }

    #[test]
    fn upload_groups_sized_to_namespace() {
        let b = balancer();
        let ns = Namespace {
            name: "photos".to_string(),
            groups_count: 2,
            policy: storage::SuccessPolicy::All,
            auth_secret: None,
        };
        assert_eq!(upload_groups(&b, &ns), vec![4, 5]);
    }
}
