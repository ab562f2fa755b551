use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tracing::debug;

use crate::{
    Key, ReadResult, Result, ResultEntry, ScatterResult, StatEntry, StorageBackend, StorageError,
    SuccessPolicy, WriteMode, STATUS_NOT_FOUND,
};

/// Status synthesized for a group whose command failed at transport level.
const STATUS_IO_ERROR: i32 = -5;

/// A client session against the storage cluster.
///
/// The process holds one ambient template; every request takes a private
/// clone via [`Session::clone_session`] so group sets, policy and flags
/// never leak between requests. Multi-group operations fan out over the
/// session's group set, collect one entry per group and evaluate the
/// session's success policy over the outcome.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn StorageBackend>,
    groups: Vec<u32>,
    policy: SuccessPolicy,
    collect_all: bool,
    user_flags: u64,
}

impl Session {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            groups: Vec::new(),
            policy: SuccessPolicy::Any,
            collect_all: false,
            user_flags: 0,
        }
    }

    /// Private copy for one request.
    pub fn clone_session(&self) -> Self {
        self.clone()
    }

    /// Replace the session's replica group set, dropping duplicates while
    /// keeping first-seen order.
    pub fn set_groups(&mut self, groups: impl IntoIterator<Item = u32>) {
        self.groups.clear();
        for g in groups {
            if !self.groups.contains(&g) {
                self.groups.push(g);
            }
        }
    }

    pub fn groups(&self) -> &[u32] {
        &self.groups
    }

    pub fn set_success_policy(&mut self, policy: SuccessPolicy) {
        self.policy = policy;
    }

    pub fn success_policy(&self) -> SuccessPolicy {
        self.policy
    }

    /// Keep per-group error entries in scatter results instead of dropping
    /// them.
    pub fn set_collect_all(&mut self, collect_all: bool) {
        self.collect_all = collect_all;
    }

    pub fn user_flags(&self) -> u64 {
        self.user_flags
    }

    pub fn set_user_flags(&mut self, flags: u64) {
        self.user_flags = flags;
    }

    pub fn live_connection_count(&self) -> usize {
        self.backend.live_states()
    }

    /// Write `data` into every group of the session.
    ///
    /// The result always carries one entry per targeted group; the
    /// aggregate error is set when the success policy is not met.
    pub async fn write(
        &self,
        key: &Key,
        data: Bytes,
        offset: u64,
        mode: WriteMode,
    ) -> Result<ScatterResult> {
        if self.groups.is_empty() {
            return Err(StorageError::NoGroups);
        }

        let ops = self.groups.iter().map(|&group| {
            let data = data.clone();
            async move {
                (
                    group,
                    self.backend
                        .write(group, key, data, offset, mode, self.user_flags)
                        .await,
                )
            }
        });
        let entries: Vec<ResultEntry> = join_all(ops)
            .await
            .into_iter()
            .map(|(group, res)| entry_or_synthetic(group, res))
            .collect();

        Ok(self.finish_scatter(entries, true))
    }

    /// Read the object, trying the session's groups in order. The first
    /// successful group wins.
    pub async fn read(&self, key: &Key, offset: u64, size: u64) -> Result<ReadResult> {
        if self.groups.is_empty() {
            return Err(StorageError::NoGroups);
        }

        let mut hard_error = None;
        for &group in &self.groups {
            match self.backend.read(group, key, offset, size).await {
                Ok(res) => return Ok(res),
                Err(StorageError::NotFound) => {
                    debug!(group, "read: entry not found, trying next group");
                }
                Err(err) => {
                    debug!(group, %err, "read: group failed, trying next group");
                    hard_error = Some(err);
                }
            }
        }

        Err(hard_error.unwrap_or(StorageError::NotFound))
    }

    /// Remove the object from every group of the session.
    pub async fn remove(&self, key: &Key) -> Result<ScatterResult> {
        if self.groups.is_empty() {
            return Err(StorageError::NoGroups);
        }

        let ops = self
            .groups
            .iter()
            .map(|&group| async move { (group, self.backend.remove(group, key).await) });
        let entries: Vec<ResultEntry> = join_all(ops)
            .await
            .into_iter()
            .map(|(group, res)| entry_or_synthetic(group, res))
            .collect();

        if entries.iter().all(|e| e.status == STATUS_NOT_FOUND) {
            let mut result = self.finish_scatter(entries, false);
            result.error = Some(StorageError::NotFound);
            return Ok(result);
        }

        Ok(self.finish_scatter(entries, true))
    }

    /// Look the object up in every group of the session.
    ///
    /// Per-group failures surface as error entries, not as an aggregate
    /// error; the caller decides what a fully-failed lookup means.
    pub async fn lookup(&self, key: &Key) -> Result<ScatterResult> {
        if self.groups.is_empty() {
            return Err(StorageError::NoGroups);
        }

        let ops = self
            .groups
            .iter()
            .map(|&group| async move { (group, self.backend.lookup(group, key).await) });
        let entries: Vec<ResultEntry> = join_all(ops)
            .await
            .into_iter()
            .map(|(group, res)| entry_or_synthetic(group, res))
            .collect();

        Ok(self.finish_scatter(entries, false))
    }

    pub async fn cluster_stat(&self) -> Result<Vec<StatEntry>> {
        self.backend.cluster_stat().await
    }

    /// Compute good/bad group sets from per-group entries and, when
    /// `check_policy` is set, turn a policy violation into the aggregate
    /// error. Error entries are dropped unless the session collects all
    /// results.
    fn finish_scatter(&self, entries: Vec<ResultEntry>, check_policy: bool) -> ScatterResult {
        let good_groups: Vec<u32> = entries.iter().filter(|e| e.is_ok()).map(|e| e.group).collect();
        let bad_groups: Vec<u32> = self
            .groups
            .iter()
            .copied()
            .filter(|g| !good_groups.contains(g))
            .collect();

        let error = if check_policy && !self.policy.satisfied(good_groups.len(), self.groups.len())
        {
            Some(StorageError::PolicyNotMet {
                good: good_groups.len(),
                total: self.groups.len(),
            })
        } else {
            None
        };

        let entries = if self.collect_all || check_policy {
            entries
        } else {
            entries.into_iter().filter(|e| e.is_ok()).collect()
        };

        ScatterResult {
            entries,
            good_groups,
            bad_groups,
            error,
        }
    }
}

fn entry_or_synthetic(group: u32, res: Result<ResultEntry>) -> ResultEntry {
    match res {
        Ok(entry) => entry,
        Err(err) => {
            let status = if err.is_not_found() {
                STATUS_NOT_FOUND
            } else {
                STATUS_IO_ERROR
            };
            ResultEntry {
                group,
                status,
                addr: Bytes::new(),
                file_info: Bytes::new(),
            }
        }
    }
}
