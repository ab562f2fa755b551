mod memory;
mod session;

pub use memory::{encode_addr, encode_file_info, MemoryBackend};
pub use session::Session;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use thiserror::Error;

/// Width of a storage key identifier in bytes.
pub const ID_SIZE: usize = 64;

/// User-flag bit set on objects whose payload carries embedded metadata
/// records. The read path hands this bit back so the gateway knows to
/// unpack the data container.
pub const UF_EMBEDS: u64 = 1;

/// Per-node status value for a successful command.
pub const STATUS_OK: i32 = 0;

/// Per-node status value for "no such entry".
pub const STATUS_NOT_FOUND: i32 = -2;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("no such entry")]
    NotFound,

    #[error("replication policy not satisfied: {good} of {total} groups succeeded")]
    PolicyNotMet { good: usize, total: usize },

    #[error("no replica groups assigned to session")]
    NoGroups,

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }
}

/// A storage key: either a raw fixed-size id or a name hashed to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    name: Option<String>,
    id: [u8; ID_SIZE],
}

impl Key {
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&Sha512::digest(name.as_bytes()));
        Self { name: Some(name), id }
    }

    pub fn from_id(id: [u8; ID_SIZE]) -> Self {
        Self { name: None, id }
    }

    /// Original name of the key, empty for raw-id keys.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn id(&self) -> &[u8; ID_SIZE] {
        &self.id
    }

    /// Hex rendering of the full id.
    pub fn id_hex(&self) -> String {
        let mut out = String::with_capacity(ID_SIZE * 2);
        for b in &self.id {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

/// How a write positions its data on the storage nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Full write of the object.
    Data,
    /// Reserve `size` bytes and write the first chunk of a partial upload.
    Prepare { size: u64 },
    /// Write the final chunk and seal the object at `size` bytes.
    Commit { size: u64 },
    /// Overwrite bytes of an existing object in place.
    Plain,
}

/// Rule for declaring a multi-group operation successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuccessPolicy {
    All,
    Quorum,
    Any,
}

impl SuccessPolicy {
    /// Whether `good` successful groups out of `total` targeted satisfy
    /// the policy.
    pub fn satisfied(self, good: usize, total: usize) -> bool {
        match self {
            SuccessPolicy::All => good == total,
            SuccessPolicy::Quorum => good * 2 > total,
            SuccessPolicy::Any => good >= 1,
        }
    }
}

/// One node's response to a write/remove/lookup command.
///
/// `addr` and `file_info` are opaque records owned by the storage layer;
/// the gateway decodes them through its own accessors.
#[derive(Debug, Clone)]
pub struct ResultEntry {
    pub group: u32,
    pub status: i32,
    pub addr: Bytes,
    pub file_info: Bytes,
}

impl ResultEntry {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Aggregated outcome of a scatter-gather operation over a group set.
#[derive(Debug, Clone)]
pub struct ScatterResult {
    pub entries: Vec<ResultEntry>,
    pub good_groups: Vec<u32>,
    pub bad_groups: Vec<u32>,
    pub error: Option<StorageError>,
}

/// Payload and stored flags returned by a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub data: Bytes,
    pub user_flags: u64,
}

/// One node's response to a cluster status query.
#[derive(Debug, Clone)]
pub struct StatEntry {
    pub addr: Bytes,
    pub id: [u8; ID_SIZE],
    /// Load averages as integer centipercent.
    pub la: [u32; 3],
    pub vm_total: u64,
    pub vm_free: u64,
    pub vm_cached: u64,
    pub frsize: u64,
    pub bsize: u64,
    pub blocks: u64,
    pub bavail: u64,
    pub files: u64,
    pub fsid: u64,
}

/// Per-group storage I/O.
///
/// A network client against real storage nodes implements this; the
/// in-memory [`MemoryBackend`] stands in where no cluster is available.
/// Fan-out over a request's group set and success-policy evaluation live
/// in [`Session`], not here.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    async fn write(
        &self,
        group: u32,
        key: &Key,
        data: Bytes,
        offset: u64,
        mode: WriteMode,
        user_flags: u64,
    ) -> Result<ResultEntry>;

    async fn read(&self, group: u32, key: &Key, offset: u64, size: u64) -> Result<ReadResult>;

    async fn remove(&self, group: u32, key: &Key) -> Result<ResultEntry>;

    async fn lookup(&self, group: u32, key: &Key) -> Result<ResultEntry>;

    async fn cluster_stat(&self) -> Result<Vec<StatEntry>>;

    /// Number of live node connections the client currently holds.
    fn live_states(&self) -> usize;
}
