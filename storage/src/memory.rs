use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::RwLock;

use crate::{
    Key, ReadResult, Result, ResultEntry, StatEntry, StorageBackend, StorageError, WriteMode,
    ID_SIZE,
};

/// Encode a node address record: family byte (4 = IPv4, 6 = IPv6),
/// port in network order, then the raw address bytes.
pub fn encode_addr(ip: IpAddr, port: u16) -> Bytes {
    let mut buf = BytesMut::new();
    match ip {
        IpAddr::V4(v4) => {
            buf.put_u8(4);
            buf.put_u16(port);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.put_u8(6);
            buf.put_u16(port);
            buf.put_slice(&v6.octets());
        }
    }
    buf.freeze()
}

/// Encode a file-info record: offset and size in little-endian, then the
/// absolute on-disk path as the variable-length remainder.
pub fn encode_file_info(offset: u64, size: u64, path: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + path.len());
    buf.put_u64_le(offset);
    buf.put_u64_le(size);
    buf.put_slice(path.as_bytes());
    buf.freeze()
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    user_flags: u64,
}

/// In-memory [`StorageBackend`].
///
/// Stands in for the network client in tests and single-process runs.
/// Groups are independent key spaces; `fail_group` makes a group answer
/// every command with an I/O failure.
pub struct MemoryBackend {
    objects: RwLock<HashMap<(u32, [u8; ID_SIZE]), StoredObject>>,
    failed: RwLock<Vec<u32>>,
    stats: RwLock<Vec<StatEntry>>,
    live: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(live: usize) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            failed: RwLock::new(Vec::new()),
            stats: RwLock::new(vec![Self::default_stat()]),
            live: AtomicUsize::new(live),
        }
    }

    /// Make every command against `group` fail.
    pub async fn fail_group(&self, group: u32) {
        let mut failed = self.failed.write().await;
        if !failed.contains(&group) {
            failed.push(group);
        }
    }

    /// Override the number of live connections reported to sessions.
    pub fn set_live(&self, live: usize) {
        self.live.store(live, Ordering::Relaxed);
    }

    /// Replace the node stats returned by cluster status queries.
    pub async fn set_stats(&self, stats: Vec<StatEntry>) {
        *self.stats.write().await = stats;
    }

    fn default_stat() -> StatEntry {
        StatEntry {
            addr: encode_addr(IpAddr::from([127, 0, 0, 1]), 1025),
            id: [0u8; ID_SIZE],
            la: [12, 8, 4],
            vm_total: 16_384_256,
            vm_free: 9_218_104,
            vm_cached: 4_194_304,
            frsize: 4096,
            bsize: 4096,
            blocks: 268_435_456,
            bavail: 134_217_728,
            files: 1_048_576,
            fsid: 0x2f5c_1d90_77aa_41e3,
        }
    }

    async fn check_group(&self, group: u32) -> Result<()> {
        if self.failed.read().await.contains(&group) {
            return Err(StorageError::Backend(format!("group {group} is down")));
        }
        Ok(())
    }

    fn entry_for(&self, group: u32, offset: u64, size: u64) -> ResultEntry {
        ResultEntry {
            group,
            status: 0,
            addr: encode_addr(IpAddr::from([127, 0, 0, 1]), 1024 + group as u16),
            file_info: encode_file_info(
                offset,
                size,
                &format!("/srv/storage/{group}/data-0.0"),
            ),
        }
    }

    fn place_at(buf: &mut Vec<u8>, offset: u64, data: &[u8]) -> Result<()> {
        let offset = usize::try_from(offset)
            .ok()
            .and_then(|o| o.checked_add(data.len()).map(|end| (o, end)));
        let Some((offset, end)) = offset else {
            return Err(StorageError::Backend("write offset overflow".into()));
        };
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn write(
        &self,
        group: u32,
        key: &Key,
        data: Bytes,
        offset: u64,
        mode: WriteMode,
        user_flags: u64,
    ) -> Result<ResultEntry> {
        self.check_group(group).await?;
        let mut objects = self.objects.write().await;
        let slot = (group, *key.id());

        let stored = match mode {
            WriteMode::Data => {
                let mut buf = Vec::new();
                Self::place_at(&mut buf, offset, &data)?;
                StoredObject { data: buf, user_flags }
            }
            WriteMode::Prepare { size } => {
                let mut buf = vec![0u8; size as usize];
                Self::place_at(&mut buf, offset, &data)?;
                StoredObject { data: buf, user_flags }
            }
            WriteMode::Commit { size } => {
                let mut buf = objects.get(&slot).map(|o| o.data.clone()).unwrap_or_default();
                Self::place_at(&mut buf, offset, &data)?;
                buf.truncate(size as usize);
                StoredObject { data: buf, user_flags }
            }
            WriteMode::Plain => {
                let mut obj = objects.get(&slot).cloned().ok_or(StorageError::NotFound)?;
                Self::place_at(&mut obj.data, offset, &data)?;
                obj.user_flags = user_flags;
                obj
            }
        };

        let size = stored.data.len() as u64;
        objects.insert(slot, stored);
        Ok(self.entry_for(group, offset, size))
    }

    async fn read(&self, group: u32, key: &Key, offset: u64, size: u64) -> Result<ReadResult> {
        self.check_group(group).await?;
        let objects = self.objects.read().await;
        let obj = objects
            .get(&(group, *key.id()))
            .ok_or(StorageError::NotFound)?;

        let offset = usize::try_from(offset)
            .map_err(|_| StorageError::Backend("read offset overflow".into()))?;
        if offset > obj.data.len() {
            return Err(StorageError::Backend("read offset beyond object".into()));
        }
        let end = if size == 0 {
            obj.data.len()
        } else {
            offset.saturating_add(size as usize).min(obj.data.len())
        };

        Ok(ReadResult {
            data: Bytes::copy_from_slice(&obj.data[offset..end]),
            user_flags: obj.user_flags,
        })
    }

    async fn remove(&self, group: u32, key: &Key) -> Result<ResultEntry> {
        self.check_group(group).await?;
        let mut objects = self.objects.write().await;
        match objects.remove(&(group, *key.id())) {
            Some(obj) => Ok(self.entry_for(group, 0, obj.data.len() as u64)),
            None => Err(StorageError::NotFound),
        }
    }

    async fn lookup(&self, group: u32, key: &Key) -> Result<ResultEntry> {
        self.check_group(group).await?;
        let objects = self.objects.read().await;
        match objects.get(&(group, *key.id())) {
            Some(obj) => Ok(self.entry_for(group, 0, obj.data.len() as u64)),
            None => Err(StorageError::NotFound),
        }
    }

    async fn cluster_stat(&self) -> Result<Vec<StatEntry>> {
        Ok(self.stats.read().await.clone())
    }

    fn live_states(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn groups_are_independent_key_spaces() {
        let backend = MemoryBackend::new(2);
        let key = Key::from_name("k");
        backend
            .write(1, &key, Bytes::from_static(b"one"), 0, WriteMode::Data, 0)
            .await
            .unwrap();

        assert!(backend.read(1, &key, 0, 0).await.is_ok());
        assert_eq!(backend.read(2, &key, 0, 0).await, Err(StorageError::NotFound));
    }

    #[tokio::test]
    async fn plain_write_requires_existing_object() {
        let backend = MemoryBackend::new(1);
        let key = Key::from_name("k");
        let err = backend
            .write(1, &key, Bytes::from_static(b"x"), 0, WriteMode::Plain, 0)
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::NotFound);
    }

    #[tokio::test]
    async fn ranged_read_honors_offset_and_size() {
        let backend = MemoryBackend::new(1);
        let key = Key::from_name("k");
        backend
            .write(1, &key, Bytes::from_static(b"abcdefgh"), 0, WriteMode::Data, 0)
            .await
            .unwrap();

        let res = backend.read(1, &key, 2, 3).await.unwrap();
        assert_eq!(&res.data[..], b"cde");
    }

    #[tokio::test]
    async fn absurd_offsets_are_backend_errors() {
        let backend = MemoryBackend::new(1);
        let key = Key::from_name("k");

        let err = backend
            .write(1, &key, Bytes::from_static(b"x"), u64::MAX, WriteMode::Data, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));

        backend
            .write(1, &key, Bytes::from_static(b"x"), 0, WriteMode::Data, 0)
            .await
            .unwrap();
        assert!(matches!(
            backend.read(1, &key, u64::MAX, 1).await,
            Err(StorageError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn failed_group_rejects_commands() {
        let backend = MemoryBackend::new(1);
        backend.fail_group(1).await;
        let key = Key::from_name("k");
        assert!(matches!(
            backend.lookup(1, &key).await,
            Err(StorageError::Backend(_))
        ));
    }
}
