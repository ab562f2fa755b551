//! Binary envelope embedding side metadata next to a stored payload.
//!
//! Layout, little-endian: embed count (`u32`, written even when zero),
//! then per embed a `u32` tag and its fixed-size value, then the raw
//! payload. The format is not self-describing on read: the caller must
//! know out-of-band whether the stream was written with an embed region
//! (see [`DataContainer::unpack`]).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Embedded timestamp: 8-byte seconds + 8-byte nanoseconds (the write
/// path always stores zero nanoseconds).
pub const EMBED_TIMESTAMP: u32 = 1;

const TIMESTAMP_VALUE_SIZE: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContainerError {
    #[error("embed region truncated")]
    Truncated,

    #[error("unknown embed tag {0}")]
    UnknownTag(u32),
}

fn embed_value_size(tag: u32) -> Result<usize, ContainerError> {
    match tag {
        EMBED_TIMESTAMP => Ok(TIMESTAMP_VALUE_SIZE),
        other => Err(ContainerError::UnknownTag(other)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Embed {
    tag: u32,
    value: Bytes,
}

/// A payload plus its ordered embedded metadata records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataContainer {
    pub payload: Bytes,
    embeds: Vec<Embed>,
}

impl DataContainer {
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            embeds: Vec::new(),
        }
    }

    pub fn embeds_count(&self) -> usize {
        self.embeds.len()
    }

    /// Embed a timestamp, replacing any previously set one in place.
    pub fn set_timestamp(&mut self, seconds: u64) {
        let mut value = BytesMut::with_capacity(TIMESTAMP_VALUE_SIZE);
        value.put_u64_le(seconds);
        value.put_u64_le(0);
        let value = value.freeze();

        match self.embeds.iter_mut().find(|e| e.tag == EMBED_TIMESTAMP) {
            Some(embed) => embed.value = value,
            None => self.embeds.push(Embed {
                tag: EMBED_TIMESTAMP,
                value,
            }),
        }
    }

    /// Embedded timestamp seconds, if any.
    pub fn timestamp(&self) -> Option<u64> {
        self.embeds
            .iter()
            .find(|e| e.tag == EMBED_TIMESTAMP)
            .map(|e| (&e.value[..8]).get_u64_le())
    }

    /// Serialize the container. Deterministic, no padding; the embed
    /// count is written even when zero.
    pub fn pack(&self) -> Bytes {
        let embeds_len: usize = self.embeds.iter().map(|e| 8 + e.value.len()).sum();
        let mut buf = BytesMut::with_capacity(4 + embeds_len + self.payload.len());

        buf.put_u32_le(self.embeds.len() as u32);
        for embed in &self.embeds {
            buf.put_u32_le(embed.tag);
            buf.put_slice(&embed.value);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Deserialize a container.
    ///
    /// When `has_embeds` is false the whole input is the payload, even if
    /// its leading bytes happen to look like an embed count; streams from
    /// non-embedding writers must never be misparsed.
    pub fn unpack(mut data: Bytes, has_embeds: bool) -> Result<Self, ContainerError> {
        if !has_embeds {
            return Ok(Self::new(data));
        }

        if data.len() < 4 {
            return Err(ContainerError::Truncated);
        }
        let count = data.get_u32_le();
        // every embed consumes at least its tag, so a count the remaining
        // bytes cannot hold is rejected before any allocation
        if count as usize > data.len() / 4 {
            return Err(ContainerError::Truncated);
        }

        let mut embeds = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if data.len() < 4 {
                return Err(ContainerError::Truncated);
            }
            let tag = data.get_u32_le();
            let size = embed_value_size(tag)?;
            if data.len() < size {
                return Err(ContainerError::Truncated);
            }
            let value = data.split_to(size);
            embeds.push(Embed { tag, value });
        }

        Ok(Self {
            payload: data,
            embeds,
        })
    }
}
