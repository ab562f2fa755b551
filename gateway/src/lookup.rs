//! Decoding of per-node result records into host/path/status descriptors.
//!
//! The address and file-info records are produced by the storage layer
//! and only ever decoded here. Address record: family byte (4 or 6),
//! port in network order, raw address bytes. File-info record: offset and
//! size as little-endian `u64`, then the absolute on-disk path as the
//! variable-length remainder.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, Bytes};
use storage::ResultEntry;

use crate::error::{GatewayError, GatewayResult};

/// Decoded view over one node's lookup/write result.
///
/// All accessors are pure functions of the entry's bytes; repeated calls
/// return the same value.
pub struct LookupEntry {
    group: u32,
    status: i32,
    addr: Bytes,
    file_info: Bytes,
    sign_port: Option<String>,
}

impl LookupEntry {
    pub fn new(entry: &ResultEntry, sign_port: Option<String>) -> Self {
        Self {
            group: entry.group,
            status: entry.status,
            addr: entry.addr.clone(),
            file_info: entry.file_info.clone(),
            sign_port,
        }
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    /// Per-node status code; zero means success.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Hostname of the node, via reverse resolution of its address, with
    /// the configured signing port appended when one is set. No numeric
    /// fallback: a failed reverse lookup is an error.
    pub fn host(&self) -> GatewayResult<String> {
        let (ip, _) = self.decode_addr()?;
        let host = dns_lookup::lookup_addr(&ip)
            .map_err(|err| GatewayError::Decode(format!("can not make dns lookup: {err}")))?;

        match &self.sign_port {
            Some(port) if !port.is_empty() => Ok(format!("{host}:{port}")),
            _ => Ok(host),
        }
    }

    pub fn port(&self) -> GatewayResult<u16> {
        Ok(self.decode_addr()?.1)
    }

    /// `host:port` rendering of the raw address, no DNS involved.
    pub fn addr(&self) -> GatewayResult<String> {
        let (ip, port) = self.decode_addr()?;
        Ok(format!("{ip}:{port}"))
    }

    /// `<file-path>:<offset>:<size>` from the node's file-info record.
    pub fn path(&self) -> GatewayResult<String> {
        let (offset, size, path) = self.decode_file_info()?;
        Ok(format!("{path}:{offset}:{size}"))
    }

    /// Absolute on-disk path trailing the fixed file-info record.
    pub fn full_path(&self) -> GatewayResult<String> {
        let (_, _, path) = self.decode_file_info()?;
        Ok(path)
    }

    fn decode_addr(&self) -> GatewayResult<(IpAddr, u16)> {
        decode_addr(&self.addr)
    }

    fn decode_file_info(&self) -> GatewayResult<(u64, u64, String)> {
        if self.file_info.len() < 16 {
            return Err(GatewayError::Decode("file-info record too short".into()));
        }
        let mut buf = self.file_info.clone();
        let offset = buf.get_u64_le();
        let size = buf.get_u64_le();
        let path = String::from_utf8(buf.to_vec())
            .map_err(|_| GatewayError::Decode("file-info path is not utf-8".into()))?;
        Ok((offset, size, path))
    }
}

/// Decode an address record into its IP and port.
pub fn decode_addr(raw: &Bytes) -> GatewayResult<(IpAddr, u16)> {
    if raw.len() < 3 {
        return Err(GatewayError::Decode("address record too short".into()));
    }
    let mut buf = raw.clone();
    let family = buf.get_u8();
    let port = buf.get_u16();

    let ip = match family {
        4 => {
            if buf.len() < 4 {
                return Err(GatewayError::Decode("short IPv4 address record".into()));
            }
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        6 => {
            if buf.len() < 16 {
                return Err(GatewayError::Decode("short IPv6 address record".into()));
            }
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        other => {
            return Err(GatewayError::Decode(format!(
                "unknown address family {other}"
            )))
        }
    };

    Ok((ip, port))
}

/// Render an address record as `ip:port`.
pub fn render_addr(raw: &Bytes) -> GatewayResult<String> {
    let (ip, port) = decode_addr(raw)?;
    Ok(format!("{ip}:{port}"))
}

#[cfg(test)]
mod tests {
    use storage::{encode_addr, encode_file_info};

    use super::*;

    fn entry() -> ResultEntry {
        ResultEntry {
            group: 7,
            status: 0,
            addr: encode_addr(IpAddr::from([127, 0, 0, 1]), 1031),
            file_info: encode_file_info(4096, 1234, "/srv/storage/7/data-0.0"),
        }
    }

    #[test]
    fn addr_renders_without_dns() {
        let e = LookupEntry::new(&entry(), None);
        assert_eq!(e.addr().unwrap(), "127.0.0.1:1031");
        assert_eq!(e.port().unwrap(), 1031);
        assert_eq!(e.group(), 7);
        assert_eq!(e.status(), 0);
    }

    #[test]
    fn accessors_are_idempotent() {
        let e = LookupEntry::new(&entry(), None);
        assert_eq!(e.addr().unwrap(), e.addr().unwrap());
        assert_eq!(e.path().unwrap(), e.path().unwrap());
    }

    #[test]
    fn path_joins_file_offset_and_size() {
        let e = LookupEntry::new(&entry(), None);
        assert_eq!(e.path().unwrap(), "/srv/storage/7/data-0.0:4096:1234");
        assert_eq!(e.full_path().unwrap(), "/srv/storage/7/data-0.0");
    }

    #[test]
    fn ipv6_addresses_decode() {
        let mut octets = [0u8; 16];
        octets[15] = 1;
        let raw = encode_addr(IpAddr::from(octets), 1025);
        assert_eq!(render_addr(&raw).unwrap(), "::1:1025");
    }

    #[test]
    fn short_records_are_decode_errors() {
        let e = LookupEntry::new(
            &ResultEntry {
                group: 1,
                status: -5,
                addr: Bytes::new(),
                file_info: Bytes::new(),
            },
            None,
        );
        assert!(matches!(e.addr(), Err(GatewayError::Decode(_))));
        assert!(matches!(e.path(), Err(GatewayError::Decode(_))));
    }

    #[test]
    fn host_appends_sign_port_suffix() {
        let e = LookupEntry::new(&entry(), Some("10010".to_string()));
        // loopback reverse-resolves on any sane host; only assert the
        // configured suffix
        if let Ok(host) = e.host() {
            assert!(host.ends_with(":10010"));
        }
    }
}
