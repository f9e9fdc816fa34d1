//! Log entry definitions
//!
//! Defines the unit stored in value-log segments and its byte layout.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::{Result, TideError};

/// Header size: CRC (4) + KeyLen (4) + ValueLen (4) + ExpiredAt (8) = 20 bytes
pub const HEADER_SIZE: usize = 20;

/// Current unix time in seconds
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A key/value pair with an optional expiry
///
/// `expired_at` is a unix timestamp in seconds; `0` means the entry never
/// expires.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
    pub key: Bytes,
    pub value: Bytes,
    pub expired_at: u64,
}

/// Decoded fixed-size part of an entry
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryHeader {
    crc: u32,
    key_len: u32,
    value_len: u32,
    expired_at: u64,
}

impl EntryHeader {
    /// Parse a header; `None` for the all-zero end-of-data marker
    pub(crate) fn decode(buf: &[u8; HEADER_SIZE]) -> Option<Self> {
        if buf.iter().all(|&b| b == 0) {
            return None;
        }
        Some(Self {
            crc: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            key_len: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            value_len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            expired_at: u64::from_le_bytes([
                buf[12], buf[13], buf[14], buf[15], buf[16], buf[17], buf[18], buf[19],
            ]),
        })
    }

    /// Length of key + value following the header
    pub(crate) fn body_len(&self) -> usize {
        self.key_len as usize + self.value_len as usize
    }
}

impl LogEntry {
    /// Create an entry that never expires
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expired_at: 0,
        }
    }

    /// Create an entry that expires at the given unix timestamp
    pub fn with_expiry(key: impl Into<Bytes>, value: impl Into<Bytes>, expired_at: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expired_at,
        }
    }

    /// Encoded length in bytes, used for segment capacity accounting
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Whether the expiry is set and not in the future relative to `now`
    pub fn is_expired(&self, now: u64) -> bool {
        self.expired_at != 0 && self.expired_at <= now
    }

    /// Serialize to the on-disk layout
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&[0u8; 4]); // CRC placeholder
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.expired_at.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Rebuild an entry from its header and body, verifying the checksum
    pub(crate) fn decode(header_bytes: &[u8; HEADER_SIZE], header: &EntryHeader, body: &[u8]) -> Result<Self> {
        if body.len() != header.body_len() {
            return Err(TideError::Corruption(format!(
                "entry body is {} bytes, header declares {}",
                body.len(),
                header.body_len()
            )));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes[4..]);
        hasher.update(body);
        let actual = hasher.finalize();
        if actual != header.crc {
            return Err(TideError::Corruption(format!(
                "CRC mismatch: stored {:#010x}, computed {:#010x}",
                header.crc, actual
            )));
        }

        let body = Bytes::copy_from_slice(body);
        let key_len = header.key_len as usize;
        Ok(Self {
            key: body.slice(..key_len),
            value: body.slice(key_len..),
            expired_at: header.expired_at,
        })
    }
}
