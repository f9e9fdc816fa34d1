//! Segment
//!
//! One append-only log file identified by a numeric id.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::config::IoType;
use crate::error::{Result, TideError};

use super::entry::{EntryHeader, LogEntry, HEADER_SIZE};
use super::io::{open_selector, IoSelector};
use super::iterator::SegmentIterator;

/// Kinds of log sharing a directory, told apart by file suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Value-log segments
    ValueLog,

    /// Write-ahead log segments
    Wal,
}

impl FileKind {
    /// File name suffix, without the dot
    pub fn suffix(&self) -> &'static str {
        match self {
            FileKind::ValueLog => "vlog",
            FileKind::Wal => "wal",
        }
    }
}

/// A single append-only segment file
///
/// ## Concurrency:
/// - `write_lock`: serializes append/seal/sync/close on this segment
/// - `io`: the bound handle; `None` once closed
/// - `write_at`: atomic cursor so readers never need `write_lock`
pub struct Segment {
    fid: u32,
    path: PathBuf,
    block_size: u64,
    io_type: IoType,
    io: RwLock<Option<Box<dyn IoSelector>>>,
    write_at: AtomicI64,
    sealed: AtomicBool,
    write_lock: Mutex<()>,
}

impl Segment {
    /// Open or create segment `fid` in `dir`
    ///
    /// The write cursor is recovered by scanning entries from the start of
    /// the file; scanning stops at end of file, at the zero end-of-data
    /// marker, or at the first torn entry.
    pub fn open(dir: &Path, fid: u32, block_size: u64, kind: FileKind, io_type: IoType) -> Result<Self> {
        Self::open_with(dir, fid, block_size, kind, io_type, true)
    }

    /// Open segment `fid` only if its file already exists
    ///
    /// A missing file is `SegmentNotFound`; nothing is created on disk.
    pub fn open_existing(dir: &Path, fid: u32, block_size: u64, kind: FileKind, io_type: IoType) -> Result<Self> {
        Self::open_with(dir, fid, block_size, kind, io_type, false)
    }

    fn open_with(
        dir: &Path,
        fid: u32,
        block_size: u64,
        kind: FileKind,
        io_type: IoType,
        create: bool,
    ) -> Result<Self> {
        let path = Self::path_for(dir, fid, kind);
        let io = open_selector(&path, io_type, block_size, create).map_err(|e| {
            if !create && e.kind() == std::io::ErrorKind::NotFound {
                TideError::SegmentNotFound(fid)
            } else {
                TideError::Io(e)
            }
        })?;

        let segment = Self {
            fid,
            path,
            block_size,
            io_type,
            io: RwLock::new(Some(io)),
            write_at: AtomicI64::new(0),
            sealed: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        };
        let write_at = segment.recover_write_at()?;
        segment.write_at.store(write_at, Ordering::Release);

        Ok(segment)
    }

    /// Wrap an already-open selector, for exercising I/O failures
    #[cfg(test)]
    pub(crate) fn with_selector(fid: u32, path: PathBuf, block_size: u64, io: Box<dyn IoSelector>) -> Self {
        Self {
            fid,
            path,
            block_size,
            io_type: IoType::FileIo,
            io: RwLock::new(Some(io)),
            write_at: AtomicI64::new(0),
            sealed: AtomicBool::new(true),
            write_lock: Mutex::new(()),
        }
    }

    /// `<dir>/<fid>.<suffix>`
    pub fn path_for(dir: &Path, fid: u32, kind: FileKind) -> PathBuf {
        dir.join(format!("{}.{}", fid, kind.suffix()))
    }

    /// Append an entry at the write cursor
    ///
    /// Returns:
    /// - `Ok(Some(offset))` — written at `offset`
    /// - `Ok(None)` — segment is full or sealed; the caller should rotate
    pub fn append(&self, entry: &LogEntry) -> Result<Option<i64>> {
        let buf = entry.encode();
        let size = buf.len() as u64;

        let _guard = self.write_lock.lock();
        if self.sealed.load(Ordering::Acquire) {
            return Ok(None);
        }

        let offset = self.write_at.load(Ordering::Acquire);
        if offset as u64 + size >= self.block_size {
            if offset > 0 {
                return Ok(None);
            }
            // An empty file segment takes an oversized entry; a map cannot.
            if self.io_type == IoType::MMap && size > self.block_size {
                return Err(TideError::EntryTooLarge {
                    size,
                    limit: self.block_size,
                });
            }
        }

        {
            let io = self.io.read();
            let io = io.as_ref().ok_or(TideError::SegmentClosed(self.fid))?;
            io.write_at(&buf, offset as u64)?;
        }
        self.write_at.store(offset + size as i64, Ordering::Release);

        Ok(Some(offset))
    }

    /// Read the entry starting at `offset`
    pub fn read_at(&self, offset: i64) -> Result<LogEntry> {
        match self.read_entry(offset)? {
            Some((entry, _)) => Ok(entry),
            None => Err(TideError::Corruption(format!(
                "no entry at offset {} in segment {}",
                offset, self.fid
            ))),
        }
    }

    /// Read the entry at `offset` and its encoded size; `None` at end of data
    pub(crate) fn read_entry(&self, offset: i64) -> Result<Option<(LogEntry, u64)>> {
        if offset < 0 {
            return Err(TideError::Corruption(format!("negative offset {}", offset)));
        }

        let io = self.io.read();
        let io = io.as_ref().ok_or(TideError::SegmentClosed(self.fid))?;

        let mut raw = [0u8; HEADER_SIZE];
        io.read_at(&mut raw, offset as u64)?;
        let header = match EntryHeader::decode(&raw) {
            Some(header) => header,
            None => return Ok(None),
        };

        // Lengths are unverified until the CRC check; bound them by the file
        let body_start = offset as u64 + HEADER_SIZE as u64;
        let body_len = header.body_len() as u64;
        let file_len = io.len()?;
        if body_start.saturating_add(body_len) > file_len {
            return Err(TideError::Corruption(format!(
                "entry at offset {} in segment {} declares {} body bytes past end of file ({})",
                offset, self.fid, body_len, file_len
            )));
        }

        let mut body = vec![0u8; header.body_len()];
        io.read_at(&mut body, body_start)?;

        let entry = LogEntry::decode(&raw, &header, &body)?;
        Ok(Some((entry, (HEADER_SIZE + body.len()) as u64)))
    }

    /// Iterate over every entry written so far
    pub fn iter(&self) -> SegmentIterator<'_> {
        SegmentIterator::new(self, self.write_at())
    }

    /// Force buffered writes to durable storage
    pub fn sync(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.sync_io()
    }

    /// Sync and refuse further appends; the segment stays readable
    pub fn seal(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.sync_io()?;
        self.sealed.store(true, Ordering::Release);
        Ok(())
    }

    /// Sync and release the underlying handle
    pub fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut io = self.io.write();
        if let Some(selector) = io.as_ref() {
            selector.sync()?;
        }
        *io = None;
        self.sealed.store(true, Ordering::Release);
        Ok(())
    }

    /// Mark a segment opened for reading only
    pub(crate) fn mark_sealed(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Segment id
    pub fn fid(&self) -> u32 {
        self.fid
    }

    /// Byte offset where the next entry will be written
    pub fn write_at(&self) -> i64 {
        self.write_at.load(Ordering::Acquire)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.io.read().is_some()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn sync_io(&self) -> Result<()> {
        let io = self.io.read();
        let io = io.as_ref().ok_or(TideError::SegmentClosed(self.fid))?;
        io.sync()?;
        Ok(())
    }

    fn recover_write_at(&self) -> Result<i64> {
        let file_len = {
            let io = self.io.read();
            let io = io.as_ref().ok_or(TideError::SegmentClosed(self.fid))?;
            io.len()?
        };

        let mut cursor = 0i64;
        for item in SegmentIterator::new(self, file_len as i64) {
            match item {
                Ok((offset, entry)) => cursor = offset + entry.size() as i64,
                Err(TideError::Corruption(msg)) => {
                    warn!(fid = self.fid, offset = cursor, %msg, "Torn entry at segment tail, ignoring");
                    break;
                }
                Err(TideError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    warn!(fid = self.fid, offset = cursor, "Partial entry at segment tail, ignoring");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(cursor)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("fid", &self.fid)
            .field("path", &self.path)
            .field("write_at", &self.write_at())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
