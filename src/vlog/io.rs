//! Segment I/O selectors
//!
//! Positioned byte access to a segment file, either through a plain file
//! handle or a memory map pre-sized to the block size.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use parking_lot::{Mutex, RwLock};

use crate::config::IoType;

/// Positioned access to a segment's bytes
pub(crate) trait IoSelector: Send + Sync {
    /// Write all of `buf` starting at `offset`
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Fill `buf` from `offset`; `UnexpectedEof` if the range is not there
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Force written bytes to durable storage
    fn sync(&self) -> io::Result<()>;

    /// Current addressable length in bytes
    fn len(&self) -> io::Result<u64>;
}

/// Open the selector matching `io_type`
///
/// With `create == false` a missing file is `NotFound`.
pub(crate) fn open_selector(
    path: &Path,
    io_type: IoType,
    block_size: u64,
    create: bool,
) -> io::Result<Box<dyn IoSelector>> {
    Ok(match io_type {
        IoType::FileIo => Box::new(FileIoSelector::open(path, create)?),
        IoType::MMap => Box::new(MmapSelector::open(path, block_size, create)?),
    })
}

fn open_file(path: &Path, create: bool) -> io::Result<File> {
    OpenOptions::new()
        .create(create)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

// =============================================================================
// File I/O
// =============================================================================

/// Seek-then-read/write on a file handle
///
/// The mutex keeps the seek and the transfer together.
pub(crate) struct FileIoSelector {
    file: Mutex<File>,
}

impl FileIoSelector {
    pub(crate) fn open(path: &Path, create: bool) -> io::Result<Self> {
        let file = open_file(path, create)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl IoSelector for FileIoSelector {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn sync(&self) -> io::Result<()> {
        self.file.lock().sync_all()
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

// =============================================================================
// Memory-mapped I/O
// =============================================================================

/// Memory map over a file pre-allocated to the block size
pub(crate) struct MmapSelector {
    file: File,
    map: RwLock<MmapMut>,
}

impl MmapSelector {
    pub(crate) fn open(path: &Path, block_size: u64, create: bool) -> io::Result<Self> {
        let file = open_file(path, create)?;

        if file.metadata()?.len() < block_size {
            file.set_len(block_size)?;
        }

        // SAFETY: the file is owned by this selector and only ever resized
        // before mapping.
        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Self {
            file,
            map: RwLock::new(map),
        })
    }

    fn range(offset: u64, len: usize, limit: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;
        (end <= limit).then_some(start..end)
    }
}

impl IoSelector for MmapSelector {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut map = self.map.write();
        let range = Self::range(offset, buf.len(), map.len()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::WriteZero, "write past end of mapped segment")
        })?;
        map[range].copy_from_slice(buf);
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let map = self.map.read();
        let range = Self::range(offset, buf.len(), map.len()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of mapped segment")
        })?;
        buf.copy_from_slice(&map[range]);
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        self.map.read().flush()?;
        self.file.sync_all()
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.map.read().len() as u64)
    }
}
