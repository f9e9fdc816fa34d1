//! Value Log
//!
//! Owns the active segment and the catalogue of closed segments.
//!
//! ## Responsibilities
//! - Discover existing segments on startup
//! - Append entries, rotating to a new segment at the block size
//! - Resolve positions into values, opening closed segments on demand
//! - Bound the number of open closed-segment handles

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, TideError};

use super::entry::{now_unix, LogEntry};
use super::segment::{FileKind, Segment};

/// Where an entry's bytes live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValuePos {
    /// Segment id
    pub fid: u32,
    /// Byte offset of the entry within the segment
    pub offset: i64,
    /// Encoded entry size
    pub size: u32,
}

impl ValuePos {
    /// Encode for storage in an external index
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TideError::Serialization(e.to_string()))
    }

    /// Decode a position produced by [`ValuePos::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TideError::Serialization(e.to_string()))
    }
}

/// Catalogue entry for a closed segment
///
/// Starts as a placeholder; the handle is bound on first read and may be
/// evicted again when too many are open.
pub(super) struct SegmentSlot {
    handle: Mutex<Option<Arc<Segment>>>,
    last_used: AtomicU64,
}

impl SegmentSlot {
    fn placeholder() -> Self {
        Self {
            handle: Mutex::new(None),
            last_used: AtomicU64::new(0),
        }
    }

    fn bound(segment: Arc<Segment>, tick: u64) -> Self {
        Self {
            handle: Mutex::new(Some(segment)),
            last_used: AtomicU64::new(tick),
        }
    }

    pub(super) fn take(&self) -> Option<Arc<Segment>> {
        self.handle.lock().take()
    }
}

/// Which segment is active plus catalogue membership
///
/// The catalogue never contains the active segment's id.
pub(super) struct LogState {
    pub(super) active: Option<Arc<Segment>>,
    pub(super) catalogue: BTreeMap<u32, SegmentSlot>,
}

/// Segmented append-only value log
///
/// ## Concurrency:
/// - `state`: RwLock over {active segment, catalogue}. Rotation and
///   compaction removal take it exclusively; everything else shares it only
///   long enough to clone an `Arc<Segment>`.
/// - Appends and reads run against the cloned `Arc`, outside `state`, so a
///   reader that captured a segment before rotation can still finish.
pub struct ValueLog {
    config: Config,
    pub(super) state: RwLock<LogState>,
    /// Logical clock for least-recently-used eviction
    clock: AtomicU64,
    /// Serializes compaction passes
    pub(super) compaction_lock: Mutex<()>,
}

impl ValueLog {
    /// Open the value log in `config.data_dir`
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Discover `<id>.vlog` files (a non-numeric id is an error)
    /// 3. Open the highest id as the active segment, or create id 0
    /// 4. Register every other id as an unopened placeholder
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let mut fids = Self::discover_segments(&config.data_dir)?;
        fids.sort_unstable();

        let active_fid = fids.pop().unwrap_or(0);
        let active = Segment::open(
            &config.data_dir,
            active_fid,
            config.block_size,
            FileKind::ValueLog,
            config.io_type,
        )?;

        let catalogue = fids
            .iter()
            .map(|&fid| (fid, SegmentSlot::placeholder()))
            .collect::<BTreeMap<_, _>>();

        info!(
            dir = %config.data_dir.display(),
            active = active_fid,
            write_at = active.write_at(),
            closed = catalogue.len(),
            "Opened value log"
        );

        Ok(Self {
            config,
            state: RwLock::new(LogState {
                active: Some(Arc::new(active)),
                catalogue,
            }),
            clock: AtomicU64::new(1),
            compaction_lock: Mutex::new(()),
        })
    }

    /// Append an entry, rotating first if the active segment is full
    ///
    /// Returns the position the entry can be read back from.
    pub fn write(&self, entry: &LogEntry) -> Result<ValuePos> {
        loop {
            let active = self.active_segment()?;
            if let Some(offset) = active.append(entry)? {
                return Ok(ValuePos {
                    fid: active.fid(),
                    offset,
                    size: entry.size() as u32,
                });
            }
            self.rotate(active.fid())?;
        }
    }

    /// Read the value stored at `pos`
    ///
    /// Returns:
    /// - `Ok(Some(value))` — entry found and not expired
    /// - `Ok(None)` — no position given, or the entry has expired
    /// - `Err(SegmentNotFound)` — `pos` names an unknown segment
    /// - `Err(Corruption)` — no entry of `pos.size` bytes starts at `pos.offset`
    pub fn read_value(&self, pos: Option<&ValuePos>) -> Result<Option<Bytes>> {
        let pos = match pos {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let segment = self.segment_for_read(pos.fid)?;
        let entry = segment.read_at(pos.offset)?;
        if entry.size() != pos.size as usize {
            return Err(TideError::Corruption(format!(
                "entry at segment {} offset {} is {} bytes, position says {}",
                pos.fid,
                pos.offset,
                entry.size(),
                pos.size
            )));
        }

        if entry.is_expired(now_unix()) {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    /// Force the active segment's writes to durable storage
    ///
    /// Closed segments were synced when they were sealed.
    pub fn sync(&self) -> Result<()> {
        self.active_segment()?.sync()
    }

    /// Release the active segment and every open closed-segment handle
    ///
    /// Subsequent `write`, `sync` and `close` calls fail with
    /// `NoActiveSegment`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        let active = state.active.clone().ok_or(TideError::NoActiveSegment)?;
        active.close()?;
        state.active = None;

        // Release every slot even if one fails; report the first failure
        let mut first_err = None;
        for slot in state.catalogue.values() {
            if let Some(segment) = slot.take() {
                if let Err(e) = segment.close() {
                    first_err.get_or_insert(e);
                }
            }
        }

        info!(active = active.fid(), "Closed value log");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Id of the active segment, if the log is open
    pub fn active_segment_id(&self) -> Option<u32> {
        self.state.read().active.as_ref().map(|s| s.fid())
    }

    /// All known segment ids ascending, active included
    pub fn segment_ids(&self) -> Vec<u32> {
        let state = self.state.read();
        let mut ids: Vec<u32> = state.catalogue.keys().copied().collect();
        if let Some(active) = state.active.as_ref() {
            ids.push(active.fid());
        }
        ids
    }

    /// Number of closed segments currently holding an open handle
    pub fn open_segment_count(&self) -> usize {
        let state = self.state.read();
        state
            .catalogue
            .values()
            .filter(|slot| slot.handle.lock().is_some())
            .count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    pub(super) fn active_segment(&self) -> Result<Arc<Segment>> {
        self.state
            .read()
            .active
            .clone()
            .ok_or(TideError::NoActiveSegment)
    }

    /// Resolve `fid` to a live handle, binding a placeholder if needed
    ///
    /// The handle is opened under the shared lock; the caller does its read
    /// after the lock is released.
    pub(super) fn segment_for_read(&self, fid: u32) -> Result<Arc<Segment>> {
        let state = self.state.read();
        if let Some(active) = state.active.as_ref().filter(|s| s.fid() == fid) {
            return Ok(Arc::clone(active));
        }

        let slot = state
            .catalogue
            .get(&fid)
            .ok_or(TideError::SegmentNotFound(fid))?;
        slot.last_used.store(self.tick(), Ordering::Relaxed);

        let segment = {
            let mut handle = slot.handle.lock();
            if let Some(segment) = handle.as_ref() {
                return Ok(Arc::clone(segment));
            }

            let segment = Segment::open_existing(
                &self.config.data_dir,
                fid,
                self.config.block_size,
                FileKind::ValueLog,
                self.config.io_type,
            )?;
            segment.mark_sealed();
            let segment = Arc::new(segment);
            *handle = Some(Arc::clone(&segment));
            segment
        };

        debug!(fid, "Lazily opened closed segment");
        self.evict_idle(&state, fid);
        Ok(segment)
    }

    /// Swap in segment `full_fid + 1` as the active segment
    ///
    /// A no-op if another writer already rotated past `full_fid`. Nothing
    /// is swapped until the new segment is open and the old one is sealed,
    /// so a failure leaves the old segment active.
    fn rotate(&self, full_fid: u32) -> Result<()> {
        let mut state = self.state.write();
        let current = state.active.clone().ok_or(TideError::NoActiveSegment)?;
        if current.fid() != full_fid {
            return Ok(());
        }

        let next_fid = full_fid.checked_add(1).ok_or_else(|| {
            TideError::Config("segment id space exhausted".to_string())
        })?;
        let next = Segment::open(
            &self.config.data_dir,
            next_fid,
            self.config.block_size,
            FileKind::ValueLog,
            self.config.io_type,
        )?;
        current.seal()?;

        state.active = Some(Arc::new(next));
        state
            .catalogue
            .insert(full_fid, SegmentSlot::bound(current, self.tick()));

        info!(closed = full_fid, active = next_fid, "Rotated value log segment");
        self.evict_idle(&state, full_fid);
        Ok(())
    }

    /// Drop least-recently-used handles beyond `max_open_segments`
    ///
    /// Readers already holding an evicted `Arc` finish normally; the file is
    /// released when the last one drops it.
    fn evict_idle(&self, state: &LogState, keep: u32) {
        let limit = self.config.max_open_segments;
        if limit == 0 {
            return;
        }

        let mut open: Vec<(u64, u32)> = state
            .catalogue
            .iter()
            .filter(|(fid, slot)| **fid != keep && slot.handle.lock().is_some())
            .map(|(&fid, slot)| (slot.last_used.load(Ordering::Relaxed), fid))
            .collect();

        // `keep` is open too and counts against the limit
        let excess = (open.len() + 1).saturating_sub(limit);
        if excess == 0 {
            return;
        }

        open.sort_unstable();
        for &(_, fid) in open.iter().take(excess) {
            if let Some(slot) = state.catalogue.get(&fid) {
                slot.take();
                debug!(fid, "Evicted idle segment handle");
            }
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Parse segment ids from `<id>.vlog` file names
    ///
    /// Only the canonical spelling is accepted: `007.vlog` or `+7.vlog` would
    /// not be found again under `7.vlog`.
    fn discover_segments(dir: &Path) -> Result<Vec<u32>> {
        let suffix = format!(".{}", FileKind::ValueLog.suffix());
        let mut fids = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(&suffix) {
                let fid = stem
                    .parse::<u32>()
                    .map_err(|e| TideError::InvalidSegmentName {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                if fid.to_string() != stem {
                    return Err(TideError::InvalidSegmentName {
                        name: name.clone(),
                        reason: format!("id must be written as {}", fid),
                    });
                }
                fids.push(fid);
            }
        }

        Ok(fids)
    }
}
