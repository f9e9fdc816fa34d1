//! Value log compaction
//!
//! Reclaims a closed segment by rewriting its live entries into the active
//! segment and deleting the file.
//!
//! The log has no key index of its own, so liveness is decided by the
//! caller (the layer that maps keys to their latest `ValuePos`). The
//! returned relocations let that layer redirect its index; positions into
//! the reclaimed segment resolve to `SegmentNotFound` afterwards.

use std::fs;

use bytes::Bytes;
use tracing::info;

use crate::error::{Result, TideError};

use super::entry::{now_unix, LogEntry};
use super::value_log::{ValueLog, ValuePos};

/// A live entry moved by compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub key: Bytes,
    pub old: ValuePos,
    pub new: ValuePos,
}

/// Outcome of compacting one segment
#[derive(Debug, Clone, Default)]
pub struct CompactionStats {
    /// Segment that was reclaimed
    pub segment_id: u32,
    /// Entries rewritten into the active segment
    pub live: u64,
    /// Entries dropped as expired or superseded
    pub discarded: u64,
    /// Encoded bytes of the dropped entries
    pub reclaimed_bytes: u64,
    /// Old → new position of every rewritten entry
    pub relocated: Vec<Relocation>,
}

impl ValueLog {
    /// Compact closed segment `segment_id`
    ///
    /// Steps:
    /// 1. Reject the active segment or an unknown id
    /// 2. Rewrite each unexpired entry for which `is_live` holds
    /// 3. Sync the active segment so rewritten data is durable
    /// 4. Drop the catalogue slot and our handle, then delete the file
    pub fn compact<F>(&self, segment_id: u32, mut is_live: F) -> Result<CompactionStats>
    where
        F: FnMut(&LogEntry, &ValuePos) -> bool,
    {
        let _guard = self.compaction_lock.lock();

        {
            let state = self.state.read();
            if state.active.as_ref().map(|s| s.fid()) == Some(segment_id) {
                return Err(TideError::Compaction(format!(
                    "segment {} is active",
                    segment_id
                )));
            }
            if !state.catalogue.contains_key(&segment_id) {
                return Err(TideError::Compaction(format!(
                    "segment {} not exists",
                    segment_id
                )));
            }
        }

        let segment = self.segment_for_read(segment_id)?;
        let now = now_unix();
        let mut stats = CompactionStats {
            segment_id,
            ..Default::default()
        };

        for item in segment.iter() {
            let (offset, entry) = item?;
            let old = ValuePos {
                fid: segment_id,
                offset,
                size: entry.size() as u32,
            };

            if entry.is_expired(now) || !is_live(&entry, &old) {
                stats.discarded += 1;
                stats.reclaimed_bytes += entry.size() as u64;
                continue;
            }

            let new = self.write(&entry)?;
            stats.live += 1;
            stats.relocated.push(Relocation {
                key: entry.key.clone(),
                old,
                new,
            });
        }

        // Rewritten entries must be durable before the old copy goes away
        self.sync()?;

        {
            let mut state = self.state.write();
            if let Some(slot) = state.catalogue.remove(&segment_id) {
                slot.take();
            }
        }
        // Readers still holding the segment keep their handle until they drop
        // it; new lookups already miss the catalogue.
        let path = segment.path().to_path_buf();
        drop(segment);
        fs::remove_file(&path)?;

        info!(
            fid = segment_id,
            live = stats.live,
            discarded = stats.discarded,
            reclaimed_bytes = stats.reclaimed_bytes,
            "Compacted value log segment"
        );
        Ok(stats)
    }
}
