//! Value Log Module
//!
//! Append-only, segmented storage for values separated from their keys.
//!
//! ## Responsibilities
//! - Append entries to the single active segment, rotating at the block size
//! - Resolve a [`ValuePos`] back into bytes, opening closed segments lazily
//! - Treat expired entries as absent on read
//! - Reclaim closed segments through [`ValueLog::compact`]
//!
//! ## Entry Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (20 bytes, little-endian)                             │
//! │ ┌─────────┬────────────┬──────────────┬──────────────────┐   │
//! │ │ CRC (4) │ KeyLen (4) │ ValueLen (4) │ ExpiredAt (8)    │   │
//! │ └─────────┴────────────┴──────────────┴──────────────────┘   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Key | Value                                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! CRC covers everything after the CRC field. An all-zero header marks the
//! end of written data.
//!
//! ## Directory Layout
//! Segments are named `<id>.vlog`. The highest id is the active segment.

mod compaction;
mod entry;
mod io;
mod iterator;
mod segment;
mod value_log;

pub use compaction::{CompactionStats, Relocation};
pub use entry::{now_unix, LogEntry, HEADER_SIZE};
pub use iterator::SegmentIterator;
pub use segment::{FileKind, Segment};
pub use value_log::{ValueLog, ValuePos};
