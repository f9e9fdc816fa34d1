//! # TideKV
//!
//! Write-path core of a key/value separated storage engine:
//! - Segmented, append-only value log with size-based rotation
//! - Position-based reads with lazy segment opening and expiry checks
//! - Compaction of closed segments driven by an external liveness index
//! - Hash + skiplist memtable for point lookups and ordered flushes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Engine (composes both parts)                 │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌─────────────────────────┐     ┌─────────────────────────┐
//!   │        ValueLog         │     │      HashSkipList       │
//!   │ active ─► N.vlog (rw)   │     │ HashMap  ◄─┐ one lock   │
//!   │ catalogue ─► 0..N-1     │     │ SkipMap  ◄─┘            │
//!   └────────────┬────────────┘     └─────────────────────────┘
//!                │ ValuePos { fid, offset, size }
//!                ▼
//!         Segment files on disk
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod vlog;
pub mod memtable;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TideError, Result};
pub use config::{Config, IoType};
pub use memtable::HashSkipList;
pub use vlog::{LogEntry, ValueLog, ValuePos};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
