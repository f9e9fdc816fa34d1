//! MemTable Module
//!
//! In-memory table for recent writes, ahead of persistence.
//!
//! ## Responsibilities
//! - O(1) expected point lookups and existence checks
//! - Ordered iteration for flushing to sorted on-disk structures
//! - Track size for flush triggers
//!
//! ## Data Structure Choice
//! A `HashMap` and a `SkipMap` over the same keys, both pointing at one
//! shared `Arc<LogEntry>`:
//! - Hash side answers `get`/`exist`
//! - Skiplist side keeps byte-wise key order for flushes
//! - One `RwLock` covers every mutation of both, so readers never see one
//!   side updated and the other stale

mod hash_skiplist;

pub use hash_skiplist::{HashSkipList, HashSkipListIter};
