//! HashSkipList implementation
//!
//! Hash index plus skiplist under one lock.

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use parking_lot::RwLock;

use crate::vlog::LogEntry;

/// In-memory table combining hash lookup with ordered traversal
///
/// ## Concurrency:
/// - `index`: RwLock over the hash side. Its write guard is held for the
///   whole of every `put`/`remove`, covering the skiplist update as well.
/// - `ordered`: only mutated while `index` is write-locked; iteration reads
///   it under the shared lock one step at a time.
pub struct HashSkipList {
    index: RwLock<HashMap<Bytes, Arc<LogEntry>>>,
    ordered: SkipMap<Bytes, Arc<LogEntry>>,
    /// Sum of `LogEntry::size()` over present entries
    size: AtomicUsize,
}

impl HashSkipList {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
            ordered: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Bind `key` to `value`, replacing any previous entry
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Arc<LogEntry> {
        self.put_entry(LogEntry::new(key, value))
    }

    /// Bind `entry.key` to `entry`, expiry included
    pub fn put_entry(&self, entry: LogEntry) -> Arc<LogEntry> {
        let entry = Arc::new(entry);
        let entry_size = entry.size();

        let mut index = self.index.write();
        let previous = index.insert(entry.key.clone(), Arc::clone(&entry));
        self.ordered.insert(entry.key.clone(), Arc::clone(&entry));

        if let Some(previous) = previous {
            self.size.fetch_sub(previous.size(), Ordering::Relaxed);
        }
        self.size.fetch_add(entry_size, Ordering::Relaxed);

        entry
    }

    /// Point lookup
    pub fn get(&self, key: &[u8]) -> Option<Arc<LogEntry>> {
        self.index.read().get(key).cloned()
    }

    /// Whether `key` is present
    pub fn exist(&self, key: &[u8]) -> bool {
        self.index.read().contains_key(key)
    }

    /// Remove `key`; absent keys are a no-op
    pub fn remove(&self, key: &[u8]) {
        let mut index = self.index.write();
        if let Some(previous) = index.remove(key) {
            self.ordered.remove(key);
            self.size.fetch_sub(previous.size(), Ordering::Relaxed);
        }
    }

    /// Ascending-by-key iteration over present entries
    ///
    /// Lazy; each call starts from the smallest key.
    pub fn iter(&self) -> HashSkipListIter<'_> {
        HashSkipListIter {
            list: self,
            last: None,
            done: false,
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate encoded size in bytes, for flush triggers
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}

impl Default for HashSkipList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over HashSkipList entries in key order
///
/// Resumes after the last key it returned, so entries inserted or removed
/// between steps are seen or skipped according to their key.
pub struct HashSkipListIter<'a> {
    list: &'a HashSkipList,
    last: Option<Bytes>,
    done: bool,
}

impl<'a> Iterator for HashSkipListIter<'a> {
    type Item = Arc<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let _guard = self.list.index.read();
        let next = match &self.last {
            None => self.list.ordered.front(),
            Some(key) => self.list.ordered.lower_bound(Bound::Excluded(&key[..])),
        };

        match next {
            Some(entry) => {
                self.last = Some(entry.key().clone());
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
