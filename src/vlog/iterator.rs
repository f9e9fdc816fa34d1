//! Segment Iterator
//!
//! Sequential iteration over the entries of one segment.

use crate::error::Result;

use super::segment::Segment;

/// Iterator over `(offset, entry)` pairs in write order
///
/// Stops at `end`, at the zero end-of-data marker, or after the first error.
pub struct SegmentIterator<'a> {
    segment: &'a Segment,
    /// Stop reading when we reach this offset
    end: i64,
    /// Offset of the next entry
    offset: i64,
}

impl<'a> SegmentIterator<'a> {
    pub(crate) fn new(segment: &'a Segment, end: i64) -> Self {
        Self {
            segment,
            end,
            offset: 0,
        }
    }
}

impl<'a> Iterator for SegmentIterator<'a> {
    type Item = Result<(i64, super::LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        match self.segment.read_entry(self.offset) {
            Ok(Some((entry, size))) => {
                let offset = self.offset;
                self.offset += size as i64;
                Some(Ok((offset, entry)))
            }
            Ok(None) => {
                self.offset = self.end;
                None
            }
            Err(e) => {
                self.offset = self.end;
                Some(Err(e))
            }
        }
    }
}
