//! Tests for ValueLog
//!
//! These tests verify:
//! - Opening: bootstrap, segment discovery, bad file names
//! - Write/read through positions, including across rotation
//! - Expiry and nil positions as soft "no value" results
//! - Sync/close lifecycle errors
//! - Lazy opening and eviction of closed segments
//! - Concurrent writers

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;

use tidekv::vlog::{now_unix, FileKind, Segment};
use tidekv::{Config, LogEntry, TideError, ValueLog, ValuePos};

use crate::common::{config, entry_100, open_log, open_mmap_log, setup_temp_dir};

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_directory_creates_segment_zero() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);

    assert_eq!(vlog.active_segment_id(), Some(0));
    assert_eq!(vlog.segment_ids(), vec![0]);
    assert!(temp.path().join("0.vlog").exists());
}

#[test]
fn test_open_creates_missing_directory() {
    let temp = setup_temp_dir();
    let dir = temp.path().join("nested").join("vlog");

    let vlog = open_log(&dir, 1024);

    assert!(dir.is_dir());
    assert_eq!(vlog.active_segment_id(), Some(0));
}

#[test]
fn test_open_highest_id_is_active() {
    let temp = setup_temp_dir();
    for id in [0u32, 2, 10] {
        fs::File::create(temp.path().join(format!("{}.vlog", id))).unwrap();
    }

    let vlog = open_log(temp.path(), 1024);

    // Numeric order, not lexical: 10 > 2
    assert_eq!(vlog.active_segment_id(), Some(10));
    assert_eq!(vlog.segment_ids(), vec![0, 2, 10]);
    assert_eq!(vlog.open_segment_count(), 0);
}

#[test]
fn test_open_ignores_other_file_kinds() {
    let temp = setup_temp_dir();
    fs::File::create(temp.path().join("1.vlog")).unwrap();
    fs::File::create(temp.path().join("5.wal")).unwrap();
    fs::File::create(temp.path().join("notes.txt")).unwrap();

    let vlog = open_log(temp.path(), 1024);

    assert_eq!(vlog.segment_ids(), vec![1]);
}

#[test]
fn test_open_invalid_segment_name_fails() {
    let temp = setup_temp_dir();
    fs::File::create(temp.path().join("0.vlog")).unwrap();
    fs::File::create(temp.path().join("abc.vlog")).unwrap();

    let result = ValueLog::open(config(temp.path(), 1024));

    match result {
        Err(TideError::InvalidSegmentName { name, .. }) => assert_eq!(name, "abc.vlog"),
        other => panic!("expected InvalidSegmentName, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_open_rejects_non_canonical_segment_ids() {
    for name in ["+5.vlog", "007.vlog"] {
        let temp = setup_temp_dir();
        fs::File::create(temp.path().join("0.vlog")).unwrap();
        fs::File::create(temp.path().join(name)).unwrap();

        let result = ValueLog::open(config(temp.path(), 1024));

        match result {
            Err(TideError::InvalidSegmentName { name: bad, .. }) => assert_eq!(bad, name),
            other => panic!("expected InvalidSegmentName, got {:?}", other.map(|_| ())),
        }
    }
}

#[test]
fn test_open_rejects_zero_block_size() {
    let temp = setup_temp_dir();

    let result = ValueLog::open(config(temp.path(), 0));

    assert!(matches!(result, Err(TideError::Config(_))));
}

// =============================================================================
// Write / Read Tests
// =============================================================================

#[test]
fn test_write_and_read_value() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024 * 1024);

    let entry = LogEntry::new("lotusdb", "value-log");
    let pos = vlog.write(&entry).unwrap();

    assert_eq!(pos.fid, 0);
    assert_eq!(pos.offset, 0);
    assert_eq!(pos.size as usize, entry.size());
    assert_eq!(vlog.read_value(Some(&pos)).unwrap().unwrap(), "value-log");
}

#[test]
fn test_positions_are_contiguous() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024 * 1024);

    let first = vlog.write(&LogEntry::new("a", "1")).unwrap();
    let second = vlog.write(&LogEntry::new("bb", "22")).unwrap();

    assert_eq!(second.offset, first.offset + first.size as i64);
}

#[test]
fn test_read_nil_position_is_no_value() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);

    assert_eq!(vlog.read_value(None).unwrap(), None);
}

#[test]
fn test_read_unknown_segment_fails() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);

    let pos = ValuePos { fid: 42, offset: 0, size: 100 };
    let result = vlog.read_value(Some(&pos));

    assert!(matches!(result, Err(TideError::SegmentNotFound(42))));
}

#[test]
fn test_twenty_writes_of_100_bytes_make_two_segments() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);

    let positions: Vec<ValuePos> = (0..20)
        .map(|i| vlog.write(&entry_100(i)).unwrap())
        .collect();

    assert_eq!(vlog.segment_ids(), vec![0, 1]);
    assert_eq!(vlog.active_segment_id(), Some(1));
    assert!(positions[..10].iter().all(|p| p.fid == 0));
    assert!(positions[10..].iter().all(|p| p.fid == 1));

    for (i, pos) in positions.iter().enumerate() {
        let value = vlog.read_value(Some(pos)).unwrap().unwrap();
        assert_eq!(value, entry_100(i).value);
    }
}

#[test]
fn test_failed_rotation_keeps_old_segment_active() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);
    let positions: Vec<ValuePos> = (0..10)
        .map(|i| vlog.write(&entry_100(i)).unwrap())
        .collect();

    // Segment 1 cannot be created while a directory holds its name
    fs::create_dir(temp.path().join("1.vlog")).unwrap();

    assert!(vlog.write(&entry_100(10)).is_err());
    assert_eq!(vlog.active_segment_id(), Some(0));
    assert_eq!(vlog.segment_ids(), vec![0]);

    // Segment 0 still has room for a small entry and is not sealed
    let small = vlog.write(&LogEntry::new("k", "v")).unwrap();
    assert_eq!(small.fid, 0);
    assert_eq!(small.offset, 1000);
    assert_eq!(vlog.read_value(Some(&small)).unwrap().unwrap(), "v");
    assert_eq!(
        vlog.read_value(Some(&positions[9])).unwrap().unwrap(),
        entry_100(9).value
    );
}

#[test]
fn test_positions_survive_reopen() {
    let temp = setup_temp_dir();
    let positions: Vec<ValuePos> = {
        let vlog = open_log(temp.path(), 1024);
        let positions = (0..25).map(|i| vlog.write(&entry_100(i)).unwrap()).collect();
        vlog.close().unwrap();
        positions
    };

    let vlog = open_log(temp.path(), 1024);
    assert_eq!(vlog.segment_ids(), vec![0, 1, 2]);

    for (i, pos) in positions.iter().enumerate() {
        let value = vlog.read_value(Some(pos)).unwrap().unwrap();
        assert_eq!(value, entry_100(i).value);
    }
    // Segments 0 and 1 were bound on first read
    assert_eq!(vlog.open_segment_count(), 2);
}

#[test]
fn test_reopen_resumes_after_last_entry() {
    let temp = setup_temp_dir();
    let first = {
        let vlog = open_log(temp.path(), 1024 * 1024);
        let pos = vlog.write(&LogEntry::new("k1", "v1")).unwrap();
        vlog.close().unwrap();
        pos
    };

    let vlog = open_log(temp.path(), 1024 * 1024);
    let second = vlog.write(&LogEntry::new("k2", "v2")).unwrap();

    assert_eq!(second.offset, first.offset + first.size as i64);
    assert_eq!(vlog.read_value(Some(&first)).unwrap().unwrap(), "v1");
    assert_eq!(vlog.read_value(Some(&second)).unwrap().unwrap(), "v2");
}

#[test]
fn test_reopen_ignores_torn_tail() {
    let temp = setup_temp_dir();
    let first = {
        let vlog = open_log(temp.path(), 1024 * 1024);
        let pos = vlog.write(&LogEntry::new("k1", "v1")).unwrap();
        vlog.close().unwrap();
        pos
    };

    // Half-written header at the end of the active segment
    let mut file = OpenOptions::new()
        .append(true)
        .open(Segment::path_for(temp.path(), 0, FileKind::ValueLog))
        .unwrap();
    file.write_all(&[0xAB; 7]).unwrap();
    drop(file);

    let vlog = open_log(temp.path(), 1024 * 1024);
    let second = vlog.write(&LogEntry::new("k2", "v2")).unwrap();

    assert_eq!(second.offset, first.offset + first.size as i64);
    assert_eq!(vlog.read_value(Some(&second)).unwrap().unwrap(), "v2");
}

#[test]
fn test_reopen_ignores_garbage_header_at_tail() {
    let temp = setup_temp_dir();
    let first = {
        let vlog = open_log(temp.path(), 1024 * 1024);
        let pos = vlog.write(&LogEntry::new("k1", "v1")).unwrap();
        vlog.close().unwrap();
        pos
    };

    // A full header whose lengths claim gigabytes of body
    let mut file = OpenOptions::new()
        .append(true)
        .open(Segment::path_for(temp.path(), 0, FileKind::ValueLog))
        .unwrap();
    file.write_all(&[0xFF; 20]).unwrap();
    drop(file);

    let vlog = open_log(temp.path(), 1024 * 1024);
    let second = vlog.write(&LogEntry::new("k2", "v2")).unwrap();

    assert_eq!(second.offset, first.offset + first.size as i64);
    assert_eq!(vlog.read_value(Some(&first)).unwrap().unwrap(), "v1");
    assert_eq!(vlog.read_value(Some(&second)).unwrap().unwrap(), "v2");
}

#[test]
fn test_read_at_misaligned_offset_is_corruption() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024 * 1024);
    let pos = vlog.write(&LogEntry::new("k", vec![0xFF; 64])).unwrap();

    // Lands inside the value, where every header byte reads as 0xFF
    let inside = ValuePos { offset: pos.offset + 30, ..pos };
    let result = vlog.read_value(Some(&inside));

    assert!(matches!(result, Err(TideError::Corruption(_))));
}

#[test]
fn test_read_with_wrong_size_is_corruption() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024 * 1024);
    let pos = vlog.write(&LogEntry::new("k1", "v1")).unwrap();

    let wrong = ValuePos { size: pos.size + 1, ..pos };
    let result = vlog.read_value(Some(&wrong));

    assert!(matches!(result, Err(TideError::Corruption(_))));
    assert_eq!(vlog.read_value(Some(&pos)).unwrap().unwrap(), "v1");
}

// =============================================================================
// Expiry Tests
// =============================================================================

#[test]
fn test_expired_entry_reads_as_no_value() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024 * 1024);

    let pos = vlog
        .write(&LogEntry::with_expiry("k", "v", now_unix() - 10))
        .unwrap();

    assert_eq!(vlog.read_value(Some(&pos)).unwrap(), None);
}

#[test]
fn test_future_expiry_is_readable() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024 * 1024);

    let pos = vlog
        .write(&LogEntry::with_expiry("k", "v", now_unix() + 3600))
        .unwrap();

    assert_eq!(vlog.read_value(Some(&pos)).unwrap().unwrap(), "v");
}

#[test]
fn test_zero_expiry_never_expires() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024 * 1024);

    let pos = vlog.write(&LogEntry::with_expiry("k", "v", 0)).unwrap();

    assert_eq!(vlog.read_value(Some(&pos)).unwrap().unwrap(), "v");
}

// =============================================================================
// Sync / Close Tests
// =============================================================================

#[test]
fn test_sync_active_segment() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);

    vlog.write(&LogEntry::new("k", "v")).unwrap();
    vlog.sync().unwrap();
}

#[test]
fn test_operations_after_close_fail() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);
    vlog.close().unwrap();

    assert!(matches!(vlog.sync(), Err(TideError::NoActiveSegment)));
    assert!(matches!(vlog.close(), Err(TideError::NoActiveSegment)));
    assert!(matches!(
        vlog.write(&LogEntry::new("k", "v")),
        Err(TideError::NoActiveSegment)
    ));
    assert_eq!(vlog.active_segment_id(), None);
}

#[test]
fn test_close_releases_closed_segment_handles() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 1024);
    for i in 0..30 {
        vlog.write(&entry_100(i)).unwrap();
    }
    assert!(vlog.open_segment_count() > 0);

    vlog.close().unwrap();

    assert_eq!(vlog.open_segment_count(), 0);
}

// =============================================================================
// Lazy Opening / Eviction Tests
// =============================================================================

#[test]
fn test_open_segment_handles_are_bounded() {
    let temp = setup_temp_dir();
    let config = Config::builder()
        .data_dir(temp.path())
        .block_size(1024)
        .max_open_segments(2)
        .build();
    let vlog = ValueLog::open(config).unwrap();

    let positions: Vec<ValuePos> = (0..50).map(|i| vlog.write(&entry_100(i)).unwrap()).collect();
    assert_eq!(vlog.segment_ids(), vec![0, 1, 2, 3, 4]);
    assert!(vlog.open_segment_count() <= 2);

    for (i, pos) in positions.iter().enumerate() {
        let value = vlog.read_value(Some(pos)).unwrap().unwrap();
        assert_eq!(value, entry_100(i).value);
        assert!(vlog.open_segment_count() <= 2);
    }
}

#[test]
fn test_missing_closed_segment_is_not_recreated() {
    let temp = setup_temp_dir();
    let positions: Vec<ValuePos> = {
        let vlog = open_log(temp.path(), 1024);
        let positions = (0..15).map(|i| vlog.write(&entry_100(i)).unwrap()).collect();
        vlog.close().unwrap();
        positions
    };

    let vlog = open_log(temp.path(), 1024);
    assert_eq!(vlog.segment_ids(), vec![0, 1]);
    let path = Segment::path_for(temp.path(), 0, FileKind::ValueLog);
    fs::remove_file(&path).unwrap();

    let result = vlog.read_value(Some(&positions[0]));

    assert!(matches!(result, Err(TideError::SegmentNotFound(0))));
    assert!(!path.exists());
    assert_eq!(vlog.open_segment_count(), 0);
}

// =============================================================================
// Memory-mapped I/O Tests
// =============================================================================

#[test]
fn test_mmap_rotation_and_reopen() {
    let temp = setup_temp_dir();
    let positions: Vec<ValuePos> = {
        let vlog = open_mmap_log(temp.path(), 1024);
        let positions = (0..20).map(|i| vlog.write(&entry_100(i)).unwrap()).collect();
        assert_eq!(vlog.segment_ids(), vec![0, 1]);
        vlog.close().unwrap();
        positions
    };

    // Mapped files are pre-sized to the block size
    let len = fs::metadata(temp.path().join("0.vlog")).unwrap().len();
    assert_eq!(len, 1024);

    let vlog = open_mmap_log(temp.path(), 1024);
    for (i, pos) in positions.iter().enumerate() {
        let value = vlog.read_value(Some(pos)).unwrap().unwrap();
        assert_eq!(value, entry_100(i).value);
    }

    // Cursor recovered at 1000, so the next write rotates
    let next = vlog.write(&entry_100(20)).unwrap();
    assert_eq!(next.fid, 2);
}

// =============================================================================
// ValuePos Tests
// =============================================================================

#[test]
fn test_value_pos_encoding() {
    let pos = ValuePos { fid: 7, offset: 4096, size: 128 };

    let bytes = pos.encode().unwrap();

    assert_eq!(ValuePos::decode(&bytes).unwrap(), pos);
    assert!(matches!(
        ValuePos::decode(&bytes[..3]),
        Err(TideError::Serialization(_))
    ));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let temp = setup_temp_dir();
    let vlog = open_log(temp.path(), 4096);

    let positions: Vec<(usize, ValuePos)> = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let vlog = &vlog;
                s.spawn(move |_| {
                    (0..50)
                        .map(|i| {
                            let n = t * 50 + i;
                            let pos = vlog.write(&entry_100(n)).unwrap();
                            // Read back immediately, racing other writers' rotations
                            let value = vlog.read_value(Some(&pos)).unwrap().unwrap();
                            assert_eq!(value, entry_100(n).value);
                            (n, pos)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    })
    .unwrap();

    let unique: HashSet<(u32, i64)> = positions.iter().map(|(_, p)| (p.fid, p.offset)).collect();
    assert_eq!(unique.len(), 200);

    // Rotation ids are consecutive
    let ids = vlog.segment_ids();
    let expected: Vec<u32> = (0..ids.len() as u32).collect();
    assert_eq!(ids, expected);

    for (n, pos) in &positions {
        assert_eq!(vlog.read_value(Some(pos)).unwrap().unwrap(), entry_100(*n).value);
    }
}
