use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use pagedkv::config::JournalSync;
use pagedkv::store::journal::{JournalEntry, JournalReader, JournalRecovery, JournalWriter, Mutation, HEADER_SIZE};
use pagedkv::{EntityKey, PagedKvError};
use tempfile::TempDir;

use crate::entity;

fn setup_temp_journal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.journal");
    (temp_dir, path)
}

fn write_entries(path: &PathBuf, count: i64) {
    let mut writer = JournalWriter::open(path, JournalSync::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(vec![Mutation::Put(entity("k", &format!("e{}", i), i))])
            .unwrap();
    }
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_frame_size() {
    let entry = JournalEntry::new(1, vec![Mutation::Delete(EntityKey::new("k", "gone"))]);

    let frame = entry.serialize().unwrap();

    assert_eq!(frame.len(), entry.serialized_size().unwrap());
    assert!(frame.len() > HEADER_SIZE);
    assert_eq!(JournalEntry::deserialize(&frame).unwrap(), entry);
}

#[test]
fn test_entry_detects_flipped_bit() {
    let entry = JournalEntry::new(7, vec![Mutation::Put(entity("k", "a", 1))]);
    let mut frame = entry.serialize().unwrap();

    let last = frame.len() - 1;
    frame[last] ^= 0x01;

    assert!(matches!(
        JournalEntry::deserialize(&frame),
        Err(PagedKvError::JournalCorruption(_))
    ));
}

// =============================================================================
// Writer / Reader Tests
// =============================================================================

#[test]
fn test_lsns_are_sequential() {
    let (_temp, path) = setup_temp_journal();
    let mut writer = JournalWriter::open(&path, JournalSync::EveryNEntries { count: 10 }).unwrap();

    assert_eq!(writer.append(vec![]).unwrap(), 1);
    assert_eq!(writer.append(vec![]).unwrap(), 2);
    assert_eq!(writer.current_lsn(), 3);
}

#[test]
fn test_reader_returns_entries_in_order() {
    let (_temp, path) = setup_temp_journal();
    write_entries(&path, 5);

    let entries: Vec<JournalEntry> = JournalReader::open(&path)
        .unwrap()
        .entries()
        .collect::<pagedkv::Result<_>>()
        .unwrap();

    assert_eq!(entries.len(), 5);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, i as u64 + 1);
        assert_eq!(
            entry.mutations,
            vec![Mutation::Put(entity("k", &format!("e{}", i), i as i64))]
        );
    }
}

#[test]
fn test_resume_continues_lsns() {
    let (_temp, path) = setup_temp_journal();
    write_entries(&path, 3);

    let mut writer = JournalWriter::resume(&path, JournalSync::EveryWrite, 4).unwrap();
    assert_eq!(writer.append(vec![]).unwrap(), 4);
    drop(writer);

    let result = JournalRecovery::verify(&path).unwrap();
    assert_eq!(result.entries_recovered, 4);
    assert_eq!(result.last_lsn, 4);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recovery_of_clean_journal() {
    let (_temp, path) = setup_temp_journal();
    write_entries(&path, 3);

    let (entries, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.entries_corrupted, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recovery_truncates_torn_tail() {
    let (_temp, path) = setup_temp_journal();
    write_entries(&path, 3);
    let valid_len = std::fs::metadata(&path).unwrap().len();

    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 5]).unwrap();
    }

    let (entries, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_lsn, 3);
    assert_eq!(result.entries_corrupted, 1);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), valid_len);
}

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, path) = setup_temp_journal();
    write_entries(&path, 2);
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x01; 3]).unwrap();
    }
    let len = std::fs::metadata(&path).unwrap().len();

    let result = JournalRecovery::verify(&path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
}
