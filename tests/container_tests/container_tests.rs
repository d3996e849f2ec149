//! Tests for Container
//!
//! These tests verify:
//! - Creating and reopening container files
//! - Appending and extracting entries
//! - CRC validation on extract
//! - Directory restore after a failed append
//! - Rejection of files that are not containers
//! - Discarding the last entry and rebuilding a damaged directory

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tempfile::TempDir;
use zixstore::container::{CompressionMode, Container, LOT_COMMENT};
use zixstore::ZixError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Size of an entry's local header (mode, name/comment lengths, data_len, crc)
const LOCAL_HEADER_LEN: u64 = 17;

fn setup_temp_container() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.zl.1");
    (temp_dir, path)
}

fn append_bytes(container: &mut Container, name: &str, data: &[u8]) {
    let mut source = data;
    container
        .append_entry(CompressionMode::Store, &mut source, name, "")
        .unwrap();
}

fn extract_bytes(container: &mut Container, name: &str) -> Vec<u8> {
    let entry = container.find(name).cloned().unwrap();
    let mut out = Vec::new();
    container.extract(&entry, &mut out).unwrap();
    out
}

/// Reader that yields some bytes, then fails
struct FailingReader {
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "source went away"));
        }
        let n = buf.len().min(self.remaining);
        buf[..n].fill(0xAB);
        self.remaining -= n;
        Ok(n)
    }
}

// =============================================================================
// Create/Open Tests
// =============================================================================

#[test]
fn test_create_empty_container() {
    let (_temp, path) = setup_temp_container();

    let container = Container::create(&path, LOT_COMMENT).unwrap();

    assert!(path.exists());
    assert!(container.entries().is_empty());
    assert_eq!(container.comment(), LOT_COMMENT);
    assert_eq!(container.size().unwrap(), fs::metadata(&path).unwrap().len());
}

#[test]
fn test_reopen_empty_container() {
    let (_temp, path) = setup_temp_container();
    Container::create(&path, LOT_COMMENT).unwrap().close().unwrap();

    let container = Container::open(&path).unwrap();

    assert!(container.entries().is_empty());
    assert_eq!(container.comment(), LOT_COMMENT);
}

#[test]
fn test_open_missing_file_fails() {
    let (_temp, path) = setup_temp_container();

    let result = Container::open(&path);

    assert!(matches!(result, Err(ZixError::Io(_))));
}

#[test]
fn test_open_tiny_file_fails() {
    let (_temp, path) = setup_temp_container();
    fs::write(&path, b"hello").unwrap();

    let result = Container::open_read(&path);

    assert!(matches!(result, Err(ZixError::Container(_))));
}

#[test]
fn test_open_garbage_file_fails() {
    let (_temp, path) = setup_temp_container();
    fs::write(&path, vec![0x42u8; 256]).unwrap();

    let result = Container::open_read(&path);

    assert!(matches!(result, Err(ZixError::Container(_))));
}

// =============================================================================
// Append/Extract Tests
// =============================================================================

#[test]
fn test_append_and_extract_single_entry() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();

    append_bytes(&mut container, "hello.txt", b"hello world");

    assert_eq!(container.entries().len(), 1);
    let entry = &container.entries()[0];
    assert_eq!(entry.name, "hello.txt");
    assert_eq!(entry.data_len, 11);
    assert_eq!(entry.crc, crc32fast::hash(b"hello world"));
    assert_eq!(entry.mode, CompressionMode::Store);

    assert_eq!(extract_bytes(&mut container, "hello.txt"), b"hello world");
}

#[test]
fn test_append_multiple_entries() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();

    for i in 0..10 {
        let data = format!("payload number {}", i).repeat(i + 1);
        append_bytes(&mut container, &format!("obj{}", i), data.as_bytes());
    }

    assert_eq!(container.entries().len(), 10);
    for i in 0..10 {
        let expected = format!("payload number {}", i).repeat(i + 1);
        assert_eq!(extract_bytes(&mut container, &format!("obj{}", i)), expected.as_bytes());
    }
}

#[test]
fn test_append_empty_entry() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();

    append_bytes(&mut container, "empty", b"");

    assert_eq!(container.entries()[0].data_len, 0);
    assert!(extract_bytes(&mut container, "empty").is_empty());
}

#[test]
fn test_entries_survive_reopen() {
    let (_temp, path) = setup_temp_container();
    {
        let mut container = Container::create(&path, LOT_COMMENT).unwrap();
        append_bytes(&mut container, "a", b"first");
        append_bytes(&mut container, "b", b"second");
        container.close().unwrap();
    }

    let mut container = Container::open_read(&path).unwrap();

    let names: Vec<&str> = container.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(extract_bytes(&mut container, "a"), b"first");
    assert_eq!(extract_bytes(&mut container, "b"), b"second");
}

#[test]
fn test_append_after_reopen() {
    let (_temp, path) = setup_temp_container();
    {
        let mut container = Container::create(&path, LOT_COMMENT).unwrap();
        append_bytes(&mut container, "a", b"first");
        container.close().unwrap();
    }
    {
        let mut container = Container::open(&path).unwrap();
        append_bytes(&mut container, "b", b"second");
        container.close().unwrap();
    }

    let mut container = Container::open_read(&path).unwrap();
    assert_eq!(container.entries().len(), 2);
    assert_eq!(extract_bytes(&mut container, "a"), b"first");
    assert_eq!(extract_bytes(&mut container, "b"), b"second");
}

#[test]
fn test_append_file() {
    let (temp, path) = setup_temp_container();
    let source = temp.path().join("source.bin");
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&source, &data).unwrap();

    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    let entry = container
        .append_file(CompressionMode::Store, &source, "big.bin", LOT_COMMENT)
        .unwrap();

    assert_eq!(entry.data_len, data.len() as u64);
    assert_eq!(extract_bytes(&mut container, "big.bin"), data);
}

#[test]
fn test_size_grows_with_entries() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    let empty_size = container.size().unwrap();

    append_bytes(&mut container, "blob", &[7u8; 4096]);

    assert!(container.size().unwrap() >= empty_size + 4096);
}

#[test]
fn test_find_missing_entry() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    append_bytes(&mut container, "present", b"x");

    assert!(container.find("present").is_some());
    assert!(container.find("absent").is_none());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_read_only_container_rejects_append() {
    let (_temp, path) = setup_temp_container();
    Container::create(&path, LOT_COMMENT).unwrap().close().unwrap();

    let mut container = Container::open_read(&path).unwrap();
    let mut source: &[u8] = b"data";
    let result = container.append_entry(CompressionMode::Store, &mut source, "x", "");

    assert!(matches!(result, Err(ZixError::Container(_))));
}

#[test]
fn test_empty_entry_name_rejected() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();

    let mut source: &[u8] = b"data";
    let result = container.append_entry(CompressionMode::Store, &mut source, "", "");

    assert!(matches!(result, Err(ZixError::Container(_))));
    assert!(container.entries().is_empty());
}

#[test]
fn test_extract_detects_corrupted_data() {
    let (_temp, path) = setup_temp_container();
    let entry = {
        let mut container = Container::create(&path, LOT_COMMENT).unwrap();
        let mut source: &[u8] = b"precious bytes";
        let entry = container
            .append_entry(CompressionMode::Store, &mut source, "doc", "c")
            .unwrap();
        container.close().unwrap();
        entry
    };

    // Flip the first data byte: local header (17) + name + comment
    let data_offset = entry.offset + 17 + "doc".len() as u64 + "c".len() as u64;
    {
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(data_offset)).unwrap();
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte).unwrap();
        file.seek(SeekFrom::Start(data_offset)).unwrap();
        file.write_all(&[byte[0] ^ 0xFF]).unwrap();
    }

    let mut container = Container::open_read(&path).unwrap();
    let entry = container.find("doc").cloned().unwrap();
    let result = container.extract(&entry, &mut Vec::new());

    assert!(matches!(result, Err(ZixError::Container(_))));
}

#[test]
fn test_corrupted_directory_detected_on_open() {
    let (_temp, path) = setup_temp_container();
    {
        let mut container = Container::create(&path, LOT_COMMENT).unwrap();
        append_bytes(&mut container, "doc", b"abc");
        container.close().unwrap();
    }

    // Directory starts right after the only entry; its first byte is the
    // low byte of that entry's offset.
    let len = fs::metadata(&path).unwrap().len();
    {
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(len - 24)).unwrap();
        let mut footer = [0u8; 8];
        file.read_exact(&mut footer).unwrap();
        let dir_offset = u64::from_le_bytes(footer);
        file.seek(SeekFrom::Start(dir_offset)).unwrap();
        file.write_all(&[0xEE]).unwrap();
    }

    let result = Container::open_read(&path);

    assert!(matches!(result, Err(ZixError::Container(_))));
}

// =============================================================================
// Failure Recovery Tests
// =============================================================================

#[test]
fn test_failed_append_keeps_previous_entries() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    append_bytes(&mut container, "keep", b"still here");
    let size_before = container.size().unwrap();

    let mut failing = FailingReader { remaining: 100_000 };
    let result = container.append_entry(CompressionMode::Store, &mut failing, "broken", "");

    assert!(matches!(result, Err(ZixError::Io(_))));
    assert_eq!(container.entries().len(), 1);
    assert_eq!(container.size().unwrap(), size_before);
    container.close().unwrap();

    // The file on disk is still a valid container with the old entry
    let mut reopened = Container::open_read(&path).unwrap();
    assert_eq!(reopened.entries().len(), 1);
    assert!(reopened.find("broken").is_none());
    assert_eq!(extract_bytes(&mut reopened, "keep"), b"still here");
}

#[test]
fn test_append_works_after_failed_append() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();

    let mut failing = FailingReader { remaining: 10 };
    assert!(container
        .append_entry(CompressionMode::Store, &mut failing, "broken", "")
        .is_err());

    append_bytes(&mut container, "ok", b"fine");

    assert_eq!(container.entries().len(), 1);
    assert_eq!(extract_bytes(&mut container, "ok"), b"fine");
}

#[test]
fn test_discard_last_entry() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    append_bytes(&mut container, "keep", b"stays");
    let size_before = container.size().unwrap();

    let mut source = &b"goes away"[..];
    let entry = container
        .append_entry(CompressionMode::Store, &mut source, "drop", "")
        .unwrap();
    container.discard_last_entry(&entry).unwrap();

    assert_eq!(container.entries().len(), 1);
    assert_eq!(container.size().unwrap(), size_before);

    // The next append reuses the space
    append_bytes(&mut container, "next", b"after discard");
    container.close().unwrap();

    let mut reopened = Container::open_read(&path).unwrap();
    assert!(reopened.find("drop").is_none());
    assert_eq!(extract_bytes(&mut reopened, "keep"), b"stays");
    assert_eq!(extract_bytes(&mut reopened, "next"), b"after discard");
}

#[test]
fn test_discard_rejects_earlier_entry() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    append_bytes(&mut container, "first", b"1");
    append_bytes(&mut container, "second", b"2");

    let first = container.find("first").cloned().unwrap();
    let result = container.discard_last_entry(&first);

    assert!(matches!(result, Err(ZixError::Container(_))));
    assert_eq!(container.entries().len(), 2);
}

// =============================================================================
// Repair Tests
// =============================================================================

#[test]
fn test_repair_rebuilds_missing_footer() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    append_bytes(&mut container, "a", b"alpha");
    append_bytes(&mut container, "b", b"bravo");
    container.close().unwrap();

    // Lose the tail of the directory block
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 5).unwrap();
    assert!(matches!(Container::open(&path), Err(ZixError::Container(_))));

    let mut repaired = Container::repair(&path).unwrap();
    assert_eq!(repaired.entries().len(), 2);
    assert_eq!(extract_bytes(&mut repaired, "b"), b"bravo");
    repaired.close().unwrap();

    let mut reopened = Container::open(&path).unwrap();
    assert_eq!(extract_bytes(&mut reopened, "a"), b"alpha");
    append_bytes(&mut reopened, "c", b"charlie");
    assert_eq!(reopened.entries().len(), 3);
}

#[test]
fn test_repair_drops_torn_entry() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    append_bytes(&mut container, "a", b"alpha");
    append_bytes(&mut container, "b", b"bravo");
    append_bytes(&mut container, "c", &[7u8; 4096]);
    let torn = container.find("c").cloned().unwrap();
    container.close().unwrap();

    // Crash partway through the third entry's data
    let cut = torn.offset + LOCAL_HEADER_LEN + 1 + 100;
    OpenOptions::new().write(true).open(&path).unwrap().set_len(cut).unwrap();

    let mut repaired = Container::repair(&path).unwrap();
    let names: Vec<_> = repaired.entries().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(extract_bytes(&mut repaired, "a"), b"alpha");
    assert!(repaired.size().unwrap() < cut);
}

#[test]
fn test_repair_drops_unpatched_header() {
    let (_temp, path) = setup_temp_container();
    let mut container = Container::create(&path, LOT_COMMENT).unwrap();
    append_bytes(&mut container, "a", b"alpha");
    append_bytes(&mut container, "b", b"");
    let torn = container.find("b").cloned().unwrap();
    container.close().unwrap();

    // Crash before the header's length and CRC were patched
    let cut = torn.offset + LOCAL_HEADER_LEN + 1;
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(cut).unwrap();
    file.seek(SeekFrom::Start(torn.offset + 5)).unwrap();
    file.write_all(&0u64.to_le_bytes()).unwrap();
    file.write_all(&u32::MAX.to_le_bytes()).unwrap();
    drop(file);

    let repaired = Container::repair(&path).unwrap();
    assert_eq!(repaired.entries().len(), 1);
    assert!(repaired.find("b").is_none());
}

#[test]
fn test_repair_rejects_foreign_file() {
    let (_temp, path) = setup_temp_container();
    fs::write(&path, b"definitely not a container file").unwrap();

    assert!(matches!(Container::repair(&path), Err(ZixError::Container(_))));
}
