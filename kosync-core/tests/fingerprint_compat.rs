//! File-level fingerprint behaviour.
//!
//! These tests exercise fingerprints of real files on disk: which edits a
//! content fingerprint notices, how renames affect the name fingerprint, and
//! a pinned digest for a multi-megabyte file so the sampling scheme cannot
//! drift from what the client computes.

use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use kosync_core::{
    content_fingerprint_of_file, name_fingerprint_of_path, FingerprintError, SAMPLE_OFFSETS,
};
use tempfile::TempDir;

const FIVE_MIB: usize = 5 * 1024 * 1024;

fn write_patterned(path: &Path, len: usize) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    fs::write(path, data).unwrap();
}

fn flip_byte(path: &Path, offset: u64) {
    let mut file = fs::OpenOptions::new().read(true).write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    let mut byte = [0u8; 1];
    std::io::Read::read_exact(&mut file, &mut byte).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[byte[0] ^ 0xFF]).unwrap();
}

#[tokio::test]
async fn test_pinned_digest_for_large_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("large.pdf");
    write_patterned(&path, FIVE_MIB);

    // Eight windows fit in 5 MiB: 0 through 4 MiB.
    let sampled = SAMPLE_OFFSETS.iter().filter(|&&o| o < FIVE_MIB as u64).count();
    assert_eq!(sampled, 8);

    let fingerprint = content_fingerprint_of_file(&path).await.unwrap();
    assert_eq!(fingerprint.as_str(), "94c784935ab8dda597646e9bc916bbad");
}

#[tokio::test]
async fn test_edit_inside_window_changes_fingerprint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("book.epub");
    write_patterned(&path, 300_000);
    let before = content_fingerprint_of_file(&path).await.unwrap();

    flip_byte(&path, 65536 + 10);
    let after = content_fingerprint_of_file(&path).await.unwrap();

    assert_ne!(before, after);
}

#[tokio::test]
async fn test_edit_outside_windows_is_invisible() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("book.epub");
    write_patterned(&path, 300_000);
    let before = content_fingerprint_of_file(&path).await.unwrap();

    flip_byte(&path, 100_000);
    let after = content_fingerprint_of_file(&path).await.unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_rename_keeps_content_changes_name() {
    let dir = TempDir::new().unwrap();
    let original = dir.path().join("book.epub");
    write_patterned(&original, 20_000);
    let content_before = content_fingerprint_of_file(&original).await.unwrap();
    let name_before = name_fingerprint_of_path(&original).unwrap();

    let renamed = dir.path().join("Book.epub");
    fs::rename(&original, &renamed).unwrap();
    let content_after = content_fingerprint_of_file(&renamed).await.unwrap();
    let name_after = name_fingerprint_of_path(&renamed).unwrap();

    assert_eq!(content_before, content_after);
    assert_ne!(name_before, name_after);
}

#[tokio::test]
async fn test_empty_file_has_no_content_fingerprint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.epub");
    fs::write(&path, b"").unwrap();

    let err = content_fingerprint_of_file(&path).await.unwrap_err();
    assert!(matches!(err, FingerprintError::NoSamples));
}

#[tokio::test]
async fn test_missing_file_reports_io_error() {
    let dir = TempDir::new().unwrap();
    let err = content_fingerprint_of_file(dir.path().join("absent.epub"))
        .await
        .unwrap_err();
    assert!(matches!(err, FingerprintError::Io(_)));
}
