//! Integration tests for CheckpointStore
//!
//! These tests verify:
//! - Saved snapshots drive change detection on the next load
//! - "latest" selection across several titles
//! - Soft failure for missing, foreign and corrupt checkpoints
//! - Concurrent snapshot recording

use camino::Utf8PathBuf;
use chrono::{Local, TimeZone};
use pakexport::services::checkpoint::{CHECKPOINT_EXTENSION, LATEST};
use pakexport::services::{CheckpointStore, Snapshot};
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn create_test_store() -> (TempDir, CheckpointStore) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().join("checkpoints")).unwrap();
    (temp_dir, CheckpointStore::new(dir))
}

fn snapshot(entries: &[(&str, u64)]) -> Snapshot {
    let snapshot = Snapshot::new();
    for (path, size) in entries {
        snapshot.record(path, *size);
    }
    snapshot
}

#[test]
fn test_saved_snapshot_classifies_next_run() {
    let (_temp_dir, store) = create_test_store();

    let path = store
        .save(&snapshot(&[("Game/a.ini", 10), ("Game/b.ini", 20)]), "Game")
        .unwrap();
    assert_eq!(path.extension(), Some(CHECKPOINT_EXTENSION));
    assert!(path.file_name().unwrap().starts_with("Game "));

    let checkpoint = store.load(Some(path.as_str()), "Game");
    assert!(checkpoint.is_active());
    assert_eq!(checkpoint.len(), 2);
    assert!(!checkpoint.is_changed("Game/a.ini", 10));
    assert!(checkpoint.is_changed("Game/b.ini", 21));
    assert!(checkpoint.is_changed("Game/new.ini", 1));
}

#[test]
fn test_latest_ignores_other_titles() {
    let (_temp_dir, store) = create_test_store();

    let older = Local.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).earliest().unwrap();
    let newer = Local.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).earliest().unwrap();
    let newest_other = Local.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).earliest().unwrap();

    store.save_at(&snapshot(&[("a", 1)]), "Alpha", older).unwrap();
    let expected = store.save_at(&snapshot(&[("a", 2)]), "Alpha", newer).unwrap();
    store.save_at(&snapshot(&[("b", 3)]), "Beta", newest_other).unwrap();

    assert_eq!(store.find_latest("Alpha").unwrap(), expected);

    let checkpoint = store.load(Some(LATEST), "Alpha");
    assert!(checkpoint.is_active());
    assert!(!checkpoint.is_changed("a", 2));
    assert!(checkpoint.is_changed("a", 1));
}

#[test]
fn test_latest_is_case_insensitive_identifier() {
    let (_temp_dir, store) = create_test_store();
    store.save(&snapshot(&[("a", 1)]), "Alpha").unwrap();

    assert!(store.load(Some("LATEST"), "Alpha").is_active());
}

#[test]
fn test_latest_for_unknown_title_disables_detection() {
    let (_temp_dir, store) = create_test_store();
    store.save(&snapshot(&[("a", 1)]), "Alpha").unwrap();

    let checkpoint = store.load(Some(LATEST), "Gamma");
    assert!(!checkpoint.is_active());
    assert!(checkpoint.is_changed("a", 1));
}

#[test]
fn test_missing_and_corrupt_files_degrade() {
    let (_temp_dir, store) = create_test_store();

    assert!(!store.load(Some("nope.ckpt"), "Alpha").is_active());
    assert!(!store.load(None, "Alpha").is_active());
    assert!(!store.load(Some(""), "Alpha").is_active());

    fs::create_dir_all(store.dir()).unwrap();
    fs::write(store.dir().join("Alpha broken.ckpt"), "[1, 2, 3]").unwrap();
    assert!(!store.load(Some("Alpha broken.ckpt"), "Alpha").is_active());
}

#[test]
fn test_list_only_returns_checkpoint_files() {
    let (_temp_dir, store) = create_test_store();
    assert!(store.list().unwrap().is_empty());

    store.save(&snapshot(&[("a", 1)]), "Alpha").unwrap();
    fs::write(store.dir().join("readme.txt"), "not a checkpoint").unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].extension(), Some(CHECKPOINT_EXTENSION));
}

#[test]
fn test_snapshot_concurrent_recording() {
    let snapshot = Arc::new(Snapshot::new());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let snapshot = Arc::clone(&snapshot);
            thread::spawn(move || {
                for i in 0..250u64 {
                    snapshot.record(&format!("w{}/f{}", worker, i), i);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(snapshot.len(), 2000);
    assert_eq!(snapshot.get("w3/f17"), Some(17));

    let sorted = snapshot.to_sorted();
    assert_eq!(sorted.len(), 2000);
    assert!(sorted.keys().zip(sorted.keys().skip(1)).all(|(a, b)| a < b));
}
