use super::*;
use crate::emotion::{Emotion, EmotionSample, EmotionVector};
use crate::error::StorageError;
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

fn sample(seconds: i64, dominant: Emotion) -> EmotionSample {
    EmotionSample::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds),
        EmotionVector::from_pairs([(dominant, 0.75), (Emotion::Neutral, 0.125)]),
    )
}

#[tokio::test]
async fn test_missing_log_loads_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::new(temp_dir.path().join("emotions.csv"));

    assert!(store.load_all().await.unwrap().is_empty());
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_append_then_load_preserves_order() {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::new(temp_dir.path().join("data").join("emotions.csv"));

    let first = vec![sample(0, Emotion::Happy), sample(1, Emotion::Sad)];
    let second = vec![sample(2, Emotion::Fear)];
    store.append(&first).await.unwrap();
    store.append(&second).await.unwrap();

    let loaded = store.load_all().await.unwrap();
    let expected: Vec<EmotionSample> = first.into_iter().chain(second).collect();
    assert_eq!(loaded, expected);

    let text = std::fs::read_to_string(store.path()).unwrap();
    assert_eq!(text.matches("timestamp,").count(), 1, "header written once");

    let stats = store.stats();
    assert_eq!(stats.appends, 2);
    assert_eq!(stats.rows_written, 3);
}

#[tokio::test]
async fn test_empty_append_creates_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::new(temp_dir.path().join("emotions.csv"));

    store.append(&[]).await.unwrap();
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_load_recent_returns_tail() {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::new(temp_dir.path().join("emotions.csv"));

    let samples: Vec<EmotionSample> = (0..6).map(|i| sample(i, Emotion::Happy)).collect();
    store.append(&samples).await.unwrap();

    assert_eq!(store.load_recent(2).await.unwrap(), samples[4..].to_vec());
    assert_eq!(store.load_recent(100).await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_concurrent_appends_keep_every_row() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(RecordStore::new(temp_dir.path().join("emotions.csv")));

    let batch_a: Vec<EmotionSample> = (0..50).map(|i| sample(i, Emotion::Happy)).collect();
    let batch_b: Vec<EmotionSample> = (100..150).map(|i| sample(i, Emotion::Angry)).collect();

    let task_a = {
        let store = Arc::clone(&store);
        let batch = batch_a.clone();
        tokio::spawn(async move { store.append(&batch).await })
    };
    let task_b = {
        let store = Arc::clone(&store);
        let batch = batch_b.clone();
        tokio::spawn(async move { store.append(&batch).await })
    };
    task_a.await.unwrap().unwrap();
    task_b.await.unwrap().unwrap();

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded.len(), 100);

    // Each batch lands contiguously and in its own order
    let happy: Vec<EmotionSample> = loaded
        .iter()
        .filter(|s| s.dominant_emotion() == Emotion::Happy)
        .cloned()
        .collect();
    let angry: Vec<EmotionSample> = loaded
        .iter()
        .filter(|s| s.dominant_emotion() == Emotion::Angry)
        .cloned()
        .collect();
    assert_eq!(happy, batch_a);
    assert_eq!(angry, batch_b);
    assert!(loaded[..50] == batch_a[..] || loaded[..50] == batch_b[..]);
}

#[tokio::test]
async fn test_unwritable_path_reports_write_error() {
    let temp_dir = TempDir::new().unwrap();
    // The log path is a directory, so opening it for append fails
    let store = RecordStore::new(temp_dir.path());

    let err = store.append(&[sample(0, Emotion::Happy)]).await.unwrap_err();
    assert!(matches!(err, StorageError::Write { .. }));
    assert_eq!(store.stats().failed_appends, 1);
}

#[tokio::test]
async fn test_failed_append_leaves_existing_rows() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    let store = RecordStore::new(&log_path);
    store.append(&[sample(0, Emotion::Sad)]).await.unwrap();

    // A second store whose parent "directory" is the existing log file
    let broken = RecordStore::new(log_path.join("nested.csv"));
    assert!(broken.append(&[sample(1, Emotion::Happy)]).await.is_err());

    assert_eq!(
        store.load_all().await.unwrap(),
        vec![sample(0, Emotion::Sad)]
    );
}

#[tokio::test]
async fn test_schema_mismatch_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    std::fs::write(&log_path, "time,mood\n2024-01-01,happy\n").unwrap();

    let store = RecordStore::new(&log_path);
    let err = store.load_all().await.unwrap_err();
    assert!(matches!(err, StorageError::Schema { .. }));
}

#[tokio::test]
async fn test_malformed_rows_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    std::fs::write(
        &log_path,
        concat!(
            "timestamp,angry,disgust,fear,happy,sad,surprise,neutral,dominant_emotion\n",
            "2024-03-01T10:00:00Z,0,0,0,0.9,0,0,0.1,happy\n",
            "garbage\n",
            "2024-03-01T10:00:01Z,0,0,0,0.2,0.8,0,0,sad\n",
            "2024-03-01T10:00:02Z,0,0,0,oops,0,0,0,happy\n",
        ),
    )
    .unwrap();

    let store = RecordStore::new(&log_path);
    let report = store.load_report().await.unwrap();
    assert_eq!(report.skipped_rows, 2);
    let labels: Vec<Emotion> = report
        .samples
        .iter()
        .map(|s| s.dominant_emotion())
        .collect();
    assert_eq!(labels, vec![Emotion::Happy, Emotion::Sad]);
}

#[tokio::test]
async fn test_torn_row_is_terminated_before_next_append() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    let store = RecordStore::new(&log_path);
    store.append(&[sample(0, Emotion::Happy)]).await.unwrap();

    // Simulate a crash part way through a row
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap();
        file.write_all(b"2023-11-14T22:13:21Z,0.1,0").unwrap();
    }

    store.append(&[sample(5, Emotion::Surprise)]).await.unwrap();

    let report = store.load_report().await.unwrap();
    assert_eq!(report.skipped_rows, 1);
    assert_eq!(
        report.samples,
        vec![sample(0, Emotion::Happy), sample(5, Emotion::Surprise)]
    );
}

fn set_aside_logs(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("emotions.csv.corrupt-"))
        })
        .collect()
}

#[tokio::test]
async fn test_torn_header_is_set_aside_before_append() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    // Crash during the very first write
    std::fs::write(&log_path, "timestamp,angry,dis").unwrap();

    let store = RecordStore::new(&log_path);
    let rows = vec![sample(0, Emotion::Happy), sample(1, Emotion::Sad)];
    store.append(&rows).await.unwrap();

    assert_eq!(store.load_all().await.unwrap(), rows);

    let moved = set_aside_logs(temp_dir.path());
    assert_eq!(moved.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&moved[0]).unwrap(),
        "timestamp,angry,dis"
    );

    // Later appends keep using the fresh log
    store.append(&[sample(2, Emotion::Fear)]).await.unwrap();
    assert_eq!(store.load_all().await.unwrap().len(), 3);
    assert_eq!(set_aside_logs(temp_dir.path()).len(), 1);
}

#[tokio::test]
async fn test_foreign_log_is_set_aside_before_append() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    std::fs::write(&log_path, "time,mood\n2024-01-01,happy\n").unwrap();

    let store = RecordStore::new(&log_path);
    store.append(&[sample(0, Emotion::Angry)]).await.unwrap();

    assert_eq!(
        store.load_all().await.unwrap(),
        vec![sample(0, Emotion::Angry)]
    );
    let moved = set_aside_logs(temp_dir.path());
    assert_eq!(moved.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&moved[0]).unwrap(),
        "time,mood\n2024-01-01,happy\n"
    );
}

#[tokio::test]
async fn test_blank_log_gets_a_header() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    std::fs::write(&log_path, "\n\n").unwrap();

    let store = RecordStore::new(&log_path);
    store.append(&[sample(0, Emotion::Happy)]).await.unwrap();

    assert_eq!(
        store.load_all().await.unwrap(),
        vec![sample(0, Emotion::Happy)]
    );
}

#[tokio::test]
async fn test_header_without_newline_is_kept() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("emotions.csv");
    std::fs::write(
        &log_path,
        "timestamp,angry,disgust,fear,happy,sad,surprise,neutral,dominant_emotion",
    )
    .unwrap();

    let store = RecordStore::new(&log_path);
    store.append(&[sample(0, Emotion::Sad)]).await.unwrap();

    let report = store.load_report().await.unwrap();
    assert_eq!(report.samples, vec![sample(0, Emotion::Sad)]);
    assert_eq!(report.skipped_rows, 0);
    assert!(set_aside_logs(temp_dir.path()).is_empty());
}
