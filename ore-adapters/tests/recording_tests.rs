//! Integration tests for recording and playback

use chrono::{Duration, Utc};
use ore_adapters::{DemoAdapter, Recording, RecordingAdapter, RecordingWriter};
use ore_core::adapter::FrameAdapter;
use ore_core::Frame;
use std::path::Path;
use tempfile::TempDir;

/// Record `count` demo frames to `path` and return the frames as converted
fn record_demo(path: &Path, count: usize) -> Vec<Frame> {
    let mut demo = DemoAdapter::new();
    let mut writer = RecordingWriter::create(path).expect("create recording");
    let start = Utc::now();
    let mut expected = Vec::new();
    for i in 0..count {
        let raw = demo.next_raw();
        let timestamp = start + Duration::milliseconds(i as i64 * 16);
        writer.write(timestamp, &raw).unwrap();
        expected.push(Frame::from_raw(&raw, timestamp));
    }
    assert_eq!(writer.finish().unwrap(), count);
    expected
}

fn play_all(adapter: &mut RecordingAdapter) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = adapter.read_frame().unwrap() {
        frames.push(frame);
    }
    frames
}

#[test]
fn test_plain_recording_plays_back_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.ndjson");
    let expected = record_demo(&path, 240);

    let mut adapter = RecordingAdapter::new(&path);
    assert!(adapter.detect());
    adapter.start().unwrap();
    assert_eq!(adapter.remaining(), Some(240));

    let played = play_all(&mut adapter);
    assert_eq!(played, expected);
    assert_eq!(adapter.remaining(), Some(0));
}

#[test]
fn test_compressed_recording_round_trip() {
    let dir = TempDir::new().unwrap();
    let plain = dir.path().join("size.ndjson");
    let compressed = dir.path().join("size.ndjson.zst");
    let expected = record_demo(&compressed, 300);
    record_demo(&plain, 300);

    let recording = Recording::open(&compressed).unwrap();
    assert_eq!(recording.len(), 300);

    let plain_size = std::fs::metadata(&plain).unwrap().len();
    let compressed_size = std::fs::metadata(&compressed).unwrap().len();
    assert!(compressed_size < plain_size / 4);

    let mut adapter = RecordingAdapter::new(&compressed);
    adapter.start().unwrap();
    assert_eq!(play_all(&mut adapter), expected);
}

#[test]
fn test_looping_playback_restarts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loop.ndjson");
    record_demo(&path, 3);

    let mut adapter = RecordingAdapter::new(&path).looping(true);
    adapter.start().unwrap();
    let first = adapter.read_frame().unwrap().unwrap();
    for _ in 0..2 {
        adapter.read_frame().unwrap().unwrap();
    }
    let wrapped = adapter.read_frame().unwrap().unwrap();
    assert_eq!(first, wrapped);
}

#[test]
fn test_missing_recording() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("does-not-exist.ndjson");
    let mut adapter = RecordingAdapter::new(&path);
    assert!(!adapter.detect());
    assert!(adapter.start().is_err());
    assert!(!adapter.is_active());
    assert!(adapter.read_frame().unwrap().is_none());
}
