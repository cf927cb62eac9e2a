// End-to-end checks of the debounce core and the event store through the
// public library API, without any actors involved.

use chrono::{DateTime, Local, TimeZone, Utc};
use image::{DynamicImage, RgbImage};
use std::time::Duration;
use tempfile::tempdir;

use drowsewatch_service::alert::{AlertCommand, AlertState, AlertStateMachine, AlertStatus};
use drowsewatch_service::utils::detection_utils::{target_present, DetectionResult};
use drowsewatch_service::utils::event_store::{EventStore, LogEntry};

fn at_ms(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
}

fn snapshot() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(8, 8))
}

fn drowsy(conf: u8) -> DetectionResult {
    DetectionResult {
        r#box: [10, 10, 60, 60],
        cls: 0,
        cls_name: "drowsy".to_string(),
        conf,
    }
}

// The full confirm path: machine commands drive store appends, exactly one
// entry per confirmed episode.
#[test]
fn confirmed_episodes_land_in_the_store_once() {
    let dir = tempdir().unwrap();
    let store = EventStore::new(dir.path().join("log.txt"), dir.path().join("snapshots"));
    let mut machine = AlertStateMachine::new(Duration::from_secs(3));

    // Two episodes with an idle gap; frames every 100ms.
    for episode_offset in [0i64, 20_000] {
        for i in 0..40 {
            let now = at_ms(episode_offset + i * 100);
            for command in machine.tick(true, now) {
                if command == AlertCommand::ConfirmEpisode {
                    let entry = LogEntry::from_timestamp(now.with_timezone(&Local));
                    store.append(&entry, &snapshot()).unwrap();
                    machine.note_snapshot(entry.filename.clone());
                }
            }
        }
        machine.tick(false, at_ms(episode_offset + 4_100));
    }

    assert_eq!(machine.counters().total_confirmed, 2);
    let entries = store.read_all();
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert!(store.snapshot_path(&entry.filename).exists());
    }
}

#[test]
fn flickering_detection_confirms_nothing() {
    let dir = tempdir().unwrap();
    let store = EventStore::new(dir.path().join("log.txt"), dir.path().join("snapshots"));
    let mut machine = AlertStateMachine::new(Duration::from_secs(3));

    // Never more than 2.9s of continuous presence.
    for i in 0..200i64 {
        let present = i % 30 != 29;
        for command in machine.tick(present, at_ms(i * 100)) {
            assert_ne!(command, AlertCommand::ConfirmEpisode);
        }
    }

    assert_eq!(machine.counters().total_confirmed, 0);
    assert!(store.read_all().is_empty());
}

#[test]
fn fresh_store_reads_empty_without_error() {
    let dir = tempdir().unwrap();
    let store = EventStore::new(dir.path().join("log.txt"), dir.path().join("snapshots"));
    assert!(store.read_all().is_empty());
}

#[test]
fn clear_then_reset_counters_matches_delete_history_semantics() {
    let dir = tempdir().unwrap();
    let store = EventStore::new(dir.path().join("log.txt"), dir.path().join("snapshots"));
    let mut machine = AlertStateMachine::new(Duration::from_millis(300));

    for i in 0..10 {
        for command in machine.tick(true, at_ms(i * 100)) {
            if command == AlertCommand::ConfirmEpisode {
                let entry = LogEntry::from_timestamp(at_ms(i * 100).with_timezone(&Local));
                store.append(&entry, &snapshot()).unwrap();
            }
        }
    }
    assert_eq!(machine.counters().total_confirmed, 1);
    assert_eq!(store.read_all().len(), 1);

    // /delete_history: clear the store, then reset unconditionally.
    let result = store.clear();
    machine.reset_counters();

    assert!(result.is_ok());
    assert!(store.read_all().is_empty());
    assert_eq!(machine.counters().total_confirmed, 0);
}

#[test]
fn status_tracks_machine_state() {
    let mut machine = AlertStateMachine::new(Duration::from_secs(3));
    assert_eq!(machine.status(), AlertStatus::Normal);
    machine.tick(true, at_ms(0));
    assert_eq!(machine.state(), AlertState::Suspect);
    assert_eq!(machine.status(), AlertStatus::Alert);
    machine.tick(false, at_ms(100));
    assert_eq!(machine.status(), AlertStatus::Normal);
}

#[test]
fn present_signal_is_label_and_confidence_gated() {
    let detections = vec![drowsy(55)];
    assert!(target_present(&detections, "drowsy", 0));
    assert!(target_present(&detections, "drowsy", 55));
    assert!(!target_present(&detections, "drowsy", 56));
    assert!(!target_present(&detections, "awake", 0));
}

#[test]
fn log_entries_survive_the_round_trip_verbatim() {
    let dir = tempdir().unwrap();
    let store = EventStore::new(dir.path().join("log.txt"), dir.path().join("snapshots"));

    let timestamp = Local.with_ymd_and_hms(2024, 3, 15, 8, 45, 12).unwrap();
    let entry = LogEntry::from_timestamp(timestamp);
    store.append(&entry, &snapshot()).unwrap();

    let read_back = store.read_all();
    assert_eq!(read_back, vec![entry.clone()]);
    assert_eq!(read_back[0].timestamp, "2024-03-15_08-45-12");
    assert_eq!(read_back[0].filename, "2024-03-15_08-45-12.jpg");
}
