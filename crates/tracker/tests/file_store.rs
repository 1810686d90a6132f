#![forbid(unsafe_code)]

use config::Config;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tracker::Tracker;
use tracker::clock::ManualClock;
use tracker::domain::ToolId;
use tracker::persistence::JsonFileStore;

fn open(path: &std::path::Path, clock: Arc<ManualClock>) -> Tracker {
    let store = JsonFileStore::open(path).unwrap();
    Tracker::new(Config::default(), Box::new(store), clock)
}

#[test]
fn wear_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let clock = Arc::new(ManualClock::at_epoch(1_000_000));

    let tracker = open(&path, clock.clone());
    tracker.startup().unwrap();
    tracker.on_event("PrintStarted", &Value::Null);
    clock.advance(Duration::from_secs(90));
    tracker.on_gcode_sent("T2");
    clock.advance(Duration::from_secs(30));
    tracker.on_event("PrintDone", &Value::Null);
    drop(tracker);

    let reopened = open(&path, clock);
    reopened.startup().unwrap();
    let tools = reopened.get_tool_state();
    assert_eq!(tools[&ToolId::zero()].accumulated_seconds, 90);
    assert_eq!(tools[&ToolId::parse("T2").unwrap()].accumulated_seconds, 30);
    assert!(!path.with_file_name("settings.json.tmp").exists());
}

#[test]
fn corrupt_file_starts_fresh() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let tracker = open(&path, Arc::new(ManualClock::at_epoch(0)));
    tracker.startup().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let saved: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(saved["tool_state"]["T0"]["accumulated_seconds"], 0);
    assert!(saved["nozzle_profiles"]["default_0_4_brass"].is_object());
}

#[test]
fn save_creates_missing_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/deeper/settings.json");

    let tracker = open(&path, Arc::new(ManualClock::at_epoch(0)));
    tracker.startup().unwrap();
    assert!(path.exists());
}
