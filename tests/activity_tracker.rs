//! Integration test: activity tracking, persistence and the activity tools.

use std::sync::Arc;

use aideck::activity::classifier::keywords;
use aideck::activity::{ActivityCategory, ActivityTracker};
use aideck::tools::builtins::{register_activity_tools, SharedTracker};
use aideck::tools::ToolRegistry;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Mutex;

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn sample_tracker() -> ActivityTracker {
    let mut t = ActivityTracker::new(10);
    t.add_activity_at(
        at(9, 0, 0),
        "VS Code",
        "main.rs",
        "Rust source",
        "coding and debugging",
    );
    t.add_activity_at(
        at(9, 0, 10),
        "Slack",
        "#team",
        "chat message thread",
        "meeting call video conference chat message email",
    );
    t.add_activity_at(
        at(9, 0, 20),
        "YouTube",
        "Lo-fi",
        "music video",
        "coffee break, relax with youtube music and netflix news",
    );
    t
}

#[test]
fn classification_on_ingestion() {
    let t = sample_tracker();
    let cats: Vec<ActivityCategory> = t.entries().iter().map(|e| e.category).collect();
    assert_eq!(
        cats,
        vec![
            ActivityCategory::Uncategorized,
            ActivityCategory::Communication,
            ActivityCategory::Breaks,
        ]
    );
    // 2 work keywords: reported but under threshold.
    assert!(t.entries()[0].confidence > 0.0);
    assert!(t.entries()[0].confidence < 0.3);
}

#[test]
fn summary_over_time_window() {
    let t = sample_tracker();
    let all = t.summary(None, None);
    assert_eq!(all.total_activities, 3);
    assert_eq!(all.apps_used.len(), 3);
    assert_eq!(all.apps_used[0].app, "VS Code");

    let window = t.summary(Some(at(9, 0, 5)), Some(at(9, 0, 10)));
    assert_eq!(window.total_activities, 1);
    assert_eq!(window.category_counts[&ActivityCategory::Communication], 1);

    let none = t.summary(Some(at(10, 0, 0)), None);
    assert_eq!(none.total_activities, 0);
    assert_eq!(none.total_tracked_minutes, 0);
}

#[test]
fn save_load_round_trip_preserves_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/log.json");
    let saved = sample_tracker();
    saved.save_to_file(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["activities"].as_array().unwrap().len(), 3);
    assert_eq!(raw["activities"][0]["timestamp"], "2024-03-04T09:00:00");
    assert_eq!(raw["activities"][1]["category"], "communication");

    let mut loaded = ActivityTracker::new(10);
    loaded.load_from_file(&path).unwrap();
    assert_eq!(loaded.entries(), saved.entries());
}

/// One entry per keyword-list prefix, so every `k / len` confidence
/// shows up, stamped with the current (sub-second) time.
fn tracker_with_every_confidence() -> ActivityTracker {
    let mut t = ActivityTracker::new(10);
    for category in [
        ActivityCategory::Work,
        ActivityCategory::Communication,
        ActivityCategory::Breaks,
    ] {
        let list = keywords(category);
        for k in 1..=list.len() {
            t.add_activity("App", "", "", &list[..k].join(" "));
        }
    }
    t
}

#[test]
fn round_trip_is_exact_for_every_confidence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.json");
    let saved = tracker_with_every_confidence();
    assert_eq!(saved.len(), 26 + 22 + 18);
    saved.save_to_file(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["activities"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["timestamp"].as_str().unwrap().contains('.')));

    let mut loaded = ActivityTracker::new(10);
    loaded.load_from_file(&path).unwrap();
    for (a, b) in saved.entries().iter().zip(loaded.entries()) {
        assert_eq!(a.confidence.to_bits(), b.confidence.to_bits(), "{}", a.user_activity);
        assert_eq!(a.timestamp, b.timestamp);
    }
    assert_eq!(loaded.entries(), saved.entries());

    // Nothing changed on disk, so nothing gets re-categorized.
    let report = loaded.recategorize_uncategorized();
    assert_eq!(report.categorized, 0);
}

#[tokio::test]
async fn tool_round_trip_is_exact() {
    let dir = TempDir::new().unwrap();
    let saved = tracker_with_every_confidence();
    let expected = saved.entries().to_vec();
    let tracker: SharedTracker = Arc::new(Mutex::new(saved));
    let mut registry = ToolRegistry::new();
    register_activity_tools(&mut registry, tracker.clone(), dir.path().to_path_buf()).unwrap();

    let out = registry
        .run("save_activity_log", json!({ "filename": "logs/all.json" }))
        .await
        .unwrap();
    assert_eq!(out["success"], true);
    assert_eq!(out["activities_saved"], 66);

    tracker.lock().await.clear();
    let out = registry
        .run("load_activity_log", json!({ "filename": "logs/all.json" }))
        .await
        .unwrap();
    assert_eq!(out["success"], true);
    assert_eq!(tracker.lock().await.entries(), expected.as_slice());

    let out = registry.run("categorize_activities", json!({})).await.unwrap();
    assert_eq!(out["categorized"], 0);
}

#[test]
fn malformed_log_fails_whole_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(
        &path,
        json!({
            "activities": [
                {
                    "timestamp": "2024-03-04T09:00:00",
                    "app_name": "A", "window_title": "", "content_summary": "",
                    "user_activity": "", "category": "work", "confidence": 0.5
                },
                {
                    "timestamp": "not-a-time",
                    "app_name": "B", "window_title": "", "content_summary": "",
                    "user_activity": "", "category": "work", "confidence": 0.5
                }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let mut tracker = sample_tracker();
    assert!(tracker.load_from_file(&path).is_err());
    // Current log untouched.
    assert_eq!(tracker.len(), 3);

    std::fs::write(&path, r#"{"activities": [{"timestamp": "2024-03-04T09:00:00"}]}"#).unwrap();
    assert!(tracker.load_from_file(&path).is_err());

    std::fs::write(&path, r#"{"entries": []}"#).unwrap();
    assert!(tracker.load_from_file(&path).is_err());
    assert_eq!(tracker.len(), 3);
}

#[test]
fn recategorize_only_upgrades_confidence() {
    let mut t = sample_tracker();
    let report = t.recategorize_uncategorized();
    // Classification is deterministic, so nothing improves.
    assert_eq!(report.total_uncategorized, 1);
    assert_eq!(report.categorized, 0);
    assert_eq!(t.entries()[0].category, ActivityCategory::Uncategorized);
}

#[tokio::test]
async fn save_and_load_tools_use_the_data_dir() {
    let dir = TempDir::new().unwrap();
    let tracker: SharedTracker = Arc::new(Mutex::new(sample_tracker()));
    let mut registry = ToolRegistry::new();
    register_activity_tools(&mut registry, tracker.clone(), dir.path().to_path_buf()).unwrap();

    let out = registry
        .run("save_activity_log", json!({ "filename": "today.json" }))
        .await
        .unwrap();
    assert_eq!(out["success"], true);
    assert_eq!(out["activities_saved"], 3);
    assert!(dir.path().join("today.json").exists());

    tracker.lock().await.clear();
    let out = registry
        .run("load_activity_log", json!({ "filename": "today.json" }))
        .await
        .unwrap();
    assert_eq!(out["success"], true);
    assert_eq!(out["activities_loaded"], 3);

    let out = registry
        .run("load_activity_log", json!({ "filename": "missing.json" }))
        .await
        .unwrap();
    assert_eq!(out["success"], false);
    assert_eq!(tracker.lock().await.len(), 3);
}

#[tokio::test]
async fn insights_tool_reports_score() {
    let mut t = ActivityTracker::new(60);
    for i in 0..4 {
        t.add_activity_at(
            at(9, i, 0),
            "Zoom",
            "Standup",
            "video conference",
            "meeting call chat message email discussion feedback",
        );
    }
    let tracker: SharedTracker = Arc::new(Mutex::new(t));
    let mut registry = ToolRegistry::new();
    let dir = TempDir::new().unwrap();
    register_activity_tools(&mut registry, tracker, dir.path().to_path_buf()).unwrap();

    let out = registry.run("get_productivity_insights", json!({})).await.unwrap();
    assert_eq!(out["productivity_score"], 100);
    assert_eq!(out["insights"][1], "Your most used app is Zoom (4 minutes)");
    assert_eq!(out["recommendations"].as_array().unwrap().len(), 4);
}
