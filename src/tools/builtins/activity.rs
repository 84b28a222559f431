//! Activity tracking exposed to the agent as tools.
//!
//! All tools share one caller-owned tracker.  File names passed to the
//! save / load tools are resolved inside the configured data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::activity::{parse_timestamp, ActivityCategory, ActivityTracker};
use crate::tools::{handler, sandbox_path, ParamSpec, ParamType, Signature, ToolError, ToolRegistry};

/// Tracker handle shared between the activity tools.
pub type SharedTracker = Arc<Mutex<ActivityTracker>>;

const TRACK_DOC: &str = "Track a user activity and categorize it.

    Args:
        app_name: Name of the application currently in use
        window_title: Title of the active window
        content_summary: Summary of the content being displayed
        user_activity: Description of what the user is doing";

const SUMMARY_DOC: &str = "Get a summary of tracked activities for a time period.

    Args:
        start_time: ISO-8601 start time, defaults to the first tracked activity
        end_time: ISO-8601 end time, defaults to the last tracked activity";

const CATEGORIZE_DOC: &str =
    "Re-run keyword categorization over activities that are still uncategorized.";

const SAVE_DOC: &str = "Save the activity log to a JSON file.

    Args:
        filename: File name inside the activity data directory";

const LOAD_DOC: &str = "Load an activity log from a JSON file, replacing the current log.

    Args:
        filename: File name inside the activity data directory";

const INSIGHTS_DOC: &str = "Get productivity insights based on tracked activity patterns.";

/// Register every activity tool on `registry`.
pub fn register_activity_tools(
    registry: &mut ToolRegistry,
    tracker: SharedTracker,
    data_dir: PathBuf,
) -> Result<(), ToolError> {
    let t = tracker.clone();
    registry.register_fn(
        "track_activity",
        TRACK_DOC,
        Signature::new(vec![
            ParamSpec::required("app_name", ParamType::String),
            ParamSpec::required("window_title", ParamType::String),
            ParamSpec::required("content_summary", ParamType::String),
            ParamSpec::required("user_activity", ParamType::String),
        ]),
        handler(move |args| {
            let t = t.clone();
            async move { track_activity(&t, &args).await }
        }),
    )?;

    let t = tracker.clone();
    registry.register_fn(
        "get_activity_summary",
        SUMMARY_DOC,
        Signature::new(vec![
            ParamSpec::optional("start_time", ParamType::optional(ParamType::String)),
            ParamSpec::optional("end_time", ParamType::optional(ParamType::String)),
        ]),
        handler(move |args| {
            let t = t.clone();
            async move { activity_summary(&t, &args).await }
        }),
    )?;

    let t = tracker.clone();
    registry.register_fn(
        "categorize_activities",
        CATEGORIZE_DOC,
        Signature::default(),
        handler(move |_| {
            let t = t.clone();
            async move { Ok(categorize_activities(&t).await) }
        }),
    )?;

    let (t, dir) = (tracker.clone(), data_dir.clone());
    registry.register_fn(
        "save_activity_log",
        SAVE_DOC,
        Signature::new(vec![ParamSpec::required("filename", ParamType::String)]),
        handler(move |args| {
            let (t, dir) = (t.clone(), dir.clone());
            async move { save_activity_log(&t, &dir, &args).await }
        }),
    )?;

    let (t, dir) = (tracker.clone(), data_dir);
    registry.register_fn(
        "load_activity_log",
        LOAD_DOC,
        Signature::new(vec![ParamSpec::required("filename", ParamType::String)]),
        handler(move |args| {
            let (t, dir) = (t.clone(), dir.clone());
            async move { load_activity_log(&t, &dir, &args).await }
        }),
    )?;

    registry.register_fn(
        "get_productivity_insights",
        INSIGHTS_DOC,
        Signature::default(),
        handler(move |_| {
            let t = tracker.clone();
            async move { Ok(productivity_insights(&t).await) }
        }),
    )?;

    Ok(())
}

fn str_arg<'a>(args: &'a Value, name: &str) -> anyhow::Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing `{name}` argument"))
}

fn opt_time_arg(args: &Value, name: &str) -> anyhow::Result<Option<chrono::NaiveDateTime>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s).map(Some),
        Some(other) => anyhow::bail!("`{name}` must be an ISO-8601 string, got {other}"),
    }
}

/// Returns: `{timestamp, app_name, window_title, user_activity, category, confidence, message}`
pub async fn track_activity(tracker: &SharedTracker, args: &Value) -> anyhow::Result<Value> {
    let app_name = str_arg(args, "app_name")?;
    let window_title = str_arg(args, "window_title")?;
    let content_summary = str_arg(args, "content_summary")?;
    let user_activity = str_arg(args, "user_activity")?;

    let mut guard = tracker.lock().await;
    let entry = guard.add_activity(app_name, window_title, content_summary, user_activity);
    Ok(json!({
        "timestamp": entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        "app_name": entry.app_name,
        "window_title": entry.window_title,
        "user_activity": entry.user_activity,
        "category": entry.category,
        "confidence": entry.confidence,
        "message": format!(
            "Activity categorized as {} with {:.1}% confidence",
            entry.category,
            entry.confidence * 100.0
        ),
    }))
}

/// Returns the summary plus a flat `summary.<category>_minutes` block.
pub async fn activity_summary(tracker: &SharedTracker, args: &Value) -> anyhow::Result<Value> {
    let start = opt_time_arg(args, "start_time")?;
    let end = opt_time_arg(args, "end_time")?;
    let summary = tracker.lock().await.summary(start, end);

    let mut flat = serde_json::Map::new();
    for category in ActivityCategory::ALL {
        flat.insert(
            format!("{category}_minutes"),
            json!(summary.minutes(category)),
        );
    }

    let mut out = serde_json::to_value(&summary)?;
    out["summary"] = Value::Object(flat);
    Ok(out)
}

pub async fn categorize_activities(tracker: &SharedTracker) -> Value {
    let report = tracker.lock().await.recategorize_uncategorized();
    if report.total_uncategorized == 0 {
        return json!({ "message": "No uncategorized activities found", "categorized": 0 });
    }
    json!({
        "message": format!("Recategorized {} activities", report.categorized),
        "total_uncategorized": report.total_uncategorized,
        "categorized": report.categorized,
    })
}

/// Resolve `filename` inside `data_dir` off the runtime thread.
async fn resolve_log_path(data_dir: &Path, filename: &str) -> anyhow::Result<PathBuf> {
    let (dir, name) = (data_dir.to_path_buf(), filename.to_string());
    tokio::task::spawn_blocking(move || sandbox_path(&dir, &name))
        .await
        .context("path resolution task failed")?
}

/// Failures are reported in the payload (`success: false`), not as errors.
///
/// The tracker is locked only while the log is encoded; the write
/// itself goes through `tokio::fs`.
pub async fn save_activity_log(
    tracker: &SharedTracker,
    data_dir: &Path,
    args: &Value,
) -> anyhow::Result<Value> {
    let filename = str_arg(args, "filename")?;
    let (encoded, count) = {
        let guard = tracker.lock().await;
        (guard.to_json(), guard.len())
    };

    let result = async {
        let path = resolve_log_path(data_dir, filename).await?;
        let json = encoded?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("write activity log {}", path.display()))?;
        info!(path = %path.display(), activities = count, "activity log saved");
        anyhow::Ok(())
    }
    .await;

    Ok(match result {
        Ok(()) => json!({
            "success": true,
            "filename": filename,
            "activities_saved": count,
            "message": format!("Activity log saved to {filename}"),
        }),
        Err(e) => json!({
            "success": false,
            "error": format!("{e:#}"),
            "message": format!("Failed to save activity log: {e:#}"),
        }),
    })
}

/// Failures are reported in the payload (`success: false`), not as errors.
///
/// The file is read with `tokio::fs` before the tracker is locked.
pub async fn load_activity_log(
    tracker: &SharedTracker,
    data_dir: &Path,
    args: &Value,
) -> anyhow::Result<Value> {
    let filename = str_arg(args, "filename")?;

    let result = async {
        let path = resolve_log_path(data_dir, filename).await?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read activity log {}", path.display()))?;
        let mut guard = tracker.lock().await;
        guard.replace_from_json(&raw, &path.display().to_string())?;
        info!(path = %path.display(), activities = guard.len(), "activity log loaded");
        anyhow::Ok(guard.len())
    }
    .await;

    Ok(match result {
        Ok(count) => json!({
            "success": true,
            "filename": filename,
            "activities_loaded": count,
            "message": format!("Activity log loaded from {filename}"),
        }),
        Err(e) => json!({
            "success": false,
            "error": format!("{e:#}"),
            "message": format!("Failed to load activity log: {e:#}"),
        }),
    })
}

pub async fn productivity_insights(tracker: &SharedTracker) -> Value {
    match tracker.lock().await.insights() {
        Some(report) => json!(report),
        None => json!({
            "message": "No activity data available for insights",
            "productivity_score": 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ToolRegistry, SharedTracker, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tracker: SharedTracker = Arc::new(Mutex::new(ActivityTracker::default()));
        let mut registry = ToolRegistry::new();
        register_activity_tools(&mut registry, tracker.clone(), dir.path().to_path_buf()).unwrap();
        (registry, tracker, dir)
    }

    #[test]
    fn registers_six_tools_with_schemas() {
        let (registry, _, _dir) = setup();
        assert_eq!(
            registry.names(),
            vec![
                "categorize_activities",
                "get_activity_summary",
                "get_productivity_insights",
                "load_activity_log",
                "save_activity_log",
                "track_activity",
            ]
        );
        let track = registry.get("track_activity").unwrap();
        assert_eq!(
            track.parameters()["properties"]["app_name"]["description"],
            "Name of the application currently in use"
        );
        assert_eq!(track.parameters()["required"].as_array().unwrap().len(), 4);
        let summary = registry.get("get_activity_summary").unwrap();
        assert_eq!(summary.parameters()["required"], json!([]));
    }

    #[tokio::test]
    async fn track_then_summarize() {
        let (registry, tracker, _dir) = setup();
        let out = registry
            .run(
                "track_activity",
                json!({
                    "app_name": "Zoom",
                    "window_title": "Weekly sync",
                    "content_summary": "video conference with chat",
                    "user_activity": "meeting call with email follow-up and discussion, feedback",
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["category"], "communication");
        assert!(out["message"]
            .as_str()
            .unwrap()
            .starts_with("Activity categorized as communication with"));
        assert_eq!(tracker.lock().await.len(), 1);

        let summary = registry.run("get_activity_summary", json!({})).await.unwrap();
        assert_eq!(summary["total_activities"], 1);
        assert_eq!(summary["summary"]["communication_minutes"], 0);
        assert_eq!(summary["time_distribution"]["communication"]["percentage"], 100);
    }

    #[tokio::test]
    async fn bad_time_bound_is_an_execution_error() {
        let (registry, _, _dir) = setup();
        let err = registry
            .run("get_activity_summary", json!({ "start_time": "not a time" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution { .. }));
    }

    #[tokio::test]
    async fn save_outside_data_dir_reports_failure() {
        let (registry, _, _dir) = setup();
        let out = registry
            .run("save_activity_log", json!({ "filename": "../escape.json" }))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert!(out["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to save activity log"));
    }

    #[tokio::test]
    async fn insights_without_data() {
        let (registry, _, _dir) = setup();
        let out = registry.run("get_productivity_insights", Value::Null).await.unwrap();
        assert_eq!(out["message"], "No activity data available for insights");
        assert_eq!(out["productivity_score"], 0);

        let out = registry.run("categorize_activities", json!({})).await.unwrap();
        assert_eq!(out["categorized"], 0);
    }
}
