//! Command implementations behind the `aideck` binary.
//!
//! Every command takes the already-loaded [`Config`] and prints its
//! result to stdout (JSON for activity and tool output).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::activity::ActivityTracker;
use crate::agent::Agent;
use crate::config::Config;
use crate::conversation::{ConversationStore, SqliteConversationStore, DEFAULT_TITLE};
use crate::models;
use crate::tools::builtins::{activity as activity_tools, register_activity_tools, SharedTracker};
use crate::tools::ToolRegistry;

/// File used by the `activity` commands when `--log` is not given.
pub const DEFAULT_ACTIVITY_LOG: &str = "activity_log.json";

/// Build the tool registry the agent sees.
pub fn build_registry(cfg: &Config, tracker: SharedTracker) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::with_timeout(cfg.tool_timeout());
    register_activity_tools(
        &mut registry,
        tracker,
        PathBuf::from(&cfg.activity.data_dir),
    )?;
    Ok(registry)
}

fn open_store(cfg: &Config) -> anyhow::Result<SqliteConversationStore> {
    SqliteConversationStore::open_configured(&cfg.storage.database)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

/// Run one agent turn in a stored conversation and print the reply.
///
/// A new conversation is created when `conversation` is `None`.
pub async fn chat(
    cfg: &Config,
    message: &str,
    conversation: Option<&str>,
    title: Option<&str>,
) -> anyhow::Result<()> {
    let store: Arc<dyn ConversationStore> = Arc::new(open_store(cfg)?);
    let conversation_id = match conversation {
        Some(id) => id.to_string(),
        None => store.create(title.unwrap_or(DEFAULT_TITLE))?,
    };

    let tracker = Arc::new(Mutex::new(ActivityTracker::new(cfg.activity.slice_seconds)));
    let registry = Arc::new(build_registry(cfg, tracker)?);
    let provider = models::build_provider_manager(&cfg.model)?;

    let mut agent = Agent::resume(
        registry,
        cfg.agent.system_prompt.as_deref(),
        store,
        &conversation_id,
    )?;
    debug!(agent = %cfg.agent.name, conversation = %conversation_id, "chat turn");
    let reply = agent.run_turn(&provider, message).await?;

    println!("{reply}");
    eprintln!("conversation: {conversation_id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// conversations
// ---------------------------------------------------------------------------

pub fn list_conversations(cfg: &Config, limit: usize, offset: usize) -> anyhow::Result<()> {
    let rows = open_store(cfg)?.list(limit, offset)?;
    if rows.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    println!("{:<38} {:<28} {:<26}", "ID", "TITLE", "UPDATED");
    println!("{}", "─".repeat(92));
    for row in &rows {
        println!(
            "{:<38} {:<28} {:<26}",
            row.id,
            truncate(&row.title, 28),
            row.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub fn show_conversation(cfg: &Config, id: &str) -> anyhow::Result<()> {
    let conversation = open_store(cfg)?
        .get(id)?
        .with_context(|| format!("conversation {id} not found"))?;
    print_json(&serde_json::to_value(&conversation)?)
}

pub fn new_conversation(cfg: &Config, title: Option<&str>) -> anyhow::Result<()> {
    let id = open_store(cfg)?.create(title.unwrap_or(DEFAULT_TITLE))?;
    println!("{id}");
    Ok(())
}

pub fn delete_conversation(cfg: &Config, id: &str) -> anyhow::Result<()> {
    if !open_store(cfg)?.delete(id)? {
        anyhow::bail!("conversation {id} not found");
    }
    info!(conversation = %id, "conversation deleted");
    println!("Deleted {id}");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// activity
// ---------------------------------------------------------------------------

/// `--log` value, or the default log file in the activity data directory.
pub fn activity_log_path(cfg: &Config, log: Option<&Path>) -> PathBuf {
    match log {
        Some(p) => p.to_path_buf(),
        None => Path::new(&cfg.activity.data_dir).join(DEFAULT_ACTIVITY_LOG),
    }
}

/// Tracker seeded from `path` when that file exists.
pub fn load_tracker(cfg: &Config, path: &Path) -> anyhow::Result<SharedTracker> {
    let mut tracker = ActivityTracker::new(cfg.activity.slice_seconds);
    if path.exists() {
        tracker.load_from_file(path)?;
    }
    Ok(Arc::new(Mutex::new(tracker)))
}

pub async fn activity_track(
    cfg: &Config,
    log: Option<&Path>,
    app: &str,
    window: &str,
    content: &str,
    activity: &str,
) -> anyhow::Result<()> {
    let path = activity_log_path(cfg, log);
    let tracker = load_tracker(cfg, &path)?;
    let args = json!({
        "app_name": app,
        "window_title": window,
        "content_summary": content,
        "user_activity": activity,
    });
    let out = activity_tools::track_activity(&tracker, &args).await?;
    tracker.lock().await.save_to_file(&path)?;
    print_json(&out)
}

pub async fn activity_summary(
    cfg: &Config,
    log: Option<&Path>,
    start: Option<&str>,
    end: Option<&str>,
) -> anyhow::Result<()> {
    let tracker = load_tracker(cfg, &activity_log_path(cfg, log))?;
    let args = json!({ "start_time": start, "end_time": end });
    print_json(&activity_tools::activity_summary(&tracker, &args).await?)
}

pub async fn activity_insights(cfg: &Config, log: Option<&Path>) -> anyhow::Result<()> {
    let tracker = load_tracker(cfg, &activity_log_path(cfg, log))?;
    print_json(&activity_tools::productivity_insights(&tracker).await)
}

/// Re-categorize uncategorized entries and write the log back.
pub async fn activity_categorize(cfg: &Config, log: Option<&Path>) -> anyhow::Result<()> {
    let path = activity_log_path(cfg, log);
    let tracker = load_tracker(cfg, &path)?;
    let out = activity_tools::categorize_activities(&tracker).await;
    if out["categorized"].as_u64().unwrap_or(0) > 0 {
        tracker.lock().await.save_to_file(&path)?;
    }
    print_json(&out)
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// Write a default `config.yaml` to `config_path`.
///
/// An existing file is left alone unless `force` is set.
pub async fn init_config(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Config::default().save(config_path).await?;
    info!(path = %config_path.display(), "default configuration written");
    println!("Wrote {}", config_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// tools
// ---------------------------------------------------------------------------

/// Print every registered tool descriptor.
pub fn print_tools(cfg: &Config) -> anyhow::Result<()> {
    let tracker = Arc::new(Mutex::new(ActivityTracker::new(cfg.activity.slice_seconds)));
    let registry = build_registry(cfg, tracker)?;
    print_json(&Value::Array(registry.list()))
}
