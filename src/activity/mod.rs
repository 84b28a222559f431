//! Activity tracking: classified snapshots of what the user is doing.
//!
//! An [`ActivityTracker`] owns an ordered, append-only log of
//! [`ActivityEntry`] values.  Entries are classified on ingestion by
//! [`classifier::categorize`]; summaries are recomputed on demand by
//! [`summary::summarize`] and never stored.
//!
//! The log persists as `{"activities": [...]}` JSON.

pub mod classifier;
pub mod summary;

use std::path::Path;

use anyhow::Context as _;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use classifier::{categorize, Classification};
pub use summary::{ActivitySummary, AppUsage, CategoryTime, ProductivityReport};

/// Category an activity is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Work,
    Communication,
    Breaks,
    Uncategorized,
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 4] = [
        ActivityCategory::Work,
        ActivityCategory::Communication,
        ActivityCategory::Breaks,
        ActivityCategory::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityCategory::Work => "work",
            ActivityCategory::Communication => "communication",
            ActivityCategory::Breaks => "breaks",
            ActivityCategory::Uncategorized => "uncategorized",
        }
    }
}

impl std::fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped snapshot of application activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(with = "iso_timestamp")]
    pub timestamp: NaiveDateTime,
    pub app_name: String,
    pub window_title: String,
    pub content_summary: String,
    pub user_activity: String,
    pub category: ActivityCategory,
    #[serde(default)]
    pub confidence: f64,
}

impl ActivityEntry {
    /// Build and classify an entry.
    pub fn classified(
        timestamp: NaiveDateTime,
        app_name: impl Into<String>,
        window_title: impl Into<String>,
        content_summary: impl Into<String>,
        user_activity: impl Into<String>,
    ) -> Self {
        let window_title = window_title.into();
        let content_summary = content_summary.into();
        let user_activity = user_activity.into();
        let Classification {
            category,
            confidence,
        } = categorize(&user_activity, &content_summary, &window_title);
        Self {
            timestamp,
            app_name: app_name.into(),
            window_title,
            content_summary,
            user_activity,
            category,
            confidence,
        }
    }
}

/// Parse an ISO-8601 timestamp as written by the activity log.
///
/// Accepts `T`- or space-separated naive timestamps and RFC 3339 with an
/// offset (kept as its wall-clock time).
pub fn parse_timestamp(raw: &str) -> anyhow::Result<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_local())
        .with_context(|| format!("invalid ISO-8601 timestamp: {raw}"))
}

mod iso_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format("%Y-%m-%dT%H:%M:%S%.f"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize)]
struct ActivityLogFile {
    activities: Vec<ActivityEntry>,
}

/// Result of re-running classification over uncategorized entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecategorizeReport {
    pub total_uncategorized: usize,
    pub categorized: usize,
}

// ── Tracker ──────────────────────────────────────────────────

/// Owner of the activity log.
///
/// Not synchronised; callers that share it wrap it in a lock.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    log: Vec<ActivityEntry>,
    slice_seconds: u64,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(summary::DEFAULT_SLICE_SECONDS)
    }
}

impl ActivityTracker {
    /// Tracker whose snapshots each stand for `slice_seconds` of time.
    pub fn new(slice_seconds: u64) -> Self {
        Self {
            log: Vec::new(),
            slice_seconds,
        }
    }

    pub fn slice_seconds(&self) -> u64 {
        self.slice_seconds
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }

    /// Record a snapshot taken now.
    pub fn add_activity(
        &mut self,
        app_name: &str,
        window_title: &str,
        content_summary: &str,
        user_activity: &str,
    ) -> &ActivityEntry {
        let now = Local::now().naive_local();
        self.add_activity_at(now, app_name, window_title, content_summary, user_activity)
    }

    /// Record a snapshot with an explicit timestamp.
    pub fn add_activity_at(
        &mut self,
        timestamp: NaiveDateTime,
        app_name: &str,
        window_title: &str,
        content_summary: &str,
        user_activity: &str,
    ) -> &ActivityEntry {
        let entry = ActivityEntry::classified(
            timestamp,
            app_name,
            window_title,
            content_summary,
            user_activity,
        );
        debug!(
            app = %entry.app_name,
            category = %entry.category,
            confidence = entry.confidence,
            "activity recorded"
        );
        self.log.push(entry);
        &self.log[self.log.len() - 1]
    }

    /// Re-classify uncategorized entries, keeping a new result only when
    /// its confidence beats the stored one.
    pub fn recategorize_uncategorized(&mut self) -> RecategorizeReport {
        let mut report = RecategorizeReport {
            total_uncategorized: 0,
            categorized: 0,
        };
        for entry in self
            .log
            .iter_mut()
            .filter(|e| e.category == ActivityCategory::Uncategorized)
        {
            report.total_uncategorized += 1;
            let c = categorize(&entry.user_activity, &entry.content_summary, &entry.window_title);
            if c.confidence > entry.confidence {
                entry.category = c.category;
                entry.confidence = c.confidence;
                report.categorized += 1;
            }
        }
        report
    }

    /// Summarise entries in `[start, end]` (bounds default to the log's ends).
    pub fn summary(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> ActivitySummary {
        let filtered = summary::filter_by_time(&self.log, start, end);
        summary::summarize(&filtered, self.slice_seconds, Local::now().date_naive())
    }

    /// Insight report over the whole log.
    pub fn insights(&self) -> Option<ProductivityReport> {
        summary::productivity_insights(&self.summary(None, None))
    }

    /// The log encoded as the pretty-printed `{"activities": [...]}` document.
    pub fn to_json(&self) -> anyhow::Result<String> {
        let file = ActivityLogFile {
            activities: self.log.clone(),
        };
        serde_json::to_string_pretty(&file).context("serialize activity log")
    }

    /// Replace the log with the entries of a `{"activities": [...]}` document.
    ///
    /// Any malformed entry fails the whole load and leaves the current
    /// log untouched.  `source` only labels errors.
    pub fn replace_from_json(&mut self, raw: &str, source: &str) -> anyhow::Result<()> {
        let file: ActivityLogFile = serde_json::from_str(raw)
            .with_context(|| format!("parse activity log {source}"))?;
        if let Some(bad) = file
            .activities
            .iter()
            .position(|e| !(0.0..=1.0).contains(&e.confidence))
        {
            anyhow::bail!("activity log {source}: entry {bad} has confidence outside [0, 1]");
        }
        self.log = file.activities;
        Ok(())
    }

    /// Write the log as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("write activity log {}", path.display()))?;
        info!(path = %path.display(), activities = self.log.len(), "activity log saved");
        Ok(())
    }

    /// Replace the log with the contents of `path`.
    pub fn load_from_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read activity log {}", path.display()))?;
        self.replace_from_json(&raw, &path.display().to_string())?;
        info!(path = %path.display(), activities = self.log.len(), "activity log loaded");
        Ok(())
    }
}
