//! Time-bucket aggregation over classified activity entries.
//!
//! Each entry stands for one fixed-length time slice; every total here
//! is `count * slice_seconds`, floored to whole minutes.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{ActivityCategory, ActivityEntry};

/// Default seconds represented by one activity snapshot.
pub const DEFAULT_SLICE_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsage {
    pub app: String,
    pub minutes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTime {
    pub minutes: u64,
    pub percentage: u64,
}

/// Derived view over a slice of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Day the summary was produced, `YYYY-MM-DD`.
    pub date: String,
    pub total_tracked_minutes: u64,
    pub apps_used: Vec<AppUsage>,
    /// Always holds all four categories.
    pub time_distribution: BTreeMap<ActivityCategory, CategoryTime>,
    pub category_counts: BTreeMap<ActivityCategory, usize>,
    pub total_activities: usize,
}

impl ActivitySummary {
    /// A summary over no entries: every figure is zero.
    pub fn empty(date: NaiveDate) -> Self {
        summarize(&[], DEFAULT_SLICE_SECONDS, date)
    }

    pub fn minutes(&self, category: ActivityCategory) -> u64 {
        self.time_distribution
            .get(&category)
            .map(|t| t.minutes)
            .unwrap_or(0)
    }
}

/// Entries whose timestamp lies in `[start, end]`.
///
/// Missing bounds default to the first / last entry's timestamp.
pub fn filter_by_time(
    entries: &[ActivityEntry],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Vec<ActivityEntry> {
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return Vec::new();
    };
    let start = start.unwrap_or(first.timestamp);
    let end = end.unwrap_or(last.timestamp);

    entries
        .iter()
        .filter(|e| start <= e.timestamp && e.timestamp <= end)
        .cloned()
        .collect()
}

/// Aggregate `entries` into per-app and per-category time totals.
pub fn summarize(entries: &[ActivityEntry], slice_seconds: u64, date: NaiveDate) -> ActivitySummary {
    let total_seconds = (entries.len() as u64).saturating_mul(slice_seconds);

    let mut apps_used: Vec<AppUsage> = Vec::new();
    let mut app_seconds: Vec<u64> = Vec::new();
    let mut app_index: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        let idx = *app_index.entry(entry.app_name.as_str()).or_insert_with(|| {
            apps_used.push(AppUsage {
                app: entry.app_name.clone(),
                minutes: 0,
            });
            app_seconds.push(0);
            apps_used.len() - 1
        });
        app_seconds[idx] = app_seconds[idx].saturating_add(slice_seconds);
    }
    for (usage, seconds) in apps_used.iter_mut().zip(&app_seconds) {
        usage.minutes = seconds / 60;
    }

    let mut category_counts: BTreeMap<ActivityCategory, usize> =
        ActivityCategory::ALL.iter().map(|c| (*c, 0)).collect();
    for entry in entries {
        *category_counts.entry(entry.category).or_default() += 1;
    }

    let time_distribution = category_counts
        .iter()
        .map(|(category, count)| {
            let seconds = (*count as u64).saturating_mul(slice_seconds);
            // Same as 100 * seconds / total_seconds, without the overflow.
            let percentage = if total_seconds > 0 {
                (100 * *count as u128 / entries.len() as u128) as u64
            } else {
                0
            };
            (
                *category,
                CategoryTime {
                    minutes: seconds / 60,
                    percentage,
                },
            )
        })
        .collect();

    ActivitySummary {
        date: date.format("%Y-%m-%d").to_string(),
        total_tracked_minutes: total_seconds / 60,
        apps_used,
        time_distribution,
        category_counts,
        total_activities: entries.len(),
    }
}

// ── Productivity ─────────────────────────────────────────────

/// Score and human-readable hints derived from a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityReport {
    pub productivity_score: u64,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

pub const RECOMMENDATIONS: &[&str] = &[
    "Use the Pomodoro technique: 25 minutes focused work + 5 minute break",
    "Schedule important tasks during your peak energy hours",
    "Minimize context switching between different types of work",
    "Take regular breaks to maintain long-term productivity",
];

/// `floor(100 * (work + communication) / (work + communication + breaks))`.
pub fn productivity_score(summary: &ActivitySummary) -> u64 {
    let work = summary.minutes(ActivityCategory::Work);
    let communication = summary.minutes(ActivityCategory::Communication);
    let breaks = summary.minutes(ActivityCategory::Breaks);

    let categorized = work as u128 + communication as u128 + breaks as u128;
    if categorized == 0 {
        return 0;
    }
    (100 * (work as u128 + communication as u128) / categorized) as u64
}

/// Build the insight report.  `None` when nothing was tracked.
pub fn productivity_insights(summary: &ActivitySummary) -> Option<ProductivityReport> {
    if summary.total_tracked_minutes == 0 {
        return None;
    }

    let score = productivity_score(summary);
    let mut insights = vec![match score {
        s if s > 80 => "Excellent productivity! You're making great use of your time.",
        s if s > 60 => "Good productivity. Consider taking more focused work sessions.",
        s if s > 40 => "Moderate productivity. Try to minimize distractions.",
        _ => "Low productivity detected. Consider setting specific goals and taking regular breaks.",
    }
    .to_string()];

    // First app wins ties, matching first-seen order.
    let top_app = summary
        .apps_used
        .iter()
        .fold(None::<&AppUsage>, |best, app| match best {
            Some(b) if b.minutes >= app.minutes => Some(b),
            _ => Some(app),
        });
    if let Some(top) = top_app {
        insights.push(format!(
            "Your most used app is {} ({} minutes)",
            top.app, top.minutes
        ));
    }

    let break_minutes = summary.minutes(ActivityCategory::Breaks);
    if break_minutes > 0 {
        let per_hour = break_minutes as f64 / (summary.total_tracked_minutes as f64 / 60.0);
        if per_hour < 1.0 {
            insights.push("Consider taking more frequent short breaks to maintain focus.".into());
        } else if per_hour > 3.0 {
            insights.push("You seem to be taking many breaks. Try consolidating them.".into());
        }
    }

    Some(ProductivityReport {
        productivity_score: score,
        insights,
        recommendations: RECOMMENDATIONS.iter().map(|r| r.to_string()).collect(),
    })
}
