//! Keyword-scoring activity classifier.
//!
//! Pure function of its three text inputs and the static keyword tables.

use super::ActivityCategory;

/// Below this confidence an activity is reported as uncategorized.
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

pub const WORK_KEYWORDS: &[&str] = &[
    "coding", "programming", "development", "writing", "editing",
    "designing", "analyzing", "researching", "planning", "documenting",
    "debugging", "testing", "reviewing", "spreadsheet", "excel",
    "word", "document", "report", "presentation", "slide", "data",
    "analysis", "calculation", "modeling", "database", "sql",
];

pub const COMMUNICATION_KEYWORDS: &[&str] = &[
    "meeting", "call", "video", "conference", "chat", "message",
    "email", "outlook", "teams", "slack", "discord", "zoom",
    "skype", "webex", "discussion", "collaboration", "review",
    "feedback", "planning", "standup", "sync", "1:1",
];

pub const BREAKS_KEYWORDS: &[&str] = &[
    "break", "lunch", "coffee", "rest", "relax", "music", "video",
    "youtube", "netflix", "game", "social media", "facebook",
    "twitter", "instagram", "tiktok", "reddit", "news", "entertainment",
];

/// Scored categories in tie-break order.
const SCORED: [(ActivityCategory, &[&str]); 3] = [
    (ActivityCategory::Work, WORK_KEYWORDS),
    (ActivityCategory::Communication, COMMUNICATION_KEYWORDS),
    (ActivityCategory::Breaks, BREAKS_KEYWORDS),
];

/// Keyword list for a scored category (empty for `Uncategorized`).
pub fn keywords(category: ActivityCategory) -> &'static [&'static str] {
    SCORED
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, kw)| *kw)
        .unwrap_or(&[])
}

/// Outcome of classifying one activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub category: ActivityCategory,
    /// Fraction of the winning category's keywords found in the text.
    pub confidence: f64,
}

/// Classify an activity from its free-text fields.
///
/// The winner is the category with the strictly highest keyword count;
/// on a tie the earlier category (work, communication, breaks) is kept.
/// A confidence under [`CONFIDENCE_THRESHOLD`] forces `Uncategorized`
/// but the computed confidence is still reported.
pub fn categorize(user_activity: &str, content_summary: &str, window_title: &str) -> Classification {
    let text = format!("{user_activity} {content_summary} {window_title}").to_lowercase();

    let mut best: Option<(ActivityCategory, usize, usize)> = None;
    for (category, keywords) in SCORED {
        let score = keywords.iter().filter(|kw| text.contains(*kw)).count();
        if best.map_or(true, |(_, top, _)| score > top) {
            best = Some((category, score, keywords.len()));
        }
    }

    let Some((category, score, list_len)) = best.filter(|(_, score, _)| *score > 0) else {
        return Classification {
            category: ActivityCategory::Uncategorized,
            confidence: 0.0,
        };
    };

    let confidence = score as f64 / list_len as f64;
    if confidence < CONFIDENCE_THRESHOLD {
        return Classification {
            category: ActivityCategory::Uncategorized,
            confidence,
        };
    }

    Classification {
        category,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_confidence_work_is_forced_uncategorized() {
        let c = categorize("coding and debugging", "", "");
        assert_eq!(c.category, ActivityCategory::Uncategorized);
        let expected = 2.0 / WORK_KEYWORDS.len() as f64;
        assert!((c.confidence - expected).abs() < 1e-9);
        assert!((c.confidence - 0.08).abs() < 0.01);
    }

    #[test]
    fn many_communication_keywords_win() {
        let c = categorize("meeting call video conference chat message email", "", "");
        assert_eq!(c.category, ActivityCategory::Communication);
        let expected = 7.0 / COMMUNICATION_KEYWORDS.len() as f64;
        assert!((c.confidence - expected).abs() < 1e-9);
        assert!(c.confidence >= CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn no_keywords_is_uncategorized_with_zero_confidence() {
        let c = categorize("staring at the wall", "", "");
        assert_eq!(c.category, ActivityCategory::Uncategorized);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn tie_keeps_earlier_category() {
        // Eight work and eight communication hits, none for breaks.
        let c = categorize(
            "coding programming development writing editing designing analyzing researching",
            "meeting chat email slack zoom skype webex standup",
            "",
        );
        assert_eq!(c.category, ActivityCategory::Work);
        assert_eq!(c.confidence, 8.0 / WORK_KEYWORDS.len() as f64);
        assert!(c.confidence >= CONFIDENCE_THRESHOLD);

        // Communication still beats breaks on a tie.
        let c = categorize(
            "meeting chat email slack zoom skype webex",
            "",
            "break lunch coffee relax music youtube netflix",
        );
        assert_eq!(c.category, ActivityCategory::Communication);
        assert_eq!(c.confidence, 7.0 / COMMUNICATION_KEYWORDS.len() as f64);
    }

    #[test]
    fn all_fields_are_searched_case_insensitively() {
        let c = categorize(
            "Watching",
            "YouTube music video",
            "Netflix | Reddit | Twitter | News | Coffee",
        );
        assert_eq!(c.category, ActivityCategory::Breaks);
        assert!(c.confidence >= CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn keyword_lists_are_exposed_per_category() {
        assert_eq!(keywords(ActivityCategory::Work).len(), 26);
        assert_eq!(keywords(ActivityCategory::Communication).len(), 22);
        assert_eq!(keywords(ActivityCategory::Breaks).len(), 18);
        assert!(keywords(ActivityCategory::Uncategorized).is_empty());
    }
}
