//! Subscriber engagement scoring.

use crate::types::Timestamp;

/// Score given to subscribers with no open history yet.
pub const DEFAULT_ENGAGEMENT_SCORE: i32 = 50;

/// How many of the most recent open-tracking rows are considered.
pub const RECENT_WINDOW: i64 = 10;

/// Recency points lost per day since the last open.
const RECENCY_DECAY_PER_DAY: f64 = 2.0;

pub const HIGH_ENGAGEMENT: i32 = 70;
pub const MEDIUM_ENGAGEMENT: i32 = 40;

/// Counters the score is computed from.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngagementInput {
    /// Distinct newsletters among the subscriber's recent open-tracking rows.
    pub recent_newsletters: i64,
    pub open_count: i64,
    pub click_count: i64,
    pub last_opened_at: Option<Timestamp>,
}

/// Weighted engagement score in `0..=100`.
///
/// `0.4 * open_rate + 0.4 * click_to_open_rate + 0.2 * recency`, where recency
/// starts at 100 on the day of the last open and decays by two points a day.
pub fn compute_engagement_score(input: &EngagementInput, now: Timestamp) -> i32 {
    if input.recent_newsletters <= 0 {
        return DEFAULT_ENGAGEMENT_SCORE;
    }

    let recency = match input.last_opened_at {
        Some(at) => {
            let days = (now - at).num_seconds() as f64 / 86_400.0;
            (100.0 - days.max(0.0) * RECENCY_DECAY_PER_DAY).max(0.0)
        }
        None => 0.0,
    };

    let opens = input.open_count.max(0) as f64;
    let clicks = input.click_count.max(0) as f64;

    let open_rate = opens / input.recent_newsletters as f64 * 100.0;
    let click_to_open = if opens > 0.0 {
        clicks / opens * 100.0
    } else {
        0.0
    };

    let score = (open_rate * 0.4 + click_to_open * 0.4 + recency * 0.2).round();
    score.clamp(0.0, 100.0) as i32
}

/// Engagement band used by subscriber analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementBand {
    High,
    Medium,
    Low,
}

/// Classify a stored score. Missing scores count as low.
pub fn band(score: Option<i32>) -> EngagementBand {
    match score {
        Some(s) if s >= HIGH_ENGAGEMENT => EngagementBand::High,
        Some(s) if s >= MEDIUM_ENGAGEMENT => EngagementBand::Medium,
        _ => EngagementBand::Low,
    }
}
