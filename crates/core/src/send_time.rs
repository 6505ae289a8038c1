//! Optimal send time from historical open times.
//!
//! Days are numbered from Sunday (`0`) and hours are UTC.

use chrono::{Datelike, Timelike};
use serde::Serialize;

use crate::types::Timestamp;

/// Opens per subscriber considered by the analysis.
pub const OPENS_PER_SUBSCRIBER: i64 = 10;

pub const DEFAULT_BEST_DAY: u32 = 2;
pub const DEFAULT_BEST_HOUR: u32 = 10;

pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimalSendTime {
    pub best_day: u32,
    pub best_hour: u32,
    pub confidence: Confidence,
    pub recommended_day: &'static str,
    pub recommended_time: String,
    pub sample_size: usize,
}

/// `10AM`, `3PM`, `12PM`, `12AM`.
pub fn format_hour(hour: u32) -> String {
    let suffix = if hour >= 12 { "PM" } else { "AM" };
    let display = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display}{suffix}")
}

/// Pick the most frequent weekday and hour among `opens`.
///
/// Ties go to the earliest day/hour. With no data the answer is Tuesday
/// 10 AM at low confidence.
pub fn optimal_send_time(opens: &[Timestamp]) -> OptimalSendTime {
    if opens.is_empty() {
        return build(DEFAULT_BEST_DAY, DEFAULT_BEST_HOUR, Confidence::Low, 0);
    }

    let mut days = [0usize; 7];
    let mut hours = [0usize; 24];
    for at in opens {
        days[at.weekday().num_days_from_sunday() as usize] += 1;
        hours[at.hour() as usize] += 1;
    }

    let (best_day, day_hits) = most_frequent(&days);
    let (best_hour, hour_hits) = most_frequent(&hours);

    let total = opens.len() as f64;
    let day_share = day_hits as f64 / total;
    let hour_share = hour_hits as f64 / total;

    let confidence = if day_share > 0.5 && hour_share > 0.5 {
        Confidence::High
    } else if day_share > 0.3 && hour_share > 0.3 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    build(best_day as u32, best_hour as u32, confidence, opens.len())
}

fn most_frequent(counts: &[usize]) -> (usize, usize) {
    counts
        .iter()
        .copied()
        .enumerate()
        .fold((0, 0), |best, (i, c)| if c > best.1 { (i, c) } else { best })
}

fn build(day: u32, hour: u32, confidence: Confidence, sample_size: usize) -> OptimalSendTime {
    OptimalSendTime {
        best_day: day,
        best_hour: hour,
        confidence,
        recommended_day: DAY_NAMES[day as usize % 7],
        recommended_time: format_hour(hour),
        sample_size,
    }
}
