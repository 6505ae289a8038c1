//! Analytics arithmetic: rates, top links, CSV export and subscriber growth.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::engagement::{band, EngagementBand};
use crate::types::{DbId, Timestamp};

/// Number of links reported in newsletter analytics.
pub const TOP_LINKS: usize = 5;

/// Months covered by the subscriber growth series.
pub const GROWTH_MONTHS: u32 = 6;

/// Percentage rounded to two decimals; zero when `total` is zero.
pub fn rate(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkClicks {
    pub url: String,
    pub clicks: i64,
}

/// Sort by clicks descending, then URL, and keep the first `n`.
pub fn top_links(mut links: Vec<LinkClicks>, n: usize) -> Vec<LinkClicks> {
    links.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.url.cmp(&b.url)));
    links.truncate(n);
    links
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsletterMetrics {
    pub newsletter_id: DbId,
    pub title: String,
    pub sent_at: Option<Timestamp>,
    pub total_sent: i64,
    /// Unique openers.
    pub open_count: i64,
    /// Unique clickers.
    pub click_count: i64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub click_to_open_rate: f64,
    pub top_links: Vec<LinkClicks>,
}

impl NewsletterMetrics {
    pub fn new(
        newsletter_id: DbId,
        title: String,
        sent_at: Option<Timestamp>,
        total_sent: i64,
        unique_opens: i64,
        unique_clicks: i64,
        links: Vec<LinkClicks>,
    ) -> Self {
        Self {
            newsletter_id,
            title,
            sent_at,
            total_sent,
            open_count: unique_opens,
            click_count: unique_clicks,
            open_rate: rate(unique_opens, total_sent),
            click_rate: rate(unique_clicks, total_sent),
            click_to_open_rate: rate(unique_clicks, unique_opens),
            top_links: top_links(links, TOP_LINKS),
        }
    }

    /// Two-column CSV report.
    pub fn to_csv(&self) -> String {
        let sent_date = self
            .sent_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        let mut rows: Vec<Vec<String>> = vec![
            vec!["Newsletter".into(), self.title.clone()],
            vec!["Sent Date".into(), sent_date],
            vec!["Total Sent".into(), self.total_sent.to_string()],
            vec!["Opens".into(), self.open_count.to_string()],
            vec!["Clicks".into(), self.click_count.to_string()],
            vec!["Open Rate".into(), format!("{:.2}%", self.open_rate)],
            vec!["Click Rate".into(), format!("{:.2}%", self.click_rate)],
            vec![
                "Click-to-Open Rate".into(),
                format!("{:.2}%", self.click_to_open_rate),
            ],
            vec![String::new()],
            vec!["Top Links".into(), "Clicks".into()],
        ];
        rows.extend(
            self.top_links
                .iter()
                .map(|l| vec![l.url.clone(), l.clicks.to_string()]),
        );

        rows.iter()
            .map(|row| {
                row.iter()
                    .map(|f| csv_field(f))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Quote a CSV field when it contains a comma, quote or line break.
pub fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngagementDistribution {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl EngagementDistribution {
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = Option<i32>>,
    {
        scores
            .into_iter()
            .fold(Self::default(), |mut acc, s| {
                match band(s) {
                    EngagementBand::High => acc.high += 1,
                    EngagementBand::Medium => acc.medium += 1,
                    EngagementBand::Low => acc.low += 1,
                }
                acc
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyGrowth {
    pub month: String,
    pub count: i64,
}

/// `YYYY-MM` keys of the last `n` months, oldest first, ending with the
/// month of `now`.
pub fn last_months(now: Timestamp, n: u32) -> Vec<String> {
    let mut year = now.year();
    let mut month = now.month();
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        out.push(format!("{year:04}-{month:02}"));
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    out.reverse();
    out
}

/// First instant of the oldest month in [`last_months`].
pub fn growth_window_start(now: Timestamp, n: u32) -> Option<Timestamp> {
    let months = last_months(now, n);
    let first = months.first()?;
    let date = NaiveDate::parse_from_str(&format!("{first}-01"), "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Growth series with zero-filled months.
pub fn growth_series(now: Timestamp, counts: &HashMap<String, i64>) -> Vec<MonthlyGrowth> {
    last_months(now, GROWTH_MONTHS)
        .into_iter()
        .map(|month| {
            let count = counts.get(&month).copied().unwrap_or(0);
            MonthlyGrowth { month, count }
        })
        .collect()
}

/// Share of subscribers who did not unsubscribe. 100 for an empty list.
pub fn retention_rate(total: i64, unsubscribed: i64) -> f64 {
    if total <= 0 {
        return 100.0;
    }
    rate(total - unsubscribed, total)
}
