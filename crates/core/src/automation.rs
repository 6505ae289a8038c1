//! Automation sequence vocabulary and step arithmetic.
//!
//! An automation is an ordered list of emails. Each enrolled subscriber walks
//! the list one email at a time; the index stored on the enrollment is the
//! next email to send and never exceeds the number of emails.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Delay before the next email when a step does not specify one.
pub const DEFAULT_STEP_DELAY_SECS: i64 = 86_400;

/// Default inactivity threshold for re-engagement campaigns.
pub const DEFAULT_INACTIVE_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationType {
    Welcome,
    Drip,
    Trigger,
    Reengagement,
}

impl AutomationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Drip => "drip",
            Self::Trigger => "trigger",
            Self::Reengagement => "reengagement",
        }
    }
}

impl fmt::Display for AutomationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(Self::Welcome),
            "drip" => Ok(Self::Drip),
            "trigger" => Ok(Self::Trigger),
            "reengagement" => Ok(Self::Reengagement),
            _ => Err(CoreError::Validation("Invalid automation type".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Subscription,
    TagAdded,
    LinkClicked,
    EmailOpened,
    CustomEvent,
    Inactivity,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::TagAdded => "tag_added",
            Self::LinkClicked => "link_clicked",
            Self::EmailOpened => "email_opened",
            Self::CustomEvent => "custom_event",
            Self::Inactivity => "inactivity",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription" => Ok(Self::Subscription),
            "tag_added" => Ok(Self::TagAdded),
            "link_clicked" => Ok(Self::LinkClicked),
            "email_opened" => Ok(Self::EmailOpened),
            "custom_event" => Ok(Self::CustomEvent),
            "inactivity" => Ok(Self::Inactivity),
            other => Err(CoreError::Validation(format!("Invalid trigger type '{other}'"))),
        }
    }
}

/// Validate an automation name and type string, returning the parsed type.
pub fn validate_automation(name: &str, automation_type: &str) -> Result<AutomationType, CoreError> {
    let parsed: AutomationType = automation_type.parse()?;
    if name.trim().is_empty() {
        return Err(CoreError::Validation("Automation name is required".into()));
    }
    Ok(parsed)
}

/// Whether an automation reacts to an event of `event`.
///
/// `trigger` automations match on their own trigger type. Welcome sequences
/// carry the `subscription` trigger and start on new subscriptions.
pub fn reacts_to(
    automation_type: AutomationType,
    automation_trigger: Option<TriggerType>,
    event: TriggerType,
) -> bool {
    match automation_type {
        AutomationType::Trigger => automation_trigger == Some(event),
        AutomationType::Welcome => {
            event == TriggerType::Subscription
                && automation_trigger.unwrap_or(TriggerType::Subscription) == event
        }
        AutomationType::Drip | AutomationType::Reengagement => false,
    }
}

/// One `data[field] == value` condition on a trigger automation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Parse stored conditions. `null` means no conditions.
pub fn parse_conditions(value: &serde_json::Value) -> Result<Vec<Condition>, CoreError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| CoreError::Validation(format!("Invalid automation conditions: {e}")))
}

/// Every complete condition must equal the corresponding field of `data`.
/// Conditions without a field or a value are ignored.
pub fn conditions_match(conditions: &[Condition], data: &serde_json::Value) -> bool {
    conditions.iter().all(|c| match (&c.field, &c.value) {
        (Some(field), Some(value)) if !field.is_empty() && !value.is_null() => {
            data.get(field) == Some(value)
        }
        _ => true,
    })
}

/// When the first email of a new enrollment is due.
pub fn first_email_at(now: Timestamp, initial_delay_secs: i64) -> Timestamp {
    now + Duration::seconds(initial_delay_secs.max(0))
}

/// Where an enrollment goes after the email at some index was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAdvance {
    /// More emails remain; the next one is due at `next_email_at`.
    Continue {
        next_index: i32,
        next_email_at: Timestamp,
    },
    /// That was the last email.
    Complete { next_index: i32 },
}

/// Advance past the email at `sent_index`.
///
/// `delays` holds each email's delay in seconds, in sequence order. The
/// returned index is at most `delays.len()`.
pub fn advance_after_send(sent_index: i32, delays: &[i64], now: Timestamp) -> StepAdvance {
    let count = delays.len() as i32;
    let next_index = (sent_index.max(0) + 1).min(count);
    match delays.get(next_index as usize) {
        Some(&delay) if next_index < count => StepAdvance::Continue {
            next_index,
            next_email_at: now + Duration::seconds(delay.max(0)),
        },
        _ => StepAdvance::Complete { next_index },
    }
}

/// Subject of the re-engagement email when none is given.
pub fn reengagement_subject(name: &str) -> String {
    format!("We miss you! {name}")
}

/// A subscriber with no open, or whose last open is older than `days`, is
/// inactive.
pub fn is_inactive(last_opened_at: Option<Timestamp>, days: i64, now: Timestamp) -> bool {
    match last_opened_at {
        None => true,
        Some(at) => at < now - Duration::days(days.max(0)),
    }
}
