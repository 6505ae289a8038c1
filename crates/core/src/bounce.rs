//! Bounce classification for failed deliveries.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Soft bounces after which a subscriber is treated as hard-bounced.
pub const SOFT_BOUNCE_LIMIT: i32 = 3;

pub const HARD_BOUNCE_REASON: &str = "Hard bounce - invalid email address";
pub const REPEATED_SOFT_BOUNCE_REASON: &str = "Multiple soft bounces";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BounceKind {
    Hard,
    Soft,
}

impl BounceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }
}

impl FromStr for BounceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard" => Ok(Self::Hard),
            "soft" => Ok(Self::Soft),
            _ => Err(CoreError::Validation(format!("Invalid bounce kind: {s}"))),
        }
    }
}

/// What processing one failed delivery does to its subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BounceOutcome {
    /// Subscriber becomes `bounced` with the given reason.
    MarkBounced { reason: &'static str },
    /// Subscriber's soft bounce counter goes to the given value.
    CountSoft { soft_bounce_count: i32 },
}

impl BounceOutcome {
    /// Whether this outcome counts towards the hard-bounce total.
    pub fn is_hard(&self) -> bool {
        matches!(self, Self::MarkBounced { .. })
    }
}

/// Decide the outcome for a bounce of `kind` on a subscriber that already
/// has `soft_bounce_count` soft bounces.
pub fn classify(kind: BounceKind, soft_bounce_count: i32) -> BounceOutcome {
    match kind {
        BounceKind::Hard => BounceOutcome::MarkBounced {
            reason: HARD_BOUNCE_REASON,
        },
        BounceKind::Soft => {
            let next = soft_bounce_count.max(0) + 1;
            if next >= SOFT_BOUNCE_LIMIT {
                BounceOutcome::MarkBounced {
                    reason: REPEATED_SOFT_BOUNCE_REASON,
                }
            } else {
                BounceOutcome::CountSoft {
                    soft_bounce_count: next,
                }
            }
        }
    }
}
