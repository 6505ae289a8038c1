//! Batch planning and the hourly/daily send budget.

use std::ops::Range;
use std::time::Duration;

/// Default recipients per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default pause between consecutive batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(120);

/// Default cap on emails sent within any rolling hour.
pub const DEFAULT_MAX_PER_HOUR: u64 = 500;

/// Default cap on emails sent within any rolling day.
pub const DEFAULT_MAX_PER_DAY: u64 = 2000;

/// Split `total` recipients into consecutive index ranges of at most
/// `batch_size` each. A zero batch size is treated as one.
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}

/// Rolling-window send limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendBudget {
    pub max_per_hour: u64,
    pub max_per_day: u64,
}

impl Default for SendBudget {
    fn default() -> Self {
        Self {
            max_per_hour: DEFAULT_MAX_PER_HOUR,
            max_per_day: DEFAULT_MAX_PER_DAY,
        }
    }
}

impl SendBudget {
    /// How many more emails may go out given what was already sent in the
    /// last hour and the last day.
    pub fn remaining(&self, sent_last_hour: u64, sent_last_day: u64) -> u64 {
        let hour = self.max_per_hour.saturating_sub(sent_last_hour);
        let day = self.max_per_day.saturating_sub(sent_last_day);
        hour.min(day)
    }

    /// Returns `true` if a batch of `batch_len` fits in the remaining budget.
    pub fn allows(&self, batch_len: usize, sent_last_hour: u64, sent_last_day: u64) -> bool {
        self.remaining(sent_last_hour, sent_last_day) >= batch_len as u64
    }

    /// Clamp a requested batch size so a single batch can always fit in an
    /// empty budget.
    pub fn clamp_batch_size(&self, batch_size: usize) -> usize {
        let cap = self.max_per_hour.min(self.max_per_day).max(1);
        (batch_size.max(1) as u64).min(cap) as usize
    }
}
