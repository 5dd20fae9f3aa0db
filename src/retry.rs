//! Retry bookkeeping for failed long-text publishes.
//!
//! A [`RetryTask`] is created when the handler's first publish attempt fails.
//! The retrier then owns it: it waits until [`RETRY_COOL_DOWN`] has passed
//! since the last attempt, tries again, and on failure either re-enqueues the
//! task with one less retry or drops it once the budget is spent.

use std::time::Duration;
use tokio::time::Instant;

use crate::constants::RETRY_COOL_DOWN;

/// A publish that failed and is waiting for another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTask {
    pub author_id: u64,
    pub message_id: u64,
    /// Attempts still allowed after the next one fails.
    pub retries_remaining: u32,
    pub last_attempt: Instant,
}

impl RetryTask {
    /// A task for a publish that just failed, with the full retry budget.
    pub fn new(author_id: u64, message_id: u64, max_retries: u32) -> Self {
        Self {
            author_id,
            message_id,
            retries_remaining: max_retries,
            last_attempt: Instant::now(),
        }
    }

    /// How long to wait before this task may be attempted again.
    pub fn remaining_cool_down(&self) -> Duration {
        self.remaining_cool_down_at(Instant::now())
    }

    pub(crate) fn remaining_cool_down_at(&self, now: Instant) -> Duration {
        (self.last_attempt + RETRY_COOL_DOWN).saturating_duration_since(now)
    }

    /// The task to re-enqueue after another failed attempt, or `None` when
    /// the retry budget is exhausted.
    pub fn after_failure(self) -> Option<Self> {
        if self.retries_remaining == 0 {
            return None;
        }
        Some(Self {
            retries_remaining: self.retries_remaining - 1,
            last_attempt: Instant::now(),
            ..self
        })
    }
}
