//! Broker read throttling.
//!
//! The reader loop waits on a [`RateLimiter`] before every broker read. The
//! limiter is injected so tests can run the pipeline without real time passing.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;

/// Trait for pacing broker reads.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until one read is allowed.
    async fn acquire(&self);
}

/// A no-op implementation of RateLimiter that never waits.
#[derive(Debug, Clone, Default)]
pub struct NoOpRateLimiter;

impl NoOpRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for NoOpRateLimiter {
    async fn acquire(&self) {}
}

/// Token bucket limiter backed by `governor`.
///
/// Refills `per_second` tokens per second into a bucket that also holds at
/// most `per_second` tokens, one token per read.
pub struct GovernorRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl GovernorRateLimiter {
    pub fn per_second(per_second: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(per_second);
        Self {
            limiter: governor::RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl RateLimiter for GovernorRateLimiter {
    async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
