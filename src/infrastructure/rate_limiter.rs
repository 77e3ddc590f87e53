//! SMS provider rate limiting (spec.md §4.7: "token-bucket rate limit
//! (per-second / per-minute / per-hour caps + burst), metrics (sent/success/
//! failure/latency) with provider-level success-rate").
//!
//! The teacher declares `governor` in Cargo.toml but never uses it; this is
//! exactly the quota-with-burst primitive governor is built for, so it
//! replaces what would otherwise be a hand-rolled multi-window token
//! bucket (see DESIGN.md).

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};

use crate::domain::models::config::SmsRateLimitConfig;

type Limiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

fn nonzero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n.max(1)).expect("n.max(1) is never zero")
}

fn limiter_per_second(n: u32, burst: u32) -> Limiter {
    RateLimiter::direct(Quota::per_second(nonzero(n)).allow_burst(nonzero(burst)))
}

fn limiter_per_minute(n: u32, burst: u32) -> Limiter {
    RateLimiter::direct(Quota::per_minute(nonzero(n)).allow_burst(nonzero(burst)))
}

fn limiter_per_hour(n: u32, burst: u32) -> Limiter {
    RateLimiter::direct(Quota::per_hour(nonzero(n)).allow_burst(nonzero(burst)))
}

/// Composite per-second / per-minute / per-hour SMS quota plus success-rate
/// metrics (spec §4.7, §8 scenario 6).
pub struct SmsRateLimiter {
    per_second: Limiter,
    per_minute: Limiter,
    per_hour: Limiter,
    sent: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    rate_limited: AtomicU64,
}

impl SmsRateLimiter {
    #[must_use]
    pub fn new(cfg: &SmsRateLimitConfig) -> Self {
        Self {
            per_second: limiter_per_second(cfg.max_per_second, cfg.burst),
            per_minute: limiter_per_minute(cfg.max_per_minute, cfg.burst),
            per_hour: limiter_per_hour(cfg.max_per_hour, cfg.burst),
            sent: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
        }
    }

    /// Acquire-with-wait across all three windows; bounded by `max_wait` so
    /// callers can fail fast instead of blocking forever under sustained load
    /// (spec §8 scenario 6: "queue within the acquire-with-wait budget or
    /// fail with rate-limit error").
    pub async fn acquire(&self, max_wait: Duration) -> Result<(), RateLimitExceeded> {
        let deadline = tokio::time::Instant::now() + max_wait;
        for limiter in [&self.per_second, &self.per_minute, &self.per_hour] {
            match tokio::time::timeout_at(deadline, limiter.until_ready()).await {
                Ok(()) => {}
                Err(_) => {
                    self.rate_limited.fetch_add(1, Ordering::Relaxed);
                    return Err(RateLimitExceeded);
                }
            }
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stats(&self) -> SmsProviderStats {
        let sent = self.sent.load(Ordering::Relaxed);
        let success = self.success.load(Ordering::Relaxed);
        let failure = self.failure.load(Ordering::Relaxed);
        let rate_limited = self.rate_limited.load(Ordering::Relaxed);
        let completed = success + failure;
        let success_rate = if completed == 0 { 0.0 } else { success as f64 / completed as f64 };
        SmsProviderStats { sent, success, failure, rate_limited, success_rate }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmsProviderStats {
    pub sent: u64,
    pub success: u64,
    pub failure: u64,
    pub rate_limited: u64,
    pub success_rate: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("SMS rate limit exceeded")]
pub struct RateLimitExceeded;

/// Convenience alias used at composition time.
pub type SharedSmsRateLimiter = Arc<SmsRateLimiter>;
