use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep};

/// Shortest pause between two attempts to get a token.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Token bucket admission control.
///
/// Tokens refill continuously at `tokens_per_second`, capped at one second
/// worth of tokens. Each granted acquisition consumes exactly one token.
/// The bucket starts with a single token so that a run does not begin with a burst.
///
/// Refill and consume happen under one lock, so the bucket can be shared
/// by several workers without over-admission.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    tokens_per_second: f64,
    max_tokens: f64,
    retry_delay: Duration,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `max_ops_per_second <= 0` disables the limiter.
    pub(crate) fn new(max_ops_per_second: f64) -> Self {
        let tokens_per_second = if max_ops_per_second.is_finite() {
            max_ops_per_second.max(0.)
        } else {
            0.
        };
        // a rate below 1 op/s still has to be able to hold a whole token
        let max_tokens = tokens_per_second.max(1.);

        let retry_delay = if tokens_per_second > 0. {
            Duration::from_millis((1000. / tokens_per_second).ceil() as u64).max(MIN_RETRY_DELAY)
        } else {
            MIN_RETRY_DELAY
        };

        Self {
            tokens_per_second,
            max_tokens,
            retry_delay,
            bucket: Mutex::new(Bucket {
                tokens: 1.,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Limiter for one of `workers` connections sharing a global rate.
    ///
    /// Returns `None` when no rate limit is configured.
    pub(crate) fn per_worker(global_ops_per_second: u64, workers: usize) -> Option<Self> {
        if global_ops_per_second == 0 || workers == 0 {
            return None;
        }
        Some(Self::new(global_ops_per_second as f64 / workers as f64))
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.tokens_per_second > 0.
    }

    /// Wait until a token is available and consume it.
    pub(crate) async fn acquire(&self) {
        if !self.is_enabled() {
            return;
        }
        while !self.try_acquire() {
            sleep(self.retry_delay).await;
        }
    }

    fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);

        if bucket.tokens >= 1. {
            bucket.tokens -= 1.;
            true
        } else {
            false
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed.is_zero() {
            return;
        }
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.tokens_per_second).min(self.max_tokens);
        bucket.last_refill = now;
    }
}
