//! Token bucket limiting how often the QC backend is polled.

use std::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Rate limit status snapshot.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub requests_per_minute: u32,
    pub tokens_available: f32,
    pub next_available_in_ms: Option<u64>,
}

/// Token bucket: tokens refill at a constant rate and each request takes one.
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    last_refill: Instant,
}

impl TokenBucket {
    /// The bucket starts full.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f32(tokens_needed / self.refill_rate))
        }
    }

    pub fn status(&mut self) -> RateLimitStatus {
        self.refill();
        RateLimitStatus {
            requests_per_minute: self.capacity as u32,
            tokens_available: self.tokens,
            next_available_in_ms: if self.tokens >= 1.0 {
                None
            } else {
                let tokens_needed = 1.0 - self.tokens;
                Some((tokens_needed / self.refill_rate * 1000.0) as u64)
            },
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Process-wide cap on QC polls, shared by all workers.
pub struct PollRateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl PollRateLimiter {
    pub fn new(polls_per_minute: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(polls_per_minute)),
        }
    }

    /// Take a poll slot, or return the wait until the next one.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        match self.bucket.lock() {
            Ok(mut bucket) => bucket.try_acquire(),
            // A poisoned bucket still holds valid counters.
            Err(poisoned) => poisoned.into_inner().try_acquire(),
        }
    }

    pub fn status(&self) -> RateLimitStatus {
        match self.bucket.lock() {
            Ok(mut bucket) => bucket.status(),
            Err(poisoned) => poisoned.into_inner().status(),
        }
    }
}
