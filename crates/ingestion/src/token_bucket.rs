//! Per-source token bucket
//!
//! Capacity tokens refill linearly over one polling interval. Uses tokio's
//! clock so tests can run under a paused runtime.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiter
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    /// tokens per second
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Full bucket of `capacity` tokens refilled over `period`
    pub fn new(capacity: f64, period: Duration) -> Self {
        let capacity = capacity.max(1.0);
        let period = period.as_secs_f64().max(0.001);
        Self {
            capacity,
            refill_rate: capacity / period,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens currently available (after refill)
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Take a token if one is available, otherwise return the wait until one is
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    /// Wait for a token, giving up once `max_wait` has elapsed
    ///
    /// Returns `false` when no token became available in time.
    pub async fn acquire(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return true,
                Err(wait) => wait,
            };
            let now = Instant::now();
            if now + wait > deadline {
                return false;
            }
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
            state.last_refill = now;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bucket_drains_then_refills() {
        let bucket = TokenBucket::new(2.0, Duration::from_secs(10));
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());

        let wait = bucket.try_acquire().unwrap_err();
        assert!((wait.as_secs_f64() - 5.0).abs() < 1e-6, "got: {wait:?}");

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(bucket.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_within_deadline() {
        let bucket = TokenBucket::new(1.0, Duration::from_secs(4));
        assert!(bucket.acquire(Duration::ZERO).await);

        let start = Instant::now();
        assert!(bucket.acquire(Duration::from_secs(10)).await);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_gives_up_past_deadline() {
        let bucket = TokenBucket::new(1.0, Duration::from_secs(60));
        assert!(bucket.acquire(Duration::ZERO).await);
        assert!(!bucket.acquire(Duration::from_secs(30)).await);
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let bucket = TokenBucket::new(3.0, Duration::from_secs(3));
            tokio::time::advance(Duration::from_secs(100)).await;
            assert_eq!(bucket.available(), 3.0);
        });
    }
}
