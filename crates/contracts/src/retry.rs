//! Exponential backoff policy shared by fetchers and sinks

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry / backoff policy
///
/// Delay for retry `n` (0-based) is `min(max, base * factor^n)`, stretched by
/// up to `jitter` of itself and clamped to `max` again. With
/// `jitter < factor - 1` successive delays never decrease.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// First retry delay in milliseconds
    pub base_delay_ms: u64,
    /// Growth factor per retry
    pub factor: f64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Jitter fraction in [0, factor - 1)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            factor: 2.0,
            max_delay_ms: 60_000,
            max_attempts: 3,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = self.factor.max(1.0).powi(retry.min(63) as i32);
        let ms = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Delay before retry `retry`, with `sample` in [0, 1) drawn by the caller
    pub fn delay(&self, retry: u32, sample: f64) -> Duration {
        let base = self.base_delay(retry).as_millis() as f64;
        let stretch = 1.0 + self.jitter.max(0.0) * sample.clamp(0.0, 1.0);
        let ms = (base * stretch).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
