//! Ticker stream reconnection policy
//!
//! Exponential backoff with jitter between attempts, and a ceiling on
//! consecutive failures after which the session stops retrying and serves
//! cached/snapshot prices only.

use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// When and how often the session reopens a dropped ticker stream
#[derive(Clone, Debug)]
pub struct ReconnectConfig {
    /// Reopen the stream after it drops (default: true)
    pub enabled: bool,
    /// Failed connect attempts in a row before the stream is abandoned (default: 10)
    pub max_consecutive_failures: u32,
    /// Wait before the first retry; doubles per further failure (default: 1000ms)
    pub base_delay_ms: u64,
    /// Upper bound on the wait between retries (default: 60000ms)
    pub max_delay_ms: u64,
    /// Random spread applied to each wait, as a fraction (default: 0.1)
    pub jitter_pct: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_consecutive_failures: 10,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_pct: 0.1,
        }
    }
}

impl ReconnectConfig {
    /// Read `STREAM_RECONNECT_*` variables, keeping the default for any
    /// that are missing or unparseable
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_or("STREAM_RECONNECT_ENABLED", defaults.enabled),
            max_consecutive_failures: env_or("STREAM_RECONNECT_MAX_FAILURES", defaults.max_consecutive_failures),
            base_delay_ms: env_or("STREAM_RECONNECT_BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: env_or("STREAM_RECONNECT_MAX_DELAY_MS", defaults.max_delay_ms),
            jitter_pct: env_or("STREAM_RECONNECT_JITTER_PCT", defaults.jitter_pct),
        }
    }

    /// Wait before retry number `failures` (1-based): base delay doubled per
    /// earlier failure, capped, then spread by the jitter fraction
    pub fn calculate_delay(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(32);
        let backoff_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay_ms);

        let jitter = if self.jitter_pct.is_finite() {
            self.jitter_pct.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let spread = backoff_ms as f64 * jitter;
        if spread < 1.0 {
            return Duration::from_millis(backoff_ms);
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((backoff_ms as f64 + offset).max(0.0) as u64)
    }

    pub fn should_give_up(&self, consecutive_failures: u32) -> bool {
        consecutive_failures >= self.max_consecutive_failures
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().to_lowercase().parse().ok())
        .unwrap_or(default)
}

/// Connect outcomes of one session's ticker stream
#[derive(Debug, Default)]
pub struct ReconnectStats {
    /// Connect attempts, including the first
    pub connect_attempts: AtomicU64,
    /// Attempts that got as far as an open stream
    pub streams_opened: AtomicU64,
    /// Attempts that never opened
    pub failed_attempts: AtomicU64,
    /// Failed attempts since the stream was last open
    pub consecutive_failures: AtomicU32,
}

impl ReconnectStats {
    pub fn record_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// The stream opened, whatever ended it later
    pub fn record_success(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the new consecutive failure count
    pub fn record_failure(&self) -> u32 {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get_consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}
