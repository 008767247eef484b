use dashmap::DashMap;
use std::time::{Duration, Instant};

// Request timestamps (ms on the limiter clock) still inside the trailing window
#[derive(Debug, Default)]
pub struct RateWindow {
    pub timestamps: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

// Sliding-window limiter keyed by user id, pruned lazily on each check.
// The entry guard holds the shard lock across prune-decide-append.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    max_requests: usize,
    window_ms: u64,
    epoch: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window_ms: millis(window),
            epoch: Instant::now(),
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        let now = millis(self.epoch.elapsed());
        self.check_at(key, now)
    }

    // Same as check, against an explicit clock
    pub fn check_at(&self, key: &str, now_ms: u64) -> RateDecision {
        let cutoff = now_ms.saturating_sub(self.window_ms);

        let mut entry = self.windows.entry(key.to_string()).or_default();

        // a cutoff of 0 means the window reaches back past the epoch, keep everything
        if now_ms >= self.window_ms {
            entry.timestamps.retain(|&t| t > cutoff);
        }

        if entry.timestamps.len() >= self.max_requests {
            let oldest = entry.timestamps.iter().copied().min().unwrap_or(now_ms);
            let wait_ms = oldest.saturating_add(self.window_ms).saturating_sub(now_ms);
            return RateDecision::Denied {
                retry_after_secs: wait_ms.div_ceil(1000),
            };
        }

        entry.timestamps.push(now_ms);
        RateDecision::Allowed
    }

    // Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

// Durations past u64::MAX ms saturate
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
