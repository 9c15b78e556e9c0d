//! Sliding-window throttle for upstream sources.
//!
//! Each key keeps the timestamps of its calls inside the trailing window. A caller
//! that would exceed the budget sleeps until the oldest call leaves the window.
//! The per-key lock is held across check, sleep and record so concurrent callers
//! on one key cannot overshoot the budget.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    /// Slack added to computed delays so the oldest call is clearly outside the window
    buffer: Duration,
    windows: DashMap<String, Arc<Mutex<VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, buffer: Duration) -> Self {
        Self {
            policy,
            buffer,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Wait until a call for `key` fits in the window, then record it.
    pub async fn throttle(&self, key: &str) {
        let window = self.window_for(key);
        let mut timestamps = window.lock().await;

        loop {
            let now = Instant::now();
            while let Some(oldest) = timestamps.front() {
                if now.duration_since(*oldest) >= self.policy.window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }

            if timestamps.len() < self.policy.max_requests as usize {
                timestamps.push_back(now);
                return;
            }

            let Some(oldest) = timestamps.front().copied() else {
                continue;
            };
            let delay = (oldest + self.policy.window + self.buffer).saturating_duration_since(now);
            debug!("Rate limit reached for {}, delaying {:?}", key, delay);
            sleep(delay).await;
        }
    }

    /// Calls recorded for `key` within the trailing window
    pub async fn in_window(&self, key: &str) -> usize {
        let window = self.window_for(key);
        let timestamps = window.lock().await;
        let now = Instant::now();
        timestamps
            .iter()
            .filter(|ts| now.duration_since(**ts) < self.policy.window)
            .count()
    }

    fn window_for(&self, key: &str) -> Arc<Mutex<VecDeque<Instant>>> {
        if let Some(window) = self.windows.get(key) {
            return Arc::clone(window.value());
        }
        Arc::clone(self.windows.entry(key.to_string()).or_default().value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_ms: u64, max: u32) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(
            RateLimitPolicy::new(Duration::from_millis(window_ms), max),
            Duration::from_millis(10),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_call_waits_for_window() {
        let limiter = limiter(1000, 2);
        let start = Instant::now();

        limiter.throttle("x").await;
        limiter.throttle("x").await;
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.throttle("x").await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1000), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(1100), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = limiter(1000, 1);
        let start = Instant::now();
        limiter.throttle("a").await;
        limiter.throttle("b").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_budget() {
        let limiter = limiter(1000, 3);
        let recorded = Arc::new(Mutex::new(Vec::new()));

        let mut handles = vec![];
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            let recorded = Arc::clone(&recorded);
            handles.push(tokio::spawn(async move {
                limiter.throttle("shared").await;
                recorded.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = recorded.lock().await.clone();
        times.sort();
        assert_eq!(times.len(), 10);
        for (i, start) in times.iter().enumerate() {
            let in_window = times[i..]
                .iter()
                .filter(|t| t.duration_since(*start) < Duration::from_millis(1000))
                .count();
            assert!(in_window <= 3, "{} calls inside one window", in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_window_count() {
        let limiter = limiter(1000, 5);
        limiter.throttle("k").await;
        limiter.throttle("k").await;
        assert_eq!(limiter.in_window("k").await, 2);

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(limiter.in_window("k").await, 0);
    }
}
