//! Sliding-window rate limiter, one instance per external channel.
//!
//! The limiter keeps the timestamps of permitted calls inside the window. A call that would
//! exceed `capacity` waits until the oldest timestamp leaves the window. The optional
//! minimum spacing is measured from the later of the last permitted call and the last call
//! reported through `record_success`. The permitted slot is reserved under the lock, so
//! concurrent callers are spaced out even before any of them reports success.
//!
//! The internal lock is only held while inspecting or recording timestamps, never across a
//! sleep or the caller's external call.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct WindowState {
    calls: VecDeque<Instant>,
    last_permitted: Option<Instant>,
    last_success: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    channel: &'static str,
    capacity: usize,
    window: Duration,
    min_spacing: Option<Duration>,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(channel: &'static str, capacity: usize, window: Duration) -> Self {
        Self {
            channel,
            capacity: capacity.max(1),
            window,
            min_spacing: None,
            state: Mutex::new(WindowState {
                calls: VecDeque::new(),
                last_permitted: None,
                last_success: None,
            }),
        }
    }

    /// Adds a fixed minimum delay since the previous permitted or successful call.
    pub fn with_min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing = Some(spacing);
        self
    }

    /// Waits until a call is permitted, then records it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                self.evict_expired(&mut state, now);

                let capacity_wait = if state.calls.len() >= self.capacity {
                    state
                        .calls
                        .front()
                        .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                        .unwrap_or_default()
                } else {
                    Duration::ZERO
                };

                let last = state.last_permitted.max(state.last_success);
                let spacing_wait = match (self.min_spacing, last) {
                    (Some(spacing), Some(last)) => (last + spacing).saturating_duration_since(now),
                    _ => Duration::ZERO,
                };

                let wait = capacity_wait.max(spacing_wait);
                if wait.is_zero() {
                    state.calls.push_back(now);
                    state.last_permitted = Some(now);
                    return;
                }
                wait
            };

            debug!(
                "Rate limit on channel '{}': waiting {}ms",
                self.channel,
                wait.as_millis()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Marks the most recent call as successful for the minimum-spacing rule.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.last_success = Some(Instant::now());
    }

    /// Number of calls currently counted inside the window.
    #[cfg(test)]
    pub async fn in_window(&self) -> usize {
        let mut state = self.state.lock().await;
        self.evict_expired(&mut state, Instant::now());
        state.calls.len()
    }

    fn evict_expired(&self, state: &mut WindowState, now: Instant) {
        while let Some(oldest) = state.calls.front() {
            if *oldest + self.window <= now {
                state.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_calls_under_capacity_do_not_wait() {
        let limiter = RateLimiter::new("test", 3, Duration::from_secs(3600));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_over_capacity_waits_for_oldest_to_expire() {
        let limiter = RateLimiter::new("test", 2, Duration::from_secs(3600));
        let start = Instant::now();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(600)).await;
        limiter.acquire().await;

        limiter.acquire().await;

        // The first call leaves the window exactly one hour after it was made.
        assert_eq!(start.elapsed(), Duration::from_secs(3600));
        assert_eq!(limiter.in_window().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_discarded() {
        let limiter = RateLimiter::new("test", 1, Duration::from_secs(60));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_applies_after_success() {
        let limiter = RateLimiter::new("email", 10, Duration::from_secs(3600))
            .with_min_spacing(Duration::from_secs(30));

        limiter.acquire().await;
        limiter.record_success().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_applies_between_permitted_calls() {
        let limiter = RateLimiter::new("email", 10, Duration::from_secs(3600))
            .with_min_spacing(Duration::from_secs(30));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_counts_from_late_success() {
        let limiter = RateLimiter::new("email", 10, Duration::from_secs(3600))
            .with_min_spacing(Duration::from_secs(30));

        let start = Instant::now();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.record_success().await;

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_senders_are_spaced_apart() {
        let limiter = Arc::new(
            RateLimiter::new("email", 10, Duration::from_secs(3600))
                .with_min_spacing(Duration::from_secs(30)),
        );
        let start = Instant::now();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    let sent = Instant::now();
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    limiter.record_success().await;
                    sent
                })
            })
            .collect();

        let mut sent = Vec::new();
        for handle in handles {
            sent.push(handle.await.unwrap() - start);
        }
        sent.sort();

        assert_eq!(sent[0], Duration::ZERO);
        assert!(
            sent[1] - sent[0] >= Duration::from_secs(30),
            "gap was {:?}",
            sent[1] - sent[0]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_respect_capacity() {
        let limiter = Arc::new(RateLimiter::new("test", 2, Duration::from_secs(100)));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap() - start);
        }
        finished.sort();

        assert_eq!(finished[0], Duration::ZERO);
        assert_eq!(finished[1], Duration::ZERO);
        assert_eq!(finished[2], Duration::from_secs(100));
        assert_eq!(finished[3], Duration::from_secs(100));
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let limiter = RateLimiter::new("test", 0, Duration::from_secs(1));
        assert_eq!(limiter.capacity, 1);
    }
}
