use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    /// Rejected; the current window closes in `retry_after` seconds.
    Limited { retry_after: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    admitted: u32,
}

/// Fixed-window limiter shared by every API request: at most `max_requests`
/// per window, no queueing.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    current: Arc<Mutex<Window>>,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            current: Arc::new(Mutex::new(Window {
                started: Instant::now(),
                admitted: 0,
            })),
        }
    }

    pub fn allow(&self) -> RateDecision {
        let now = Instant::now();
        // The window is two plain fields; a panic elsewhere cannot leave it half-written.
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if now.duration_since(current.started) >= self.window {
            *current = Window {
                started: now,
                admitted: 0,
            };
        }

        if current.admitted >= self.max_requests {
            let closes_in = self
                .window
                .saturating_sub(now.duration_since(current.started));
            return RateDecision::Limited {
                retry_after: ceil_secs(closes_in),
            };
        }

        current.admitted += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - current.admitted,
        }
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rejects_once_window_is_full() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 2);

        assert_eq!(limiter.allow(), RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.allow(), RateDecision::Allowed { remaining: 0 });

        tokio::time::advance(Duration::from_millis(10_500)).await;
        assert_eq!(limiter.allow(), RateDecision::Limited { retry_after: 50 });
    }

    #[tokio::test(start_paused = true)]
    async fn next_window_starts_fresh() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 1);
        assert!(matches!(limiter.allow(), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.allow(), RateDecision::Limited { .. }));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.allow(), RateDecision::Allowed { remaining: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_one_window() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 1);
        let other = limiter.clone();
        assert!(matches!(limiter.allow(), RateDecision::Allowed { .. }));
        assert!(matches!(other.allow(), RateDecision::Limited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_at_least_one_second() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 1);
        limiter.allow();
        tokio::time::advance(Duration::from_millis(59_900)).await;
        assert_eq!(limiter.allow(), RateDecision::Limited { retry_after: 1 });
    }
}
