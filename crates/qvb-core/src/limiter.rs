use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

/// Upper bound on tracked identities before stale entries are evicted.
const MAX_TRACKED: usize = 4096;

/// Per-identity cooldown between verification attempts.
///
/// Fixed window: a request inside the window is rejected WITHOUT updating
/// the recorded timestamp, so rejected retries do not push the window out.
/// In-memory only; resets on restart.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    window: Duration,
    max_tracked: usize,
    last_request: HashMap<UserId, Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_tracked: MAX_TRACKED,
            last_request: HashMap::new(),
        }
    }

    /// Returns `true` and records the current time if the identity is
    /// outside its window; returns `false` otherwise.
    pub fn check_and_record(&mut self, user: UserId) -> bool {
        self.check_at(user, Instant::now())
    }

    pub fn check_at(&mut self, user: UserId, now: Instant) -> bool {
        if let Some(&last) = self.last_request.get(&user) {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }

        if self.last_request.len() >= self.max_tracked {
            let window = self.window;
            self.last_request
                .retain(|_, &mut last| now.saturating_duration_since(last) < window);
        }

        self.last_request.insert(user, now);
        true
    }

    #[cfg(test)]
    fn with_capacity_for_test(window: Duration, max_tracked: usize) -> Self {
        Self {
            window,
            max_tracked,
            last_request: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.last_request.len()
    }
}
