//! Per-(tenant, actor) admission control.
//!
//! Fixed-window counters held in memory only; a restart clears them, which
//! fails open by design. Checks are atomic per key under the map lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started_at: Instant,
    count: u32,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    counters: Mutex<HashMap<(String, String), Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one request for `(tenant, actor)`. On rejection returns the
    /// time remaining until the window resets.
    pub fn check(&self, tenant_id: &str, actor_id: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap();
        let key = (tenant_id.to_string(), actor_id.to_string());

        let window = counters.entry(key).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let elapsed = now.duration_since(window.started_at);
            return Err(self.window.saturating_sub(elapsed));
        }

        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        for _ in 0..3 {
            assert!(limiter.check("t1", "alice").is_ok());
        }
        let retry_after = limiter.check("t1", "alice").unwrap_err();
        assert!(retry_after <= Duration::from_secs(60));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("t1", "alice").is_ok());
        assert!(limiter.check("t1", "bob").is_ok());
        assert!(limiter.check("t2", "alice").is_ok());
        assert!(limiter.check("t1", "alice").is_err());
    }

    #[test]
    fn window_elapse_resets_counter() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 1);
        assert!(limiter.check("t1", "alice").is_ok());
        assert!(limiter.check("t1", "alice").is_err());
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check("t1", "alice").is_ok());
    }
}
