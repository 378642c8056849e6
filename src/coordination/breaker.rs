//! Circuit Breaker
//!
//! Bounds how many load attempts a resource class may start within a
//! cool-down window, to break re-fetch loops where a failed load triggers a
//! re-render that triggers another load.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

// == Circuit Breaker ==
/// Sliding-window attempt counter per resource class.
///
/// Every admitted attempt counts for exactly one cool-down window, whatever
/// its outcome, so the breaker always heals on its own.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Attempts admitted per window
    ceiling: usize,
    /// How long an attempt keeps counting
    cooldown: Duration,
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl CircuitBreaker {
    pub fn new(ceiling: usize, cooldown: Duration) -> Self {
        Self {
            ceiling,
            cooldown,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    // == Try Attempt ==
    /// Records an attempt for `resource` and returns `true`, or returns
    /// `false` without recording when the window is already full.
    pub fn try_attempt(&self, resource: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        let window = attempts.entry(resource.to_string()).or_default();
        Self::expire(window, now, self.cooldown);

        if window.len() >= self.ceiling {
            warn!(
                resource,
                in_flight = window.len(),
                ceiling = self.ceiling,
                "circuit breaker rejected load attempt"
            );
            return false;
        }
        window.push_back(now);
        true
    }

    /// Attempts still counting against `resource`.
    pub fn in_flight(&self, resource: &str) -> usize {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        match attempts.get_mut(resource) {
            Some(window) => {
                Self::expire(window, now, self.cooldown);
                window.len()
            }
            None => 0,
        }
    }

    pub fn is_open(&self, resource: &str) -> bool {
        self.in_flight(resource) >= self.ceiling
    }

    /// Forgets every recorded attempt (logout).
    pub fn reset(&self) {
        self.attempts.lock().clear();
    }

    fn expire(window: &mut VecDeque<Instant>, now: Instant, cooldown: Duration) {
        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= cooldown {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_rejects_past_ceiling() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(5));

        assert!(breaker.try_attempt("course_loads"));
        assert!(breaker.try_attempt("course_loads"));
        assert!(breaker.try_attempt("course_loads"));
        assert!(!breaker.try_attempt("course_loads"));
        assert!(breaker.is_open("course_loads"));
        // Rejections are not recorded
        assert_eq!(breaker.in_flight("course_loads"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_heals_after_cooldown() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(5));
        breaker.try_attempt("course_loads");
        advance(Duration::from_secs(2)).await;
        breaker.try_attempt("course_loads");
        assert!(!breaker.try_attempt("course_loads"));

        advance(Duration::from_secs(3)).await;
        assert_eq!(breaker.in_flight("course_loads"), 1);
        assert!(breaker.try_attempt("course_loads"));

        advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.in_flight("course_loads"), 0);
        assert!(!breaker.is_open("course_loads"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resources_are_independent() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(5));
        assert!(breaker.try_attempt("course_loads"));
        assert!(!breaker.try_attempt("course_loads"));
        assert!(breaker.try_attempt("highlight_loads"));
    }

    #[test]
    fn test_reset() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        assert!(breaker.try_attempt("course_loads"));
        breaker.reset();
        assert!(breaker.try_attempt("course_loads"));
    }
}
