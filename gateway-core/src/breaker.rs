//! Per-key circuit breaker: closed / open / half-open failure isolation.
//!
//! One [`CircuitBreaker`] instance is shared per key space (providers, or
//! per-user memory processing); each key gets its own independent state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

struct KeyState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl KeyState {
    fn new() -> Self {
        Self {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            last_failure: None,
        }
    }
}

/// Failure threshold and cooldown are shared across every key tracked by a
/// given breaker instance.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    states: Mutex<HashMap<String, KeyState>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call for `key` is currently allowed. `Open` breakers past
    /// their cooldown transition to `HalfOpen` as a side effect, so this
    /// should be called immediately before attempting the call.
    pub fn allow(&self, key: &str) -> bool {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_insert_with(KeyState::new);
        match state.phase {
            BreakerPhase::Closed | BreakerPhase::HalfOpen => true,
            BreakerPhase::Open => {
                let elapsed = state
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.cooldown {
                    state.phase = BreakerPhase::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_insert_with(KeyState::new);
        state.phase = BreakerPhase::Closed;
        state.consecutive_failures = 0;
        state.last_failure = None;
    }

    pub fn record_failure(&self, key: &str) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_insert_with(KeyState::new);
        state.last_failure = Some(Instant::now());
        match state.phase {
            BreakerPhase::HalfOpen => {
                state.phase = BreakerPhase::Open;
            }
            BreakerPhase::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.failure_threshold {
                    state.phase = BreakerPhase::Open;
                }
            }
            BreakerPhase::Open => {}
        }
    }

    pub fn phase(&self, key: &str) -> BreakerPhase {
        self.states
            .lock()
            .unwrap()
            .get(key)
            .map(|s| s.phase)
            .unwrap_or(BreakerPhase::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(breaker.allow("primary"));
        breaker.record_failure("primary");
        breaker.record_failure("primary");
        assert_eq!(breaker.phase("primary"), BreakerPhase::Closed);
        breaker.record_failure("primary");
        assert_eq!(breaker.phase("primary"), BreakerPhase::Open);
        assert!(!breaker.allow("primary"));
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure("primary");
        assert_eq!(breaker.phase("primary"), BreakerPhase::Open);
        assert!(breaker.allow("primary")); // cooldown elapsed instantly -> HalfOpen
        assert_eq!(breaker.phase("primary"), BreakerPhase::HalfOpen);
        breaker.record_failure("primary");
        assert_eq!(breaker.phase("primary"), BreakerPhase::Open);
    }

    #[test]
    fn half_open_success_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure("primary");
        assert!(breaker.allow("primary"));
        assert_eq!(breaker.phase("primary"), BreakerPhase::HalfOpen);
        breaker.record_success("primary");
        assert_eq!(breaker.phase("primary"), BreakerPhase::Closed);
    }

    #[test]
    fn keys_are_independent() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure("primary");
        assert_eq!(breaker.phase("primary"), BreakerPhase::Open);
        assert_eq!(breaker.phase("secondary"), BreakerPhase::Closed);
        assert!(breaker.allow("secondary"));
    }

    #[test]
    fn open_within_cooldown_blocks() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure("primary");
        assert!(!breaker.allow("primary"));
    }
}
