//! Retry state machine for calls with an `on failure:` block
//!
//! ```text
//! Attempting(n) --ok--> Succeeded
//! Attempting(n) --err, budget left--> Waiting(n + 1) --> Attempting(n + 1)
//! Attempting(n) --err, budget spent, fallback--> FallbackRunning
//! Attempting(n) --err, budget spent, no fallback--> Failed
//! ```
//!
//! The machine only decides; the interpreter performs the calls and sleeps.

use std::time::Duration;

use super::types::ast::ErrorHandler;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryState {
    /// Attempt number, starting at 1
    Attempting(u32),
    Waiting { next_attempt: u32 },
    Succeeded,
    FallbackRunning,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    state: RetryState,
    max_attempts: u32,
    wait: Option<Duration>,
    has_fallback: bool,
}

impl RetryMachine {
    /// A machine for a call without `on failure:` makes exactly one attempt.
    pub fn new(handler: Option<&ErrorHandler>) -> Self {
        let retries = handler
            .and_then(|h| h.retry.as_ref())
            .map(|policy| policy.retries)
            .unwrap_or(0);
        let wait = handler
            .and_then(|h| h.retry.as_ref())
            .and_then(|policy| policy.wait_seconds)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(saturating_seconds);

        Self {
            state: RetryState::Attempting(1),
            max_attempts: retries.saturating_add(1),
            wait,
            has_fallback: handler.map(|h| h.fallback.is_some()).unwrap_or(false),
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn succeed(&mut self) {
        if let RetryState::Attempting(_) = self.state {
            self.state = RetryState::Succeeded;
        }
    }

    pub fn fail(&mut self) {
        if let RetryState::Attempting(attempt) = self.state {
            self.state = if attempt < self.max_attempts {
                RetryState::Waiting {
                    next_attempt: attempt + 1,
                }
            } else if self.has_fallback {
                RetryState::FallbackRunning
            } else {
                RetryState::Failed
            };
        }
    }

    /// Leave `Waiting` once the pause is over.
    pub fn resume(&mut self) {
        if let RetryState::Waiting { next_attempt } = self.state {
            self.state = RetryState::Attempting(next_attempt);
        }
    }

    /// Pause before the next attempt, multiplied by `scale`.
    pub fn wait_duration(&self, scale: f64) -> Option<Duration> {
        let scale = if scale.is_finite() && scale >= 0.0 { scale } else { 1.0 };
        self.wait
            .map(|wait| saturating_seconds(wait.as_secs_f64() * scale))
            .filter(|wait| !wait.is_zero())
    }
}

/// Seconds as a `Duration`, clamped to `Duration::MAX` when too large to fit.
pub fn saturating_seconds(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::ast::{RetryPolicy, Span, Stmt};

    fn handler(retries: Option<u32>, fallback: bool) -> ErrorHandler {
        ErrorHandler {
            retry: retries.map(|retries| RetryPolicy {
                retries,
                wait_seconds: Some(2.0),
                span: Span::default(),
            }),
            fallback: fallback.then(Vec::<Stmt>::new),
            span: Span::default(),
        }
    }

    #[test]
    fn test_no_handler_fails_after_one_attempt() {
        let mut machine = RetryMachine::new(None);
        assert_eq!(machine.state(), RetryState::Attempting(1));
        machine.fail();
        assert_eq!(machine.state(), RetryState::Failed);
    }

    #[test]
    fn test_retries_then_fallback() {
        let handler = handler(Some(2), true);
        let mut machine = RetryMachine::new(Some(&handler));
        assert_eq!(machine.max_attempts(), 3);

        machine.fail();
        assert_eq!(machine.state(), RetryState::Waiting { next_attempt: 2 });
        machine.resume();
        machine.fail();
        machine.resume();
        assert_eq!(machine.state(), RetryState::Attempting(3));
        machine.fail();
        assert_eq!(machine.state(), RetryState::FallbackRunning);
    }

    #[test]
    fn test_success_mid_retry() {
        let handler = handler(Some(3), false);
        let mut machine = RetryMachine::new(Some(&handler));
        machine.fail();
        machine.resume();
        machine.succeed();
        assert_eq!(machine.state(), RetryState::Succeeded);
    }

    #[test]
    fn test_fallback_without_retry() {
        let handler = handler(None, true);
        let mut machine = RetryMachine::new(Some(&handler));
        machine.fail();
        assert_eq!(machine.state(), RetryState::FallbackRunning);
    }

    #[test]
    fn test_wait_is_scaled() {
        let handler = handler(Some(1), false);
        let machine = RetryMachine::new(Some(&handler));
        assert_eq!(machine.wait_duration(1.0), Some(Duration::from_secs(2)));
        assert_eq!(machine.wait_duration(0.5), Some(Duration::from_secs(1)));
        assert_eq!(machine.wait_duration(0.0), None);
    }

    #[test]
    fn test_huge_waits_saturate() {
        let mut handler = handler(Some(1), false);
        if let Some(policy) = handler.retry.as_mut() {
            policy.wait_seconds = Some(1e20);
        }
        let machine = RetryMachine::new(Some(&handler));
        assert_eq!(machine.wait_duration(1.0), Some(Duration::MAX));
        assert_eq!(machine.wait_duration(1e300), Some(Duration::MAX));
        assert_eq!(saturating_seconds(f64::INFINITY), Duration::MAX);
        assert_eq!(saturating_seconds(f64::NAN), Duration::ZERO);
        assert_eq!(saturating_seconds(1.5), Duration::from_millis(1500));
    }
}
