//! Bounded retry with a fixed delay.
//!
//! [`RetryPolicy`] is plain data; [`RetryPolicy::execute`] drives an attempt
//! closure through the per-message state machine
//!
//! ```text
//! Received -> Attempting(1) -> Succeeded
//!                           -> Attempting(2) -> ... -> Exhausted
//! ```
//!
//! and sleeps through an injected [`Clock`] between attempts only, so
//! `max_attempts` attempts cost `max_attempts - 1` delays.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use courier_common::types::DeliveryStatus;

/// Default number of attempts per message.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between two attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// How often and how patiently a message is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Processing state of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Received,
    /// Attempt `n` (1-based) is in flight.
    Attempting(u32),
    Succeeded,
    Exhausted,
}

impl DeliveryState {
    /// The state after an attempt made in `self` finished with `succeeded`.
    ///
    /// `Received` moves to the first attempt regardless of `succeeded`;
    /// terminal states never move.
    pub fn advance(self, succeeded: bool, policy: &RetryPolicy) -> DeliveryState {
        match self {
            DeliveryState::Received => DeliveryState::Attempting(1),
            DeliveryState::Attempting(_) if succeeded => DeliveryState::Succeeded,
            DeliveryState::Attempting(n) if n >= policy.max_attempts => DeliveryState::Exhausted,
            DeliveryState::Attempting(n) => DeliveryState::Attempting(n + 1),
            terminal => terminal,
        }
    }
}

/// Terminal result of [`RetryPolicy::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Status recorded for this outcome in the delivery log.
    pub fn status(&self) -> DeliveryStatus {
        match self {
            RetryOutcome::Succeeded { .. } => DeliveryStatus::Success,
            RetryOutcome::Exhausted { .. } => DeliveryStatus::Failed,
        }
    }
}

/// Source of suspension between attempts.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `attempt` until it succeeds or the policy is exhausted.
    ///
    /// The closure receives the 1-based attempt number. A policy with
    /// `max_attempts == 0` still makes one attempt.
    pub async fn execute<F, Fut, T, E>(&self, clock: &dyn Clock, mut attempt: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut state = DeliveryState::Received.advance(false, self);
        let mut n = 1;

        loop {
            let result = attempt(n).await;
            state = state.advance(result.is_ok(), self);

            match (result, state) {
                (Ok(value), _) => return RetryOutcome::Succeeded { value, attempts: n },
                (Err(_), DeliveryState::Attempting(next)) => {
                    clock.sleep(self.delay).await;
                    n = next;
                }
                (Err(last_error), _) => {
                    return RetryOutcome::Exhausted {
                        last_error,
                        attempts: n,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Clock that records requested sleeps instead of sleeping.
    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn test_state_machine_happy_path() {
        let policy = RetryPolicy::default();
        let state = DeliveryState::Received.advance(false, &policy);
        assert_eq!(state, DeliveryState::Attempting(1));
        assert_eq!(state.advance(true, &policy), DeliveryState::Succeeded);
    }

    #[test]
    fn test_state_machine_exhausts_after_max_attempts() {
        let policy = RetryPolicy::default();
        let mut state = DeliveryState::Attempting(1);
        state = state.advance(false, &policy);
        assert_eq!(state, DeliveryState::Attempting(2));
        state = state.advance(false, &policy);
        assert_eq!(state, DeliveryState::Attempting(3));
        state = state.advance(false, &policy);
        assert_eq!(state, DeliveryState::Exhausted);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let policy = RetryPolicy::default();
        assert_eq!(
            DeliveryState::Succeeded.advance(false, &policy),
            DeliveryState::Succeeded
        );
        assert_eq!(
            DeliveryState::Exhausted.advance(true, &policy),
            DeliveryState::Exhausted
        );
    }

    #[tokio::test]
    async fn test_always_failing_makes_three_attempts_and_two_delays() {
        let clock = RecordingClock::default();
        let policy = RetryPolicy::default();
        let mut calls = 0;

        let outcome: RetryOutcome<(), String> = policy
            .execute(&clock, |n| {
                calls += 1;
                async move { Err(format!("failure #{}", n)) }
            })
            .await;

        assert_eq!(calls, 3);
        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                last_error: "failure #3".to_string(),
                attempts: 3
            }
        );
        let sleeps = clock.sleeps.lock().unwrap();
        assert_eq!(*sleeps, vec![Duration::from_secs(1); 2]);
        assert_eq!(sleeps.iter().sum::<Duration>(), Duration::from_secs(2));
        assert_eq!(outcome.status(), DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_success_on_attempt_k_stops_retrying() {
        for k in 1..=3u32 {
            let clock = RecordingClock::default();
            let mut calls = 0;

            let outcome: RetryOutcome<u32, &str> = RetryPolicy::default()
                .execute(&clock, |n| {
                    calls += 1;
                    async move { if n == k { Ok(n) } else { Err("nope") } }
                })
                .await;

            assert_eq!(calls, k);
            assert_eq!(outcome.attempts(), k);
            assert_eq!(outcome.status(), DeliveryStatus::Success);
            assert_eq!(clock.sleeps.lock().unwrap().len(), (k - 1) as usize);
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let clock = RecordingClock::default();
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        let outcome: RetryOutcome<(), &str> = policy.execute(&clock, |_| async { Err("x") }).await;

        assert_eq!(outcome.attempts(), 1);
        assert!(clock.sleeps.lock().unwrap().is_empty());
    }
}
