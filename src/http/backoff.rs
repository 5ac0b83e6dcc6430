//! Backoff state and the retry state machine shared by the async and
//! blocking engines.
//!
//! Nothing here sleeps or reads a clock. Callers pass the elapsed time in and
//! act on the returned [`Step`], so both scheduling modes run exactly the same
//! transitions.

use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use std::time::Duration;

use super::classify::{Outcome, classify};
use crate::error::ClientError;

/// Default first backoff interval, before growth.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Default ceiling for a single backoff sleep.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(3);

/// Default wall-clock budget for one logical call.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Default growth factor applied to the interval before every wait.
pub const DEFAULT_MULTIPLIER: u32 = 2;

/// Retry configuration for a [`CallEngine`](super::CallEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry on 400/423/503 instead of failing on the first one.
    pub retry: bool,
    pub initial_interval: Duration,
    pub multiplier: u32,
    pub max_interval: Duration,
    /// Measured from the first attempt of a logical call.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry: true,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first transient status instead of waiting it out.
    pub fn no_retry() -> Self {
        Self {
            retry: false,
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_intervals(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self
    }
}

/// Exponential backoff interval for one logical call.
///
/// The interval only grows and never passes `max`. Yields the delay to wait
/// before each retry: starting from 100ms that is 200ms, 400ms, 800ms,
/// 1.6s, then 3s forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    interval: Duration,
    multiplier: u32,
    max: Duration,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            interval: policy.initial_interval,
            multiplier: policy.multiplier.max(1),
            max: policy.max_interval,
        }
    }

    pub fn current(&self) -> Duration {
        self.interval
    }

    /// Grow the interval and return the next delay.
    pub fn next_interval(&mut self) -> Duration {
        let grown = self
            .interval
            .checked_mul(self.multiplier)
            .unwrap_or(self.max);
        self.interval = grown.min(self.max).max(self.interval);
        self.interval
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_interval())
    }
}

/// One round trip to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAttempt {
    /// Zero-based.
    pub index: u32,
    pub elapsed: Duration,
    pub status: u16,
    pub body: String,
}

/// What the engine should do after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Return this parsed body to the caller.
    Done(Value),
    /// Sleep for this long, then try again.
    Wait(Duration),
    Fail(ClientError),
}

/// Retry state owned by exactly one logical call.
#[derive(Debug, Clone)]
pub struct RetryLoop {
    label: String,
    retry: bool,
    deadline: Duration,
    backoff: Backoff,
    attempts: u32,
}

impl RetryLoop {
    /// `retry` and `deadline` override the policy for this call when set.
    pub fn new(
        label: impl Into<String>,
        policy: &RetryPolicy,
        retry: Option<bool>,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            label: label.into(),
            retry: retry.unwrap_or(policy.retry),
            deadline: deadline.unwrap_or(policy.deadline),
            backoff: Backoff::new(policy),
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Check the deadline and claim the next attempt index.
    pub fn begin_attempt(&mut self, elapsed: Duration) -> Result<u32, ClientError> {
        if elapsed > self.deadline {
            warn!(
                "{}: deadline of {:.1}s exceeded after {} attempt(s)",
                self.label,
                self.deadline.as_secs_f64(),
                self.attempts
            );
            return Err(ClientError::deadline_exceeded(self.deadline, self.attempts));
        }

        let index = self.attempts;
        if index > 0 {
            info!("{}: retrying (attempt {})...", self.label, index + 1);
        }
        self.attempts += 1;
        Ok(index)
    }

    pub fn on_response(&mut self, attempt: CallAttempt) -> Step {
        if attempt.status != 200 {
            debug!(
                "{}: attempt {} returned status {}: {}",
                self.label,
                attempt.index + 1,
                attempt.status,
                attempt.body
            );
        }

        match classify(attempt.status, self.retry) {
            Outcome::Success => Step::Done(parse_body(&attempt.body)),
            Outcome::Retry(reason) => {
                let delay = self.backoff.next_interval();
                warn!(
                    "{}: {} (status {}), retrying in {}ms...",
                    self.label,
                    reason,
                    attempt.status,
                    delay.as_millis()
                );
                Step::Wait(delay)
            }
            Outcome::Fatal(kind, detail) => {
                let err = ClientError::new(kind, detail).with_response(attempt.status, attempt.body);
                error!("{}: {}", self.label, err);
                Step::Fail(err)
            }
        }
    }
}

/// Bodies that are not JSON count as an empty object.
pub fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::Object(Map::new()))
}
