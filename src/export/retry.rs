//! Retry policy for the status poll and file download loops.
//!
//! Both loops historically retried forever on a fixed 2 second interval.
//! That remains the default; callers can bound a loop by attempt count or
//! wall-clock deadline and switch to exponential backoff.

use std::time::{Duration, Instant};

/// Default wait between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default wait between download attempts of the same file.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Growth of the wait between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same interval every time
    Fixed,
    /// Interval multiplied by `factor` after each failure, capped at `max`
    Exponential {
        /// Multiplier applied per failed attempt
        factor: f64,
        /// Upper bound on a single wait
        max: Duration,
    },
}

/// When and how often to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Wait after the first failure
    pub interval: Duration,
    /// How the wait grows
    pub backoff: Backoff,
    /// Total attempts allowed (`None` = unbounded)
    pub max_attempts: Option<u32>,
    /// Wall-clock budget measured from the first attempt (`None` = unbounded)
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_RETRY_INTERVAL)
    }
}

impl RetryPolicy {
    /// Retry forever on a fixed interval.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            backoff: Backoff::Fixed,
            max_attempts: None,
            deadline: None,
        }
    }

    /// Limit the total number of attempts (values below 1 are treated as 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Limit the total time spent retrying.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Grow the interval exponentially.
    pub fn with_exponential_backoff(mut self, factor: f64, max: Duration) -> Self {
        self.backoff = Backoff::Exponential { factor, max };
        self
    }

    /// Whether any bound applies.
    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.deadline.is_some()
    }

    /// Wait after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { factor, max } => {
                let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = self.interval.as_secs_f64() * factor.max(1.0).powi(exponent);
                if secs.is_finite() && secs < max.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    max
                }
            }
        }
    }

    /// Start tracking one retried operation.
    pub fn tracker(&self) -> RetryTracker<'_> {
        RetryTracker {
            policy: self,
            failures: 0,
            started: Instant::now(),
        }
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    Retry(Duration),
    /// A bound has been reached
    GiveUp,
}

/// Attempt bookkeeping for one retried operation.
#[derive(Debug)]
pub struct RetryTracker<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
    started: Instant,
}

impl RetryTracker<'_> {
    /// Record a failed attempt and decide what happens next.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);

        if let Some(max) = self.policy.max_attempts {
            if self.failures >= max {
                return RetryDecision::GiveUp;
            }
        }

        let delay = self.policy.delay_for(self.failures);
        if let Some(deadline) = self.policy.deadline {
            if self.started.elapsed() + delay > deadline {
                return RetryDecision::GiveUp;
            }
        }

        RetryDecision::Retry(delay)
    }

    /// Failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
