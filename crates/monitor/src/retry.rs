//! Retry decisions for channel monitors.
//!
//! [`RetryPolicy::decide`] maps a failure class and the number of consecutive
//! failures of that class to either a wait or a give-up. It is a pure function
//! of its inputs; the monitor owns the per-kind failure counters.

use std::time::Duration;

use liverec_common::error::FailureKind;

/// Exponential backoff: `first × factor^attempt`, clamped to `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
}

impl BackoffPolicy {
    /// Delay for a 0-indexed attempt.
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { wait: Duration },
    GiveUp,
}

/// Per-kind retry rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Backoff for network failures. Never gives up.
    pub network: BackoffPolicy,

    /// Backoff for unclassified failures.
    pub unknown: BackoffPolicy,

    /// Consecutive unclassified failures tolerated before giving up.
    pub max_unknown_attempts: u32,

    /// Fixed wait while the disk is full. Never gives up.
    pub disk_space_interval: Duration,

    /// Wait used when a "not live" answer is routed here.
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network: BackoffPolicy {
                first: Duration::from_secs(5),
                max: Duration::from_secs(300),
                factor: 2.0,
            },
            unknown: BackoffPolicy {
                first: Duration::from_secs(10),
                max: Duration::from_secs(600),
                factor: 2.0,
            },
            max_unknown_attempts: 5,
            disk_space_interval: Duration::from_secs(300),
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Decide what to do after the `attempt`-th consecutive failure of `kind` (1-based).
    pub fn decide(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        let index = attempt.saturating_sub(1);
        match kind {
            FailureKind::TransientNetwork => RetryDecision::Retry {
                wait: self.network.next(index),
            },
            FailureKind::AuthRequired | FailureKind::ConfigInvalid => RetryDecision::GiveUp,
            FailureKind::DiskSpace => RetryDecision::Retry {
                wait: self.disk_space_interval,
            },
            FailureKind::Unknown if attempt >= self.max_unknown_attempts => RetryDecision::GiveUp,
            FailureKind::Unknown => RetryDecision::Retry {
                wait: self.unknown.next(index),
            },
            FailureKind::NotLive => RetryDecision::Retry {
                wait: self.poll_interval,
            },
        }
    }
}
