//! Per-channel monitor state.

use std::fmt;
use std::time::Duration;

use liverec_capture_engine::CaptureJob;
use liverec_common::error::FailureKind;
use serde::Serialize;

/// Where a channel monitor is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Idle,

    /// Probing for a live broadcast.
    Polling,

    /// One capture session in flight.
    Recording(CaptureJob),

    /// Waiting out a failure.
    Backoff {
        delay: Duration,
        kind: FailureKind,
        attempt: u32,
    },

    /// Terminal.
    Stopped(StopCause),
}

impl MonitorState {
    pub fn phase(&self) -> MonitorPhase {
        match self {
            Self::Idle => MonitorPhase::Idle,
            Self::Polling => MonitorPhase::Polling,
            Self::Recording(_) => MonitorPhase::Recording,
            Self::Backoff { .. } => MonitorPhase::Backoff,
            Self::Stopped(_) => MonitorPhase::Stopped,
        }
    }
}

/// [`MonitorState`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    Idle,
    Polling,
    Recording,
    Backoff,
    Stopped,
}

impl MonitorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Recording => "recording",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a monitor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCause {
    Cancelled,
    GaveUp { kind: FailureKind, reason: String },
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::GaveUp { kind, reason } => write!(f, "gave up ({kind}): {reason}"),
        }
    }
}
