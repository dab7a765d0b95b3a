//! Monitor events.
//!
//! [`EventBus`] is a thin wrapper over [`tokio::sync::broadcast`]. Publishing
//! never blocks; events sent while nobody is subscribed are dropped, and slow
//! receivers observe `RecvError::Lagged` and skip ahead.

use std::path::PathBuf;
use std::time::Duration;

use liverec_capture_engine::CaptureOutcome;
use liverec_common::error::FailureKind;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::state::{MonitorPhase, StopCause};

/// Something that happened on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorEvent {
    pub channel: String,
    pub at: Instant,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Transition {
        from: MonitorPhase,
        to: MonitorPhase,
    },
    Polled {
        live: bool,
    },
    RecordingStarted {
        target: PathBuf,
    },
    RecordingFinished {
        outcome: CaptureOutcome,
        final_path: Option<PathBuf>,
        bytes: u64,
    },
    BackoffScheduled {
        kind: FailureKind,
        attempt: u32,
        delay: Duration,
    },
    Stopped {
        cause: StopCause,
    },
}

/// Broadcast channel for [`MonitorEvent`]s.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Capacity is shared by all receivers and clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, channel: &str, kind: EventKind) {
        let _ = self.tx.send(MonitorEvent {
            channel: channel.to_string(),
            at: Instant::now(),
            kind,
        });
    }

    /// Receives events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}
