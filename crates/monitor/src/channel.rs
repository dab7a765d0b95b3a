//! Channel monitor state machine.
//!
//! ```text
//! Idle ──► Polling ──live──► Recording ──ok──► Polling
//!            │  ▲                │
//!       error│  └──── Backoff ◄──┘failed
//!            ▼           │
//!         Stopped ◄──────┘ give up / cancel
//! ```
//!
//! A monitor owns its state exclusively and runs at most one capture session
//! at a time. Every wait selects on the cancellation token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use liverec_capture_engine::naming::reserve_target_path;
use liverec_capture_engine::{CaptureJob, CaptureOutcome, CaptureResult, CaptureSession};
use liverec_common::clock::{format_duration, RecordingClock};
use liverec_common::config::{ChannelSpec, Settings};
use liverec_common::error::FailureKind;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::events::{EventBus, EventKind};
use crate::probe::{channel_live_url, LiveStatus, LivenessProbe};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::state::{MonitorPhase, MonitorState, StopCause};

/// Final account of a monitor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub channel: String,
    pub cause: StopCause,
    pub polls: u64,
    pub recordings: u64,
}

/// Watches one channel and records each live session it finds.
pub struct ChannelMonitor {
    spec: ChannelSpec,
    settings: Arc<Settings>,
    probe: Arc<dyn LivenessProbe>,
    session: CaptureSession,
    retry: RetryPolicy,
    bus: EventBus,
    state: MonitorState,
    /// Consecutive failures per kind, cleared by a "not live" answer or a
    /// usable recording.
    failures: HashMap<FailureKind, u32>,
    /// Wait owed before the next probe.
    pending_wait: Option<Duration>,
    polls: u64,
    recordings: u64,
}

impl ChannelMonitor {
    pub fn new(
        spec: ChannelSpec,
        settings: Arc<Settings>,
        probe: Arc<dyn LivenessProbe>,
        session: CaptureSession,
        retry: RetryPolicy,
        bus: EventBus,
    ) -> Self {
        Self {
            spec,
            settings,
            probe,
            session,
            retry,
            bus,
            state: MonitorState::Idle,
            failures: HashMap::new(),
            pending_wait: None,
            polls: 0,
            recordings: 0,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Drive the state machine until it stops.
    pub async fn run(self, cancel: CancellationToken) -> MonitorReport {
        let span = tracing::info_span!("channel", name = %self.spec.name);
        self.drive(cancel).instrument(span).await
    }

    async fn drive(mut self, cancel: CancellationToken) -> MonitorReport {
        tracing::info!(channel_id = %self.spec.channel_id, "Monitor started");

        loop {
            if let MonitorState::Stopped(cause) = &self.state {
                let cause = cause.clone();
                return self.finish(cause);
            }

            let current = std::mem::replace(&mut self.state, MonitorState::Idle);
            let from = current.phase();
            let next = match current {
                MonitorState::Idle => MonitorState::Polling,
                MonitorState::Polling => self.poll(&cancel).await,
                MonitorState::Recording(job) => self.record(job, &cancel).await,
                MonitorState::Backoff { delay, .. } => self.backoff(delay, &cancel).await,
                MonitorState::Stopped(cause) => MonitorState::Stopped(cause),
            };
            self.enter(from, next);
        }
    }

    fn enter(&mut self, from: MonitorPhase, next: MonitorState) {
        let to = next.phase();
        if from != to {
            tracing::debug!(%from, %to, "State transition");
            self.bus
                .publish(&self.spec.name, EventKind::Transition { from, to });
        }
        self.state = next;
    }

    fn finish(self, cause: StopCause) -> MonitorReport {
        match &cause {
            StopCause::Cancelled => tracing::info!(
                polls = self.polls,
                recordings = self.recordings,
                "Monitor stopped"
            ),
            StopCause::GaveUp { kind, reason } => tracing::error!(
                %kind,
                polls = self.polls,
                recordings = self.recordings,
                "Monitor gave up: {reason}"
            ),
        }
        self.bus.publish(
            &self.spec.name,
            EventKind::Stopped {
                cause: cause.clone(),
            },
        );

        MonitorReport {
            channel: self.spec.name,
            cause,
            polls: self.polls,
            recordings: self.recordings,
        }
    }

    async fn poll(&mut self, cancel: &CancellationToken) -> MonitorState {
        if let Some(wait) = self.pending_wait.take() {
            tokio::select! {
                _ = cancel.cancelled() => return MonitorState::Stopped(StopCause::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
        if cancel.is_cancelled() {
            return MonitorState::Stopped(StopCause::Cancelled);
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return MonitorState::Stopped(StopCause::Cancelled),
            status = self.probe.check(&self.spec.channel_id) => status,
        };
        self.polls += 1;

        match status {
            Ok(status) if status.is_live => {
                self.bus
                    .publish(&self.spec.name, EventKind::Polled { live: true });
                tracing::info!(title = ?status.title, "Channel is live");
                match self.build_job(&status) {
                    Ok(job) => MonitorState::Recording(job),
                    Err(e) => self.on_failure(
                        FailureKind::from_io(&e),
                        format!("Cannot create output file: {e}"),
                    ),
                }
            }
            Ok(_) => self.not_live(),
            Err(e) if e.kind() == FailureKind::NotLive => self.not_live(),
            Err(e) => {
                self.bus
                    .publish(&self.spec.name, EventKind::Polled { live: false });
                self.on_failure(e.kind(), e.to_string())
            }
        }
    }

    fn not_live(&mut self) -> MonitorState {
        self.bus
            .publish(&self.spec.name, EventKind::Polled { live: false });
        tracing::debug!("Channel is not live");
        self.failures.clear();
        self.pending_wait = Some(self.settings.poll_interval());
        MonitorState::Polling
    }

    fn build_job(&self, status: &LiveStatus) -> std::io::Result<CaptureJob> {
        let clock = RecordingClock::start();
        let target = reserve_target_path(
            &self.settings.output_dir,
            &self.spec.name,
            &clock,
            &self.settings.container,
        )?;
        let reference = status
            .stream_reference
            .clone()
            .unwrap_or_else(|| channel_live_url(&self.spec.channel_id));
        Ok(CaptureJob::new(reference, target, &self.settings))
    }

    async fn record(&mut self, job: CaptureJob, cancel: &CancellationToken) -> MonitorState {
        self.recordings += 1;
        self.bus.publish(
            &self.spec.name,
            EventKind::RecordingStarted {
                target: job.target_path.clone(),
            },
        );

        let session = self.session.clone();
        let token = cancel.child_token();
        let handle = tokio::spawn(
            async move { session.run(job, token).await }.instrument(tracing::Span::current()),
        );

        // The session observes cancellation itself; waiting here lets it finalize.
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => CaptureResult {
                outcome: CaptureOutcome::Failed {
                    kind: FailureKind::Unknown,
                    reason: format!("Capture task failed: {e}"),
                },
                final_path: None,
                partial_path: None,
                bytes_written: 0,
                elapsed: Duration::ZERO,
            },
        };

        tracing::info!(
            outcome = result.outcome.label(),
            bytes = result.bytes_written,
            elapsed = %format_duration(result.elapsed),
            "Recording finished"
        );
        self.bus.publish(
            &self.spec.name,
            EventKind::RecordingFinished {
                outcome: result.outcome.clone(),
                final_path: result.final_path.clone(),
                bytes: result.bytes_written,
            },
        );

        if cancel.is_cancelled() {
            return MonitorState::Stopped(StopCause::Cancelled);
        }

        match result.outcome {
            CaptureOutcome::Failed {
                kind: FailureKind::NotLive,
                ..
            } => {
                self.pending_wait = Some(self.settings.poll_interval());
                MonitorState::Polling
            }
            CaptureOutcome::Failed { kind, reason } => self.on_failure(kind, reason),
            _ => {
                self.failures.clear();
                self.pending_wait = Some(self.settings.poll_interval());
                MonitorState::Polling
            }
        }
    }

    fn on_failure(&mut self, kind: FailureKind, reason: String) -> MonitorState {
        let count = self.failures.entry(kind).or_insert(0);
        *count = count.saturating_add(1);
        let attempt = *count;

        match self.retry.decide(kind, attempt) {
            RetryDecision::Retry { wait } => {
                if kind == FailureKind::DiskSpace {
                    tracing::warn!(
                        attempt,
                        "Output disk is low on space, retrying in {}: {reason}",
                        format_duration(wait)
                    );
                } else {
                    tracing::warn!(
                        %kind,
                        attempt,
                        "Retrying in {}: {reason}",
                        format_duration(wait)
                    );
                }
                self.bus.publish(
                    &self.spec.name,
                    EventKind::BackoffScheduled {
                        kind,
                        attempt,
                        delay: wait,
                    },
                );
                MonitorState::Backoff {
                    delay: wait,
                    kind,
                    attempt,
                }
            }
            RetryDecision::GiveUp => MonitorState::Stopped(StopCause::GaveUp { kind, reason }),
        }
    }

    async fn backoff(&mut self, delay: Duration, cancel: &CancellationToken) -> MonitorState {
        tokio::select! {
            _ = cancel.cancelled() => MonitorState::Stopped(StopCause::Cancelled),
            _ = tokio::time::sleep(delay) => MonitorState::Polling,
        }
    }
}
