//! Fleet supervision.
//!
//! One [`ChannelMonitor`] task per configured channel, each with a child
//! cancellation token. A monitor that stops is recorded and the rest keep
//! running; [`FleetSupervisor::run`] returns once every monitor has stopped.

use std::collections::HashMap;
use std::sync::Arc;

use liverec_capture_engine::CaptureSession;
use liverec_common::config::{validate_channels, ChannelSpec, Settings};
use liverec_common::error::{FailureKind, LiverecResult};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelMonitor, MonitorReport};
use crate::events::{EventBus, EventKind, MonitorEvent};
use crate::probe::LivenessProbe;
use crate::retry::RetryPolicy;
use crate::state::{MonitorPhase, StopCause};

/// Outcome of a fleet run, one report per channel in configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetReport {
    pub monitors: Vec<MonitorReport>,
}

impl FleetReport {
    /// Monitors that stopped on their own rather than on request.
    pub fn gave_up(&self) -> impl Iterator<Item = &MonitorReport> {
        self.monitors
            .iter()
            .filter(|m| matches!(m.cause, StopCause::GaveUp { .. }))
    }

    pub fn total_recordings(&self) -> u64 {
        self.monitors.iter().map(|m| m.recordings).sum()
    }
}

/// Runs a set of channel monitors concurrently.
pub struct FleetSupervisor {
    probe: Arc<dyn LivenessProbe>,
    session: CaptureSession,
    retry: Option<RetryPolicy>,
    bus: EventBus,
}

impl FleetSupervisor {
    pub fn new(probe: Arc<dyn LivenessProbe>, session: CaptureSession) -> Self {
        Self {
            probe,
            session,
            retry: None,
            bus: EventBus::default(),
        }
    }

    /// Override the default retry rules.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Monitor every channel in `specs` until all have stopped.
    ///
    /// Invalid channel lists are rejected before any monitor starts.
    pub async fn run(
        &self,
        specs: &[ChannelSpec],
        settings: &Settings,
        cancel: CancellationToken,
    ) -> LiverecResult<FleetReport> {
        validate_channels(specs)?;
        settings.validate()?;

        let settings = Arc::new(settings.clone());
        let retry = self
            .retry
            .clone()
            .unwrap_or_default()
            .with_poll_interval(settings.poll_interval());

        let logger = tokio::spawn(log_fleet_events(self.bus.subscribe()));

        tracing::info!(
            channels = specs.len(),
            interval = settings.poll_interval_secs,
            output = %settings.output_dir.display(),
            "Starting fleet"
        );

        let handles: Vec<_> = specs
            .iter()
            .map(|spec| {
                let monitor = ChannelMonitor::new(
                    spec.clone(),
                    settings.clone(),
                    self.probe.clone(),
                    self.session.clone(),
                    retry.clone(),
                    self.bus.clone(),
                );
                (spec.name.clone(), tokio::spawn(monitor.run(cancel.child_token())))
            })
            .collect();

        let mut monitors = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(channel = %name, "Monitor task failed: {e}");
                    MonitorReport {
                        channel: name,
                        cause: StopCause::GaveUp {
                            kind: FailureKind::Unknown,
                            reason: format!("Monitor task failed: {e}"),
                        },
                        polls: 0,
                        recordings: 0,
                    }
                }
            };
            monitors.push(report);
        }

        logger.abort();

        let report = FleetReport { monitors };
        tracing::info!(
            recordings = report.total_recordings(),
            gave_up = report.gave_up().count(),
            "Fleet stopped"
        );
        Ok(report)
    }
}

/// Log a fleet-wide view of monitor phases.
async fn log_fleet_events(mut rx: Receiver<MonitorEvent>) {
    let mut phases: HashMap<String, MonitorPhase> = HashMap::new();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Fleet log fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event.kind {
            EventKind::Transition { to, .. } => {
                phases.insert(event.channel, to);
                let recording = phases
                    .values()
                    .filter(|p| **p == MonitorPhase::Recording)
                    .count();
                let stopped = phases
                    .values()
                    .filter(|p| **p == MonitorPhase::Stopped)
                    .count();
                tracing::debug!(recording, stopped, tracked = phases.len(), "Fleet status");
            }
            EventKind::RecordingFinished {
                outcome: liverec_capture_engine::CaptureOutcome::Failed { .. },
                final_path: _,
                bytes,
            } if bytes > 0 => {
                tracing::warn!(channel = %event.channel, bytes, "Partial recording kept on disk");
            }
            _ => {}
        }
    }
}
