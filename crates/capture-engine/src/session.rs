//! Capture session management.
//!
//! One session records one stream to one file. Output is written to a hidden
//! temp file next to the target and renamed into place only once the engine
//! has exited with a usable result. A failed capture never deletes what was
//! written; the partial file is left in place and reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use liverec_common::clock::format_duration;
use liverec_common::config::{Credentials, Quality, Settings};
use liverec_common::error::{FailureKind, LiverecError, LiverecResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::disk::{bytes_to_mb, DiskSpace};
use crate::engine::{CaptureEngine, EngineExit, EngineProcess, EngineRequest};
use crate::naming::{promote, temp_path_for};

/// How long to wait for the engine to be reaped after a forced kill.
const DEFAULT_KILL_WAIT: Duration = Duration::from_secs(5);

/// One capture to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureJob {
    /// Stream URL or engine-understood reference.
    pub stream_reference: String,

    /// Final output path. Must not exist yet; its temp file may already be
    /// reserved (empty).
    pub target_path: PathBuf,

    pub quality: Quality,

    pub credentials: Option<Credentials>,

    /// Stop recording after this long.
    pub duration_limit: Option<Duration>,
}

impl CaptureJob {
    pub fn new(
        stream_reference: impl Into<String>,
        target_path: impl Into<PathBuf>,
        settings: &Settings,
    ) -> Self {
        Self {
            stream_reference: stream_reference.into(),
            target_path: target_path.into(),
            quality: settings.quality,
            credentials: settings.credentials.clone(),
            duration_limit: None,
        }
    }

    pub fn with_duration_limit(mut self, limit: Option<Duration>) -> Self {
        self.duration_limit = limit;
        self
    }

    /// Where the engine writes while the capture is in progress.
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.target_path)
    }

    fn output_dir(&self) -> &Path {
        self.target_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

/// How a capture ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The engine finished on its own.
    CompletedNormally,

    /// The broadcast ended.
    StreamEnded,

    /// The configured duration limit elapsed.
    DurationLimitReached,

    /// Stopped on request.
    Cancelled,

    /// Nothing usable was finalized.
    Failed { kind: FailureKind, reason: String },
}

impl CaptureOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CompletedNormally => "completed",
            Self::StreamEnded => "stream-ended",
            Self::DurationLimitReached => "duration-limit",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of a single capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub outcome: CaptureOutcome,

    /// Set only when the output was promoted to its final name.
    pub final_path: Option<PathBuf>,

    /// Set only when a failed capture left partial output behind.
    pub partial_path: Option<PathBuf>,

    pub bytes_written: u64,

    pub elapsed: Duration,
}

impl CaptureResult {
    pub(crate) fn failed(kind: FailureKind, reason: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            outcome: CaptureOutcome::Failed {
                kind,
                reason: reason.into(),
            },
            final_path: None,
            partial_path: None,
            bytes_written: 0,
            elapsed,
        }
    }
}

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Refuse to start below this much free space.
    pub min_free_bytes: u64,

    /// How long the engine gets to finalize after a graceful stop request.
    pub grace_period: Duration,

    /// How long to wait for the process to be reaped after a forced kill.
    pub kill_wait: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min_free_bytes: settings.min_free_space_mb.saturating_mul(1024 * 1024),
            grace_period: settings.grace_period(),
            kill_wait: DEFAULT_KILL_WAIT,
        }
    }
}

/// What ended the wait on a running engine.
enum Trigger {
    Exited(EngineExit),
    Cancelled,
    DurationLimit,
}

/// Runs captures against a [`CaptureEngine`].
#[derive(Clone)]
pub struct CaptureSession {
    engine: Arc<dyn CaptureEngine>,
    disk: Arc<dyn DiskSpace>,
    options: SessionOptions,
}

impl CaptureSession {
    pub fn new(
        engine: Arc<dyn CaptureEngine>,
        disk: Arc<dyn DiskSpace>,
        options: SessionOptions,
    ) -> Self {
        Self {
            engine,
            disk,
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Record `job` until the engine exits, the duration limit elapses, or
    /// `cancel` fires.
    ///
    /// Never returns an error: every way a capture can end is described by the
    /// returned [`CaptureOutcome`].
    pub async fn run(&self, job: CaptureJob, cancel: CancellationToken) -> CaptureResult {
        let started = Instant::now();
        let result = self.capture(&job, &cancel, started).await;

        match &result.outcome {
            CaptureOutcome::Failed { kind, reason } => tracing::warn!(
                output = %job.target_path.display(),
                %kind,
                partial = ?result.partial_path,
                elapsed = %format_duration(result.elapsed),
                "Capture failed: {reason}"
            ),
            outcome => tracing::info!(
                outcome = outcome.label(),
                path = ?result.final_path,
                bytes = result.bytes_written,
                elapsed = %format_duration(result.elapsed),
                "Capture finished"
            ),
        }

        result
    }

    async fn capture(
        &self,
        job: &CaptureJob,
        cancel: &CancellationToken,
        started: Instant,
    ) -> CaptureResult {
        let temp = job.temp_path();
        if let Err(e) = self.check_preconditions(job) {
            return self.fail(&temp, e.kind(), e.to_string(), started);
        }

        if cancel.is_cancelled() {
            discard_if_empty(&temp);
            return CaptureResult {
                outcome: CaptureOutcome::Cancelled,
                final_path: None,
                partial_path: None,
                bytes_written: 0,
                elapsed: started.elapsed(),
            };
        }

        let request = EngineRequest {
            stream_reference: job.stream_reference.clone(),
            quality: job.quality,
            credentials: job.credentials.clone(),
            output_path: temp.clone(),
        };

        tracing::info!(
            engine = self.engine.name(),
            stream = %job.stream_reference,
            quality = %job.quality,
            output = %job.target_path.display(),
            "Starting capture"
        );

        let mut process = match self.engine.launch(&request).await {
            Ok(process) => process,
            Err(e) => return self.fail(&temp, e.kind(), e.to_string(), started),
        };

        let limit = async {
            match job.duration_limit {
                Some(limit) => tokio::time::sleep_until(started + limit).await,
                None => std::future::pending().await,
            }
        };

        let trigger = tokio::select! {
            exit = process.wait() => Trigger::Exited(exit),
            _ = cancel.cancelled() => Trigger::Cancelled,
            _ = limit => Trigger::DurationLimit,
        };

        let outcome = match trigger {
            Trigger::Exited(EngineExit::Finished) => Some(CaptureOutcome::CompletedNormally),
            Trigger::Exited(EngineExit::StreamEnded) => Some(CaptureOutcome::StreamEnded),
            // Signalled by someone else; whatever was written is kept.
            Trigger::Exited(EngineExit::Interrupted) => Some(CaptureOutcome::Cancelled),
            Trigger::Exited(EngineExit::Failed { kind, reason, .. }) => {
                return self.fail(&temp, kind, reason, started);
            }
            Trigger::Cancelled => self
                .stop(process.as_mut())
                .await
                .map(|_| CaptureOutcome::Cancelled),
            Trigger::DurationLimit => {
                tracing::info!(output = %job.target_path.display(), "Duration limit reached");
                self.stop(process.as_mut())
                    .await
                    .map(|_| CaptureOutcome::DurationLimitReached)
            }
        };

        let Some(outcome) = outcome else {
            return self.fail(
                &temp,
                FailureKind::Unknown,
                "Engine did not exit after being killed",
                started,
            );
        };

        self.finalize(job, &temp, outcome, started)
    }

    /// Create the output directory and check free space.
    fn check_preconditions(&self, job: &CaptureJob) -> LiverecResult<()> {
        let dir = job.output_dir();
        std::fs::create_dir_all(dir).map_err(|e| {
            LiverecError::engine(
                FailureKind::from_io(&e),
                format!("Cannot create output directory {}: {e}", dir.display()),
            )
        })?;

        match self.disk.available_bytes(dir) {
            Ok(available) if available < self.options.min_free_bytes => {
                Err(LiverecError::InsufficientDiskSpace {
                    available_mb: bytes_to_mb(available),
                    required_mb: bytes_to_mb(self.options.min_free_bytes),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Could not query free disk space: {e}");
                Ok(())
            }
        }
    }

    /// Graceful stop, then forced kill after the grace period.
    ///
    /// Returns `None` if the process could not be reaped at all.
    async fn stop(&self, process: &mut dyn EngineProcess) -> Option<EngineExit> {
        if let Err(e) = process.terminate() {
            tracing::warn!("Failed to signal engine: {e}");
        }

        match tokio::time::timeout(self.options.grace_period, process.wait()).await {
            Ok(exit) => Some(exit),
            Err(_) => {
                tracing::warn!(
                    grace = ?self.options.grace_period,
                    "Engine did not stop within grace period, killing"
                );
                if let Err(e) = process.kill() {
                    tracing::warn!("Failed to kill engine: {e}");
                }
                tokio::time::timeout(self.options.kill_wait, process.wait())
                    .await
                    .ok()
            }
        }
    }

    /// Promote the temp file to its final name.
    fn finalize(
        &self,
        job: &CaptureJob,
        temp: &Path,
        outcome: CaptureOutcome,
        started: Instant,
    ) -> CaptureResult {
        let bytes_written = std::fs::metadata(temp).map(|m| m.len()).unwrap_or(0);
        if bytes_written == 0 {
            tracing::info!(stream = %job.stream_reference, "Engine exited without writing output");
            discard_if_empty(temp);
            return CaptureResult {
                outcome,
                final_path: None,
                partial_path: None,
                bytes_written: 0,
                elapsed: started.elapsed(),
            };
        }

        match promote(temp, &job.target_path) {
            Ok(final_path) => CaptureResult {
                outcome,
                final_path: Some(final_path),
                partial_path: None,
                bytes_written,
                elapsed: started.elapsed(),
            },
            Err(e) => CaptureResult {
                outcome: CaptureOutcome::Failed {
                    kind: FailureKind::Unknown,
                    reason: format!(
                        "Failed to move {} to {}: {e}",
                        temp.display(),
                        job.target_path.display()
                    ),
                },
                final_path: None,
                partial_path: Some(temp.to_path_buf()),
                bytes_written,
                elapsed: started.elapsed(),
            },
        }
    }

    /// Build a failed result, keeping any partial output.
    fn fail(
        &self,
        temp: &Path,
        kind: FailureKind,
        reason: impl Into<String>,
        started: Instant,
    ) -> CaptureResult {
        let mut result = CaptureResult::failed(kind, reason, started.elapsed());
        match std::fs::metadata(temp) {
            Ok(meta) if meta.len() > 0 => {
                result.partial_path = Some(temp.to_path_buf());
                result.bytes_written = meta.len();
            }
            _ => discard_if_empty(temp),
        }
        result
    }
}

/// Remove a temp file that holds nothing, such as an unused reservation.
fn discard_if_empty(temp: &Path) {
    if let Ok(meta) = std::fs::metadata(temp) {
        if meta.len() == 0 {
            if let Err(e) = std::fs::remove_file(temp) {
                tracing::debug!("Failed to remove empty temp file: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::FixedDiskSpace;
    use crate::scripted::{ScriptedEngine, ScriptedRun};

    const MB: u64 = 1024 * 1024;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "liverec-session-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn session(engine: &Arc<ScriptedEngine>, free_bytes: u64) -> CaptureSession {
        CaptureSession::new(
            engine.clone(),
            Arc::new(FixedDiskSpace(free_bytes)),
            SessionOptions {
                min_free_bytes: 500 * MB,
                grace_period: Duration::from_secs(10),
                kill_wait: Duration::from_secs(5),
            },
        )
    }

    fn job(dir: &Path) -> CaptureJob {
        CaptureJob::new(
            "https://www.youtube.com/watch?v=jfKfPfyJRdk",
            dir.join("lofi_20240101_120000.mp4"),
            &Settings::default(),
        )
    }

    #[test]
    fn test_job_from_settings() {
        let settings = Settings {
            quality: Quality::P480,
            credentials: Some(Credentials::Browser("chrome".to_string())),
            ..Settings::default()
        };
        let job = CaptureJob::new("https://example.com/live", "/rec/a_20240101_000000.mp4", &settings)
            .with_duration_limit(Some(Duration::from_secs(60)));

        assert_eq!(job.quality, Quality::P480);
        assert_eq!(job.credentials, settings.credentials);
        assert_eq!(job.duration_limit, Some(Duration::from_secs(60)));
        assert_eq!(job.temp_path(), PathBuf::from("/rec/.a_20240101_000000.mp4.tmp"));
        assert_eq!(job.output_dir(), Path::new("/rec"));
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let job = CaptureJob::new("x", "out.mp4", &Settings::default());
        assert_eq!(job.output_dir(), Path::new("."));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            min_free_space_mb: 2,
            grace_period_secs: 3,
            ..Settings::default()
        };
        let options = SessionOptions::from_settings(&settings);
        assert_eq!(options.min_free_bytes, 2 * 1024 * 1024);
        assert_eq!(options.grace_period, Duration::from_secs(3));
    }

    #[test]
    fn test_outcome_labels() {
        assert!(!CaptureOutcome::Cancelled.is_failure());
        let failed = CaptureOutcome::Failed {
            kind: FailureKind::DiskSpace,
            reason: "full".to_string(),
        };
        assert!(failed.is_failure());
        assert_eq!(failed.label(), "failed");
        assert_eq!(CaptureOutcome::DurationLimitReached.label(), "duration-limit");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_exit_promotes_temp_file() {
        let dir = scratch("clean");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::exit_after(
            Duration::from_secs(5),
            EngineExit::Finished,
            1024,
        )]));
        let job = job(&dir);

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert_eq!(result.outcome, CaptureOutcome::CompletedNormally);
        assert_eq!(result.final_path.as_deref(), Some(job.target_path.as_path()));
        assert_eq!(result.bytes_written, 1024);
        assert!(result.elapsed >= Duration::from_secs(5));
        assert_eq!(std::fs::metadata(&job.target_path).unwrap().len(), 1024);
        assert!(!job.temp_path().exists());

        let requests = engine.stats().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].output_path, job.temp_path());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_promotes_temp_file() {
        let dir = scratch("ended");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::exit_after(
            Duration::from_secs(60),
            EngineExit::StreamEnded,
            64,
        )]));
        let job = job(&dir);

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert_eq!(result.outcome, CaptureOutcome::StreamEnded);
        assert!(job.target_path.exists());
        assert!(!job.temp_path().exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_failure_keeps_partial_output() {
        let dir = scratch("partial");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::exit_after(
            Duration::from_secs(1),
            EngineExit::failed(Some(1), "ERROR: HTTP Error 503: Service Unavailable"),
            10,
        )]));
        let job = job(&dir);

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        match &result.outcome {
            CaptureOutcome::Failed { kind, .. } => assert_eq!(*kind, FailureKind::TransientNetwork),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(result.final_path, None);
        assert_eq!(result.partial_path.as_deref(), Some(job.temp_path().as_path()));
        assert_eq!(result.bytes_written, 10);
        assert!(job.temp_path().exists());
        assert!(!job.target_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_failure_without_output() {
        let dir = scratch("nothing");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::exit_after(
            Duration::from_secs(1),
            EngineExit::failed(Some(1), "ERROR: Private video. Sign in if you've been granted access"),
            0,
        )]));
        let job = job(&dir);

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        match &result.outcome {
            CaptureOutcome::Failed { kind, .. } => assert_eq!(*kind, FailureKind::AuthRequired),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(result.partial_path, None);
        assert!(!job.temp_path().exists());
        assert!(!job.target_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_exit_without_output() {
        let dir = scratch("empty");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::exit_after(
            Duration::from_secs(1),
            EngineExit::Finished,
            0,
        )]));
        let job = job(&dir);

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert_eq!(result.outcome, CaptureOutcome::CompletedNormally);
        assert_eq!(result.final_path, None);
        assert_eq!(result.bytes_written, 0);
        assert!(!job.target_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_disk_space_refuses_to_start() {
        let dir = scratch("disk");
        let engine = Arc::new(ScriptedEngine::new([]));
        let job = job(&dir);

        let result = session(&engine, 100 * MB)
            .run(job.clone(), CancellationToken::new())
            .await;

        match &result.outcome {
            CaptureOutcome::Failed { kind, reason } => {
                assert_eq!(*kind, FailureKind::DiskSpace);
                assert!(reason.contains("100"), "{reason}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.stats().launches(), 0);
        assert!(!job.temp_path().exists());
        assert!(!job.target_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_limit_stops_gracefully() {
        let dir = scratch("limit");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::until_signalled(2048)]));
        let job = job(&dir).with_duration_limit(Some(Duration::from_secs(30)));

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert_eq!(result.outcome, CaptureOutcome::DurationLimitReached);
        assert!(result.elapsed >= Duration::from_secs(30));
        assert!(result.elapsed < Duration::from_secs(31));
        assert_eq!(result.bytes_written, 2048);
        assert!(job.target_path.exists());
        assert!(!job.temp_path().exists());
        assert_eq!(engine.stats().terminations(), 1);
        assert_eq!(engine.stats().kills(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_finalizes_recording() {
        let dir = scratch("cancel");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::until_signalled(512)]));
        let job = job(&dir);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let session = session(&engine, u64::MAX);
            let job = job.clone();
            let cancel = cancel.clone();
            async move { session.run(job, cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.stats().active(), 1);
        cancel.cancel();

        let result = handle.await.unwrap();
        assert_eq!(result.outcome, CaptureOutcome::Cancelled);
        assert!(job.target_path.exists());
        assert!(!job.temp_path().exists());
        assert_eq!(engine.stats().active(), 0);
        assert_eq!(engine.stats().kills(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stubborn_engine_is_killed_after_grace() {
        let dir = scratch("stubborn");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::stubborn(128)]));
        let job = job(&dir).with_duration_limit(Some(Duration::from_secs(5)));

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert_eq!(result.outcome, CaptureOutcome::DurationLimitReached);
        assert!(result.elapsed >= Duration::from_secs(15));
        assert_eq!(engine.stats().terminations(), 1);
        assert_eq!(engine.stats().kills(), 1);
        assert!(job.target_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_error_is_reported() {
        let dir = scratch("launch");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::LaunchError {
            kind: FailureKind::ConfigInvalid,
            message: "yt-dlp not found. Please install yt-dlp.".to_string(),
        }]));
        let job = job(&dir);

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        match &result.outcome {
            CaptureOutcome::Failed { kind, .. } => assert_eq!(*kind, FailureKind::ConfigInvalid),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!job.temp_path().exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_does_not_launch() {
        let dir = scratch("precancel");
        let engine = Arc::new(ScriptedEngine::new([]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = session(&engine, u64::MAX).run(job(&dir), cancel).await;

        assert_eq!(result.outcome, CaptureOutcome::Cancelled);
        assert_eq!(result.final_path, None);
        assert_eq!(engine.stats().launches(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creates_missing_output_dir() {
        let dir = scratch("mkdir").join("nested").join("deeper");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::exit_after(
            Duration::from_secs(1),
            EngineExit::Finished,
            1,
        )]));
        let job = job(&dir);

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert_eq!(result.outcome, CaptureOutcome::CompletedNormally);
        assert!(job.target_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unused_reservation_is_removed() {
        let dir = scratch("reserved");
        let engine = Arc::new(ScriptedEngine::new([]));
        let job = job(&dir);
        std::fs::write(job.temp_path(), b"").unwrap();

        let result = session(&engine, 100 * MB)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert!(result.outcome.is_failure());
        assert_eq!(result.partial_path, None);
        assert!(!job.temp_path().exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_keeps_existing_target() {
        let dir = scratch("occupied");
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::exit_after(
            Duration::from_secs(3),
            EngineExit::StreamEnded,
            256,
        )]));
        let job = job(&dir);
        std::fs::write(&job.target_path, b"earlier recording").unwrap();

        let result = session(&engine, u64::MAX)
            .run(job.clone(), CancellationToken::new())
            .await;

        assert_eq!(result.outcome, CaptureOutcome::StreamEnded);
        let final_path = result.final_path.unwrap();
        assert_eq!(final_path, dir.join("lofi_20240101_120000_1.mp4"));
        assert_eq!(std::fs::metadata(&final_path).unwrap().len(), 256);
        assert_eq!(std::fs::read(&job.target_path).unwrap(), b"earlier recording");
        assert!(!job.temp_path().exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
