//! One-off capture of a single stream.

use std::time::Duration;

use liverec_common::clock::RecordingClock;
use liverec_common::config::Settings;
use liverec_common::error::FailureKind;
use tokio_util::sync::CancellationToken;

use crate::naming::reserve_target_path;
use crate::session::{CaptureJob, CaptureResult, CaptureSession};

/// Records a single stream once, without supervision or retries.
#[derive(Clone)]
pub struct SingleShotRunner {
    session: CaptureSession,
}

impl SingleShotRunner {
    pub fn new(session: CaptureSession) -> Self {
        Self { session }
    }

    /// Record `stream_reference` into `settings.output_dir`, naming the file
    /// after `name` and the local start time.
    pub async fn run(
        &self,
        stream_reference: &str,
        name: &str,
        settings: &Settings,
        duration_limit: Option<Duration>,
        cancel: CancellationToken,
    ) -> CaptureResult {
        let clock = RecordingClock::start();
        let target =
            match reserve_target_path(&settings.output_dir, name, &clock, &settings.container) {
                Ok(target) => target,
                Err(e) => {
                    return CaptureResult::failed(
                        FailureKind::from_io(&e),
                        format!(
                            "Cannot create output file in {}: {e}",
                            settings.output_dir.display()
                        ),
                        Duration::ZERO,
                    )
                }
            };
        let job = CaptureJob::new(stream_reference, target, settings)
            .with_duration_limit(duration_limit);

        tracing::info!(
            stream = %stream_reference,
            output = %job.target_path.display(),
            limit = ?duration_limit,
            "Recording single stream"
        );

        self.session.run(job, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::disk::FixedDiskSpace;
    use crate::scripted::{ScriptedEngine, ScriptedRun};
    use crate::session::{CaptureOutcome, SessionOptions};

    #[tokio::test(start_paused = true)]
    async fn test_duration_limited_single_shot() {
        let dir = std::env::temp_dir().join(format!("liverec-runner-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let settings = Settings {
            output_dir: dir.clone(),
            ..Settings::default()
        };
        let engine = Arc::new(ScriptedEngine::new([ScriptedRun::until_signalled(4096)]));
        let runner = SingleShotRunner::new(CaptureSession::new(
            engine.clone(),
            Arc::new(FixedDiskSpace(u64::MAX)),
            SessionOptions::from_settings(&settings),
        ));

        let result = runner
            .run(
                "https://www.youtube.com/watch?v=jfKfPfyJRdk",
                "Lofi Girl",
                &settings,
                Some(Duration::from_secs(5)),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(result.outcome, CaptureOutcome::DurationLimitReached);
        assert!(result.elapsed >= Duration::from_secs(5));
        assert!(result.elapsed < Duration::from_secs(6));

        let final_path = result.final_path.clone().unwrap();
        assert_eq!(final_path.parent(), Some(dir.as_path()));
        let file_name = final_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("Lofi Girl_"));
        assert!(file_name.ends_with(".mp4"));
        assert_eq!(file_name.len(), "Lofi Girl_".len() + "YYYYMMDD_HHMMSS.mp4".len());
        assert_eq!(std::fs::metadata(&final_path).unwrap().len(), 4096);
        assert!(!crate::naming::temp_path_for(&final_path).exists());

        let requests = engine.stats().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].stream_reference, "https://www.youtube.com/watch?v=jfKfPfyJRdk");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
