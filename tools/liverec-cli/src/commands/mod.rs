pub mod check;
pub mod monitor;
pub mod record;
pub mod validate;

use std::sync::Arc;

use liverec_capture_engine::{CaptureSession, SessionOptions, StatvfsDiskSpace, YtDlpEngine};
use liverec_common::config::Settings;

/// A capture session driving `yt-dlp` with real free-space checks.
fn ytdlp_session(settings: &Settings) -> CaptureSession {
    CaptureSession::new(
        Arc::new(YtDlpEngine::new()),
        Arc::new(StatvfsDiskSpace),
        SessionOptions::from_settings(settings),
    )
}
