//! Wall-clock anchoring for recordings.
//!
//! Output filenames are stamped with the local wall-clock time at which the
//! recording started. Elapsed durations are measured separately on the
//! runtime's monotonic clock by whoever supervises the recording.

use std::time::Duration;

use chrono::{DateTime, Local};

/// The wall-clock start of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingClock {
    started_at: DateTime<Local>,
}

impl RecordingClock {
    /// Anchor a new clock to now.
    pub fn start() -> Self {
        Self {
            started_at: Local::now(),
        }
    }

    /// Anchor a clock to a known start time.
    pub fn from_start(started_at: DateTime<Local>) -> Self {
        Self { started_at }
    }

    /// Local time the recording started.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// `YYYYMMDD_HHMMSS`, zero padded, as used in output filenames.
    pub fn file_stamp(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }
}

/// Format a duration as `H:MM:SS`, or `M:SS` under an hour.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
