//! Liveness checks.
//!
//! The probe answers "is this channel live right now, and what should be
//! recorded". The `yt-dlp` implementation asks for the channel's `/live` page
//! metadata without downloading anything.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use liverec_capture_engine::ytdlp::credential_args;
use liverec_common::config::Credentials;
use liverec_common::error::{FailureKind, LiverecError, LiverecResult};
use serde_json::Value;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lines of probe stderr kept in error messages.
const ERROR_TAIL_LINES: usize = 5;

/// Result of one liveness check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveStatus {
    pub is_live: bool,

    /// What to hand to the capture engine when live.
    pub stream_reference: Option<String>,

    pub title: Option<String>,

    pub channel_name: Option<String>,
}

impl LiveStatus {
    pub fn offline() -> Self {
        Self::default()
    }
}

/// Answers liveness questions about channels and streams.
#[async_trait::async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Check whether a channel is currently broadcasting.
    async fn check(&self, channel_id: &str) -> LiverecResult<LiveStatus>;

    /// Inspect a single stream URL.
    async fn probe_video(&self, url: &str) -> LiverecResult<LiveStatus>;
}

/// Liveness probe backed by `yt-dlp --dump-json`.
#[derive(Debug, Clone)]
pub struct YtDlpProbe {
    program: PathBuf,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl YtDlpProbe {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            credentials,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    async fn dump_json(&self, url: &str) -> LiverecResult<Value> {
        let mut command = Command::new(&self.program);
        command
            .args(["--dump-json", "--no-download", "--no-warnings"])
            .args(credential_args(self.credentials.as_ref()))
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                LiverecError::probe(
                    FailureKind::TransientNetwork,
                    format!("Liveness check timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LiverecError::probe(
                        FailureKind::ConfigInvalid,
                        format!("{} not found. Please install yt-dlp.", self.program.display()),
                    )
                } else {
                    LiverecError::probe(FailureKind::from_io(&e), e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr_tail(&stderr);
            return Err(LiverecError::probe(FailureKind::classify(&tail), tail));
        }

        // Playlist-like pages print one JSON document per line; the first one wins.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let first = stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        serde_json::from_str(first).map_err(|e| {
            LiverecError::probe(FailureKind::Unknown, format!("Unreadable probe output: {e}"))
        })
    }
}

#[async_trait::async_trait]
impl LivenessProbe for YtDlpProbe {
    async fn check(&self, channel_id: &str) -> LiverecResult<LiveStatus> {
        if channel_id.trim().is_empty() {
            return Err(LiverecError::probe(
                FailureKind::ConfigInvalid,
                "Channel id must not be empty",
            ));
        }
        let info = self.dump_json(&channel_live_url(channel_id)).await?;
        Ok(channel_status(&info))
    }

    async fn probe_video(&self, url: &str) -> LiverecResult<LiveStatus> {
        let info = self.dump_json(url).await?;
        Ok(video_status(&info))
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.is_empty() {
        "yt-dlp exited with an error".to_string()
    } else {
        tail
    }
}

fn str_field(info: &Value, key: &str) -> Option<String> {
    info.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(info: &Value, key: &str) -> bool {
    info.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn stream_reference(info: &Value) -> Option<String> {
    str_field(info, "id")
        .map(|id| watch_url(&id))
        .or_else(|| str_field(info, "webpage_url"))
}

/// Interpret a channel `/live` page. A past broadcast the page redirects to
/// still carries `is_live`, so `was_live` rules it out.
pub fn channel_status(info: &Value) -> LiveStatus {
    let live = bool_field(info, "is_live")
        && info.get("live_status").and_then(Value::as_str) == Some("is_live")
        && !bool_field(info, "was_live");

    LiveStatus {
        is_live: live,
        stream_reference: if live { stream_reference(info) } else { None },
        title: if live { str_field(info, "title") } else { None },
        channel_name: str_field(info, "channel"),
    }
}

/// Interpret a single stream page.
pub fn video_status(info: &Value) -> LiveStatus {
    let live = bool_field(info, "is_live")
        || info.get("live_status").and_then(Value::as_str) == Some("is_live");

    LiveStatus {
        is_live: live,
        stream_reference: stream_reference(info),
        title: str_field(info, "title"),
        channel_name: str_field(info, "channel"),
    }
}

/// `https://www.youtube.com/watch?v={id}`
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// `https://www.youtube.com/channel/{id}/live`
pub fn channel_live_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}/live")
}

/// What a user-supplied recording target refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Video { id: String, url: String },
    Channel { id: String, url: String },
    Other(String),
}

impl Target {
    /// URL to hand to the engine.
    pub fn url(&self) -> &str {
        match self {
            Self::Video { url, .. } | Self::Channel { url, .. } => url,
            Self::Other(url) => url,
        }
    }

    /// Fallback name for output files when no channel name is known.
    pub fn name_hint(&self) -> &str {
        match self {
            Self::Video { id, .. } | Self::Channel { id, .. } => id,
            Self::Other(_) => "stream",
        }
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn leading_video_id(s: &str) -> Option<String> {
    let id: String = s.chars().take(11).collect();
    (id.len() == 11 && id.chars().all(is_id_char)).then_some(id)
}

/// Pull a video id out of the common YouTube URL shapes.
pub fn extract_video_id(url: &str) -> Option<String> {
    let rest = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let rest = rest
        .strip_prefix("www.")
        .or_else(|| rest.strip_prefix("m."))
        .unwrap_or(rest);

    if let Some(query) = rest.strip_prefix("youtube.com/watch?") {
        return query
            .split('&')
            .find_map(|pair| pair.strip_prefix("v="))
            .and_then(leading_video_id);
    }

    ["youtu.be/", "youtube.com/live/", "youtube.com/shorts/"]
        .iter()
        .find_map(|prefix| rest.strip_prefix(prefix))
        .and_then(leading_video_id)
}

/// Resolve a URL, video id or channel id into a recording target.
pub fn resolve_target(input: &str) -> Target {
    let input = input.trim();

    if let Some(id) = extract_video_id(input) {
        return Target::Video {
            url: watch_url(&id),
            id,
        };
    }
    if input.len() == 24 && input.starts_with("UC") && input.chars().all(is_id_char) {
        return Target::Channel {
            id: input.to_string(),
            url: channel_live_url(input),
        };
    }
    if input.len() == 11 && input.chars().all(is_id_char) {
        return Target::Video {
            id: input.to_string(),
            url: watch_url(input),
        };
    }
    Target::Other(input.to_string())
}
