//! Error types shared across liverec crates.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for liverec operations.
#[derive(Debug, thiserror::Error)]
pub enum LiverecError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Engine error ({kind}): {message}")]
    Engine { kind: FailureKind, message: String },

    #[error("Liveness probe error ({kind}): {message}")]
    Probe { kind: FailureKind, message: String },

    #[error("Insufficient disk space: {available_mb}MB available, {required_mb}MB required")]
    InsufficientDiskSpace { available_mb: u64, required_mb: u64 },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LiverecError.
pub type LiverecResult<T> = Result<T, LiverecError>;

impl LiverecError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn engine(kind: FailureKind, msg: impl Into<String>) -> Self {
        Self::Engine {
            kind,
            message: msg.into(),
        }
    }

    pub fn probe(kind: FailureKind, msg: impl Into<String>) -> Self {
        Self::Probe {
            kind,
            message: msg.into(),
        }
    }

    /// The failure class this error belongs to, for retry decisions.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Config { .. } | Self::FileNotFound { .. } | Self::Toml(_) => {
                FailureKind::ConfigInvalid
            }
            Self::Engine { kind, .. } | Self::Probe { kind, .. } => *kind,
            Self::InsufficientDiskSpace { .. } => FailureKind::DiskSpace,
            Self::Io(e) => FailureKind::from_io(e),
            Self::Capture { .. } | Self::Json(_) | Self::Other(_) => FailureKind::Unknown,
        }
    }
}

/// Classification of everything that can go wrong while probing or capturing.
///
/// `NotLive` is not a failure in the usual sense: it is the normal "no stream
/// yet" signal and only shows up here because the probe and the engine report it
/// through the same error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    TransientNetwork,
    NotLive,
    AuthRequired,
    ConfigInvalid,
    DiskSpace,
    Unknown,
}

const AUTH_MARKERS: &[&str] = &[
    "sign in to confirm",
    "sign in to view",
    "login required",
    "use --cookies",
    "members-only",
    "members only",
    "private video",
    "http error 401",
    "http error 403",
];

const NOT_LIVE_MARKERS: &[&str] = &[
    "not currently live",
    "is not live",
    "will begin in",
    "premieres in",
    "live event will begin",
    "is offline",
];

const NETWORK_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection aborted",
    "temporary failure in name resolution",
    "name or service not known",
    "network is unreachable",
    "incompleteread",
    "incomplete read",
    "http error 500",
    "http error 502",
    "http error 503",
    "http error 504",
    "http error 429",
    "unable to download",
];

const CONFIG_MARKERS: &[&str] = &[
    "does not exist",
    "not found",
    "has been removed",
    "invalid url",
    "unsupported url",
    "is not a valid url",
];

impl FailureKind {
    /// Classify a free-form engine or probe message.
    ///
    /// Markers are checked in priority order: auth before not-live before
    /// network before config, because engine output frequently carries several.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if has(AUTH_MARKERS) {
            Self::AuthRequired
        } else if has(NOT_LIVE_MARKERS) {
            Self::NotLive
        } else if has(NETWORK_MARKERS) {
            Self::TransientNetwork
        } else if has(CONFIG_MARKERS) {
            Self::ConfigInvalid
        } else if lower.contains("no space left on device") {
            Self::DiskSpace
        } else {
            Self::Unknown
        }
    }

    /// Classify an I/O error.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
                Self::ConfigInvalid
            }
            ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::TransientNetwork,
            _ if err.raw_os_error() == Some(28) => Self::DiskSpace,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient-network",
            Self::NotLive => "not-live",
            Self::AuthRequired => "auth-required",
            Self::ConfigInvalid => "config-invalid",
            Self::DiskSpace => "disk-space",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth_wins_over_network() {
        let msg = "ERROR: [youtube] abc: Sign in to confirm you're not a bot. HTTP Error 503";
        assert_eq!(FailureKind::classify(msg), FailureKind::AuthRequired);
    }

    #[test]
    fn test_classify_not_live() {
        assert_eq!(
            FailureKind::classify("ERROR: [youtube:tab] UCxyz: The channel is not currently live"),
            FailureKind::NotLive
        );
        assert_eq!(
            FailureKind::classify("This live event will begin in 3 hours."),
            FailureKind::NotLive
        );
    }

    #[test]
    fn test_classify_network_and_config() {
        assert_eq!(
            FailureKind::classify("<urlopen error [Errno -3] Temporary failure in name resolution>"),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            FailureKind::classify("ERROR: [youtube:tab] This channel does not exist."),
            FailureKind::ConfigInvalid
        );
        assert_eq!(FailureKind::classify("segfault"), FailureKind::Unknown);
    }

    #[test]
    fn test_io_error_kinds() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "yt-dlp");
        assert_eq!(FailureKind::from_io(&missing), FailureKind::ConfigInvalid);

        let full = std::io::Error::from_raw_os_error(28);
        assert_eq!(FailureKind::from_io(&full), FailureKind::DiskSpace);
    }

    #[test]
    fn test_error_kind_mapping() {
        let err = LiverecError::InsufficientDiskSpace {
            available_mb: 10,
            required_mb: 500,
        };
        assert_eq!(err.kind(), FailureKind::DiskSpace);
        assert!(err.to_string().contains("10MB available"));
        assert_eq!(
            LiverecError::config("bad").kind(),
            FailureKind::ConfigInvalid
        );
    }
}
