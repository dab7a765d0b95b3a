//! Application configuration.
//!
//! A fleet configuration file holds the channel list and the shared recording
//! settings. TOML and JSON are both accepted; the format is picked from the
//! file extension.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LiverecError, LiverecResult};

/// Upper bound on the number of channels one fleet may monitor.
pub const MAX_CHANNELS: usize = 5;

/// Smallest accepted liveness polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Full configuration for multi-channel monitoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Channels to monitor.
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,

    /// Recording settings shared by every channel.
    #[serde(default)]
    pub settings: Settings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A single channel to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Display name, also used as the recording filename prefix.
    pub name: String,

    /// YouTube channel ID (starts with `UC`).
    pub channel_id: String,
}

/// Recording settings, read-only once a fleet has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory recordings are written to.
    pub output_dir: PathBuf,

    /// Requested stream quality.
    pub quality: Quality,

    /// Liveness polling interval in seconds.
    #[serde(rename = "interval")]
    pub poll_interval_secs: u64,

    /// Cookie credentials handed to the engine and the probe.
    pub credentials: Option<Credentials>,

    /// Container extension of the produced files.
    pub container: String,

    /// Minimum free space required in `output_dir` before a recording starts.
    pub min_free_space_mb: u64,

    /// How long the engine gets to exit after a graceful stop request.
    pub grace_period_secs: u64,
}

/// Stream quality selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

/// Where the engine should read cookies from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Netscape-format cookies file.
    CookieFile(PathBuf),
    /// Browser to extract cookies from (e.g. "firefox").
    Browser(String),
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "liverec=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./recordings"),
            quality: Quality::Best,
            poll_interval_secs: 60,
            credentials: None,
            container: "mp4".to_string(),
            min_free_space_mb: 500,
            grace_period_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Validate value ranges. Does not touch the filesystem.
    pub fn validate(&self) -> LiverecResult<()> {
        if self.poll_interval() < MIN_POLL_INTERVAL {
            return Err(LiverecError::config(format!(
                "interval must be at least {} seconds (got {})",
                MIN_POLL_INTERVAL.as_secs(),
                self.poll_interval_secs
            )));
        }
        if self.container.is_empty() || self.container.contains(['/', '\\', '.']) {
            return Err(LiverecError::config(format!(
                "invalid container extension: '{}'",
                self.container
            )));
        }
        if self.grace_period_secs == 0 {
            return Err(LiverecError::config("grace_period_secs must be positive"));
        }
        match &self.credentials {
            Some(Credentials::Browser(name)) if name.trim().is_empty() => {
                Err(LiverecError::config("cookie browser name must not be empty"))
            }
            Some(Credentials::CookieFile(path)) if !path.exists() => {
                Err(LiverecError::FileNotFound { path: path.clone() })
            }
            _ => Ok(()),
        }
    }

    /// Create `output_dir` if needed and verify it accepts writes.
    pub fn ensure_output_dir(&self) -> LiverecResult<()> {
        let probe = self.output_dir.join(".write_test");
        std::fs::create_dir_all(&self.output_dir)
            .and_then(|_| std::fs::write(&probe, b""))
            .and_then(|_| std::fs::remove_file(&probe))
            .map_err(|e| {
                LiverecError::config(format!(
                    "Output directory is not writable: {} ({e})",
                    self.output_dir.display()
                ))
            })
    }
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::Best,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
        }
    }

    /// Engine format selector for this quality.
    pub fn format_selector(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::P1080 => "best[height<=1080]",
            Self::P720 => "best[height<=720]",
            Self::P480 => "best[height<=480]",
            Self::P360 => "best[height<=360]",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = LiverecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| {
                LiverecError::config(format!(
                    "Invalid quality: '{s}'. Must be one of: best, 1080p, 720p, 480p, 360p"
                ))
            })
    }
}

impl FleetConfig {
    /// Load a fleet configuration from disk. Does not validate.
    pub fn load(path: impl AsRef<Path>) -> LiverecResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LiverecError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") | None => toml::from_str(&content)?,
            Some(other) => {
                return Err(LiverecError::config(format!(
                    "Unsupported configuration format '.{other}' (expected .toml or .json)"
                )))
            }
        };
        tracing::debug!(path = %path.display(), "Loaded fleet configuration");
        Ok(config)
    }

    /// Check everything that can be checked before a monitor starts.
    pub fn validate(&self) -> LiverecResult<()> {
        validate_channels(&self.channels)?;
        self.settings.validate()
    }
}

const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const MAX_NAME_CHARS: usize = 100;

/// Make a channel name safe to use as a filename component.
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_NAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == ' ' || c == '.');
    let truncated: String = trimmed.chars().take(MAX_NAME_CHARS).collect();

    if truncated.is_empty() {
        "unknown".to_string()
    } else {
        truncated
    }
}

/// Fleet-size, field and uniqueness checks on a channel list.
///
/// Names are compared after [`sanitize_name`], since that is what ends up in
/// the output filenames.
pub fn validate_channels(channels: &[ChannelSpec]) -> LiverecResult<()> {
    if channels.is_empty() {
        return Err(LiverecError::config(
            "At least one channel must be configured",
        ));
    }
    if channels.len() > MAX_CHANNELS {
        return Err(LiverecError::config(format!(
            "Maximum {MAX_CHANNELS} channels allowed (got {})",
            channels.len()
        )));
    }

    let mut names = HashSet::new();
    let mut ids = HashSet::new();
    for (i, ch) in channels.iter().enumerate() {
        if ch.name.trim().is_empty() {
            return Err(LiverecError::config(format!(
                "Channel {i} missing required field: name"
            )));
        }
        if ch.channel_id.trim().is_empty() {
            return Err(LiverecError::config(format!(
                "Channel {i} missing required field: channel_id"
            )));
        }
        if !ch.channel_id.starts_with("UC") {
            return Err(LiverecError::config(format!(
                "Channel '{}' has invalid channel_id: '{}'. Channel ID should start with 'UC'",
                ch.name, ch.channel_id
            )));
        }
        if !names.insert(sanitize_name(&ch.name)) {
            return Err(LiverecError::config(format!(
                "Duplicate channel name: '{}' (names must differ as filenames)",
                ch.name
            )));
        }
        if !ids.insert(ch.channel_id.as_str()) {
            return Err(LiverecError::config(format!(
                "Duplicate channel_id: '{}'",
                ch.channel_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, id: &str) -> ChannelSpec {
        ChannelSpec {
            name: name.to_string(),
            channel_id: id.to_string(),
        }
    }

    #[test]
    fn test_parse_toml_fleet() {
        let config: FleetConfig = toml::from_str(
            r#"
            [[channels]]
            name = "lofi"
            channel_id = "UCSJ4gkVC6NrvII8umztf0Ow"

            [[channels]]
            name = "news"
            channel_id = "UCabcdefghijklmnopqrstuv"

            [settings]
            output_dir = "/srv/recordings"
            quality = "720p"
            interval = 30
            credentials = { browser = "firefox" }
            "#,
        )
        .unwrap();

        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.settings.quality, Quality::P720);
        assert_eq!(config.settings.poll_interval(), Duration::from_secs(30));
        assert_eq!(
            config.settings.credentials,
            Some(Credentials::Browser("firefox".to_string()))
        );
        assert_eq!(config.settings.container, "mp4");
        assert_eq!(config.settings.min_free_space_mb, 500);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_json_defaults() {
        let config: FleetConfig = serde_json::from_str(
            r#"{"channels": [{"name": "a", "channel_id": "UC1"}]}"#,
        )
        .unwrap();
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_unknown_quality() {
        let parsed: Result<FleetConfig, _> = toml::from_str(
            r#"
            [settings]
            quality = "4k"
            "#,
        );
        assert!(parsed.is_err());
        assert!("4k".parse::<Quality>().is_err());
        assert_eq!("480p".parse::<Quality>().unwrap(), Quality::P480);
    }

    #[test]
    fn test_fleet_size_bound() {
        let channels: Vec<_> = (0..6)
            .map(|i| channel(&format!("ch{i}"), &format!("UC{i}")))
            .collect();
        let err = validate_channels(&channels).unwrap_err();
        assert!(err.to_string().contains("Maximum 5 channels"));
        validate_channels(&channels[..5]).unwrap();
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = validate_channels(&[channel("a", "UC1"), channel("a", "UC2")]).unwrap_err();
        assert!(err.to_string().contains("Duplicate channel name"));

        let err = validate_channels(&[channel("a", "UC1"), channel("b", "UC1")]).unwrap_err();
        assert!(err.to_string().contains("Duplicate channel_id"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Lofi Girl"), "Lofi Girl");
        assert_eq!(sanitize_name("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_name("  ..hidden.. "), "hidden");
        assert_eq!(sanitize_name(""), "unknown");
        assert_eq!(sanitize_name(" . . "), "unknown");
        assert_eq!(sanitize_name(&"x".repeat(300)).chars().count(), 100);
        assert_eq!(sanitize_name(&"é".repeat(150)).chars().count(), 100);
    }

    #[test]
    fn test_names_colliding_as_filenames_rejected() {
        let err = validate_channels(&[channel("a/b", "UC1"), channel("a_b", "UC2")]).unwrap_err();
        assert!(err.to_string().contains("Duplicate channel name: 'a_b'"));

        let err =
            validate_channels(&[channel("news", "UC1"), channel(" news. ", "UC2")]).unwrap_err();
        assert!(matches!(err, LiverecError::Config { .. }));

        validate_channels(&[channel("a/b", "UC1"), channel("a-b", "UC2")]).unwrap();
    }

    #[test]
    fn test_channel_id_prefix_and_empty_list() {
        let err = validate_channels(&[channel("a", "xyz")]).unwrap_err();
        assert!(err.to_string().contains("should start with 'UC'"));
        assert!(validate_channels(&[]).is_err());
    }

    #[test]
    fn test_interval_floor() {
        let settings = Settings {
            poll_interval_secs: 9,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            poll_interval_secs: 10,
            ..Settings::default()
        };
        settings.validate().unwrap();
    }

    #[test]
    fn test_quality_selectors() {
        assert_eq!(Quality::Best.format_selector(), "best");
        assert_eq!(Quality::P360.format_selector(), "best[height<=360]");
    }

    #[test]
    fn test_ensure_output_dir_creates_directory() {
        let dir = std::env::temp_dir().join("liverec_test_output_dir");
        let _ = std::fs::remove_dir_all(&dir);

        let settings = Settings {
            output_dir: dir.join("nested"),
            ..Settings::default()
        };
        settings.ensure_output_dir().unwrap();
        assert!(dir.join("nested").is_dir());
        assert!(!dir.join("nested").join(".write_test").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = FleetConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, LiverecError::FileNotFound { .. }));
    }
}
