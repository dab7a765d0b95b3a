//! liverec capture engine
//!
//! Records one live stream to one file by driving an external downloader
//! (`yt-dlp`) as a child process. A capture writes to a hidden temp file and
//! promotes it to its final name only when the engine exits with usable output.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                CaptureSession                 │
//! │  ┌──────────┐  ┌────────────┐  ┌───────────┐  │
//! │  │ DiskSpace│  │CaptureEngine│ │  naming   │  │
//! │  │  check   │  │  (yt-dlp)   │ │ temp/final│  │
//! │  └────┬─────┘  └──────┬─────┘  └─────┬─────┘  │
//! │       │               │              │        │
//! │       ▼               ▼              ▼        │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │   .name_YYYYMMDD_HHMMSS.mp4.tmp → .mp4  │  │
//! │  └─────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```

pub mod disk;
pub mod engine;
pub mod naming;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod session;
pub mod ytdlp;

pub use disk::{DiskSpace, FixedDiskSpace, StatvfsDiskSpace};
pub use engine::{CaptureEngine, EngineExit, EngineProcess, EngineRequest};
pub use runner::SingleShotRunner;
pub use session::*;
pub use ytdlp::YtDlpEngine;
