//! The capture engine seam.
//!
//! Stream probing and downloading is delegated to an external engine that is
//! driven as an opaque child process. The session only ever needs three things
//! from it: launch, signal (graceful or forced), and await exit.

use std::path::PathBuf;

use liverec_common::config::{Credentials, Quality};
use liverec_common::error::{FailureKind, LiverecResult};

/// Everything the engine needs to start writing one stream to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    /// Stream URL or engine-understood reference.
    pub stream_reference: String,

    /// Requested quality.
    pub quality: Quality,

    /// Optional cookie credentials.
    pub credentials: Option<Credentials>,

    /// Where the engine must write its output (always a temporary path).
    pub output_path: PathBuf,
}

/// How an engine process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineExit {
    /// Clean exit with the media fully written.
    Finished,

    /// Clean exit after the engine observed the end of the live broadcast.
    StreamEnded,

    /// The process ended because it was signalled.
    Interrupted,

    /// The engine reported an error.
    Failed {
        code: Option<i32>,
        kind: FailureKind,
        reason: String,
    },
}

impl EngineExit {
    pub fn failed(code: Option<i32>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Failed {
            code,
            kind: FailureKind::classify(&reason),
            reason,
        }
    }
}

/// Launches engine processes.
#[async_trait::async_trait]
pub trait CaptureEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Start a new engine process for `request`.
    ///
    /// An error here means nothing was started and no output was written.
    async fn launch(&self, request: &EngineRequest) -> LiverecResult<Box<dyn EngineProcess>>;
}

/// A running engine process.
#[async_trait::async_trait]
pub trait EngineProcess: Send {
    /// Ask the engine to stop and finalize its output.
    fn terminate(&mut self) -> LiverecResult<()>;

    /// Force the engine to stop immediately.
    fn kill(&mut self) -> LiverecResult<()>;

    /// Wait for the process to exit.
    ///
    /// Must be cancel safe: the session races this against its stop triggers
    /// and calls it again after signalling.
    async fn wait(&mut self) -> EngineExit;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_exit_is_classified() {
        let exit = EngineExit::failed(Some(1), "ERROR: Private video. Sign in if you've been granted access");
        match exit {
            EngineExit::Failed { code, kind, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(kind, FailureKind::AuthRequired);
            }
            other => panic!("unexpected exit: {other:?}"),
        }
    }
}
