//! `yt-dlp` as the capture engine.
//!
//! The engine runs in its own process group so a terminal Ctrl-C reaches the
//! supervisor only; the session decides when and how the engine is stopped.
//! Graceful termination sends SIGINT to the group, which lets `yt-dlp` (and the
//! `ffmpeg` it may spawn) finalize the container before exiting.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use liverec_common::config::Credentials;
use liverec_common::error::{FailureKind, LiverecError, LiverecResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::engine::{CaptureEngine, EngineExit, EngineProcess, EngineRequest};

/// Lines of engine stderr kept for failure classification.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for output readers after the process exited.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

const STREAM_END_MARKERS: &[&str] = &[
    "live event has ended",
    "stream has ended",
    "livestream has ended",
    "live stream ended",
];

/// Capture engine backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpEngine {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
        }
    }

    /// Use a specific `yt-dlp` executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Report the installed engine version.
    pub async fn version(&self) -> LiverecResult<String> {
        let output = tokio::time::timeout(
            VERSION_TIMEOUT,
            Command::new(&self.program).arg("--version").output(),
        )
        .await
        .map_err(|_| {
            LiverecError::engine(FailureKind::Unknown, "Timed out querying engine version")
        })?
        .map_err(|e| spawn_error(&self.program, e))?;

        if !output.status.success() {
            return Err(LiverecError::engine(
                FailureKind::Unknown,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Build the engine command line for a request.
pub fn build_args(request: &EngineRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-f".into(),
        request.quality.format_selector().into(),
        // Output is already a temp path; the session owns finalization.
        "--no-part".into(),
        "--no-continue".into(),
        // The temp file exists already as an empty reservation.
        "--force-overwrites".into(),
        "--newline".into(),
        "-o".into(),
        request.output_path.clone().into_os_string(),
    ];
    args.extend(credential_args(request.credentials.as_ref()));
    args.push(request.stream_reference.clone().into());
    args
}

/// Engine flags for cookie credentials. Shared with the liveness probe.
pub fn credential_args(credentials: Option<&Credentials>) -> Vec<OsString> {
    match credentials {
        Some(Credentials::CookieFile(path)) => {
            vec!["--cookies".into(), path.clone().into_os_string()]
        }
        Some(Credentials::Browser(browser)) => {
            vec!["--cookies-from-browser".into(), browser.into()]
        }
        None => Vec::new(),
    }
}

fn spawn_error(program: &Path, err: std::io::Error) -> LiverecError {
    if err.kind() == std::io::ErrorKind::NotFound {
        LiverecError::engine(
            FailureKind::ConfigInvalid,
            format!("{} not found. Please install yt-dlp.", program.display()),
        )
    } else {
        LiverecError::engine(
            FailureKind::from_io(&err),
            format!("Failed to start {}: {err}", program.display()),
        )
    }
}

#[async_trait::async_trait]
impl CaptureEngine for YtDlpEngine {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn launch(&self, request: &EngineRequest) -> LiverecResult<Box<dyn EngineProcess>> {
        let mut command = Command::new(&self.program);
        command
            .args(build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;

        tracing::debug!(
            pid = child.id(),
            output = %request.output_path.display(),
            "Engine process started"
        );

        // Drain both pipes so a chatty engine never blocks on a full buffer.
        let output = Arc::new(Mutex::new(OutputState::default()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Pipe::Stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Pipe::Stderr, output.clone()));
        }

        Ok(Box::new(YtDlpProcess {
            child,
            readers,
            output,
            signalled: false,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct OutputState {
    stderr_tail: VecDeque<String>,
    stream_ended: bool,
}

fn spawn_reader<R>(pipe: R, which: Pipe, state: Arc<Mutex<OutputState>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let lower = line.to_lowercase();
            {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                if STREAM_END_MARKERS.iter().any(|m| lower.contains(m)) {
                    state.stream_ended = true;
                }
                if let Pipe::Stderr = which {
                    if state.stderr_tail.len() == STDERR_TAIL_LINES {
                        state.stderr_tail.pop_front();
                    }
                    state.stderr_tail.push_back(line.to_string());
                }
            }

            match which {
                Pipe::Stdout => tracing::debug!(target: "liverec::engine", "[yt-dlp] {line}"),
                Pipe::Stderr => tracing::warn!(target: "liverec::engine", "[yt-dlp] {line}"),
            }
        }
    })
}

/// A running `yt-dlp` process.
struct YtDlpProcess {
    child: Child,
    readers: Vec<JoinHandle<()>>,
    output: Arc<Mutex<OutputState>>,
    signalled: bool,
}

impl YtDlpProcess {
    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) -> LiverecResult<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return Ok(());
        };
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(err.into())
    }
}

#[async_trait::async_trait]
impl EngineProcess for YtDlpProcess {
    fn terminate(&mut self) -> LiverecResult<()> {
        self.signalled = true;
        #[cfg(unix)]
        {
            self.signal_group(libc::SIGINT)
        }
        #[cfg(not(unix))]
        {
            self.kill()
        }
    }

    fn kill(&mut self) -> LiverecResult<()> {
        self.signalled = true;
        #[cfg(unix)]
        self.signal_group(libc::SIGKILL)?;
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(&mut self) -> EngineExit {
        let status = match self.child.wait().await {
            Ok(status) => status,
            Err(e) => return EngineExit::failed(None, format!("Failed to wait for engine: {e}")),
        };

        for handle in self.readers.drain(..) {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, handle).await.is_err() {
                tracing::debug!("Engine output reader did not finish after exit");
            }
        }

        let (tail, stream_ended) = {
            let state = self.output.lock().unwrap_or_else(|e| e.into_inner());
            (
                state.stderr_tail.iter().cloned().collect::<Vec<_>>().join("\n"),
                state.stream_ended,
            )
        };

        classify_exit(
            status.success(),
            status.code(),
            self.signalled,
            stream_ended,
            &tail,
        )
    }
}

/// Map a process exit to an [`EngineExit`].
fn classify_exit(
    success: bool,
    code: Option<i32>,
    signalled: bool,
    stream_ended: bool,
    stderr_tail: &str,
) -> EngineExit {
    if success {
        if stream_ended {
            EngineExit::StreamEnded
        } else {
            EngineExit::Finished
        }
    } else if signalled || code.is_none() {
        EngineExit::Interrupted
    } else if stderr_tail.is_empty() {
        EngineExit::failed(code, format!("engine exited with status {}", code.unwrap_or(-1)))
    } else {
        EngineExit::failed(code, stderr_tail)
    }
}
