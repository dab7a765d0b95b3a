//! A scripted in-process engine for driving sessions and monitors in tests.
//!
//! Every launch consumes the next [`ScriptedRun`] from the queue, falling back
//! to a repeatable default once the queue is empty. Timing uses `tokio::time`,
//! so tests can run on a paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use liverec_common::error::{FailureKind, LiverecError, LiverecResult};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::engine::{CaptureEngine, EngineExit, EngineProcess, EngineRequest};

/// Behavior of one scripted launch.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Write `bytes`, then exit with `exit` after `after` unless signalled first.
    ExitAfter {
        after: Duration,
        exit: EngineExit,
        bytes: usize,
    },

    /// Write `bytes`, then run until signalled.
    UntilSignalled { bytes: usize, ignore_terminate: bool },

    /// Refuse to launch.
    LaunchError { kind: FailureKind, message: String },
}

impl ScriptedRun {
    pub fn exit_after(after: Duration, exit: EngineExit, bytes: usize) -> Self {
        Self::ExitAfter { after, exit, bytes }
    }

    pub fn until_signalled(bytes: usize) -> Self {
        Self::UntilSignalled {
            bytes,
            ignore_terminate: false,
        }
    }

    /// Ignores graceful termination and only dies on kill.
    pub fn stubborn(bytes: usize) -> Self {
        Self::UntilSignalled {
            bytes,
            ignore_terminate: true,
        }
    }
}

/// Counters shared between the engine and its processes.
#[derive(Debug, Default)]
pub struct ScriptedStats {
    launches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    terminations: AtomicUsize,
    kills: AtomicUsize,
    requests: Mutex<Vec<EngineRequest>>,
}

impl ScriptedStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Processes launched and not yet exited.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running processes seen.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Every request the engine was launched with, in order.
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Engine that plays back [`ScriptedRun`]s.
pub struct ScriptedEngine {
    runs: Mutex<VecDeque<ScriptedRun>>,
    fallback: ScriptedRun,
    stats: Arc<ScriptedStats>,
}

impl ScriptedEngine {
    pub fn new(runs: impl IntoIterator<Item = ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into_iter().collect()),
            fallback: ScriptedRun::until_signalled(0),
            stats: Arc::new(ScriptedStats::default()),
        }
    }

    /// Behavior once the queue is exhausted.
    pub fn with_fallback(mut self, run: ScriptedRun) -> Self {
        self.fallback = run;
        self
    }

    pub fn stats(&self) -> Arc<ScriptedStats> {
        self.stats.clone()
    }

    fn next_run(&self) -> ScriptedRun {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait::async_trait]
impl CaptureEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn launch(&self, request: &EngineRequest) -> LiverecResult<Box<dyn EngineProcess>> {
        let run = self.next_run();
        self.stats
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let (bytes, behavior) = match run {
            ScriptedRun::LaunchError { kind, message } => {
                return Err(LiverecError::engine(kind, message));
            }
            ScriptedRun::ExitAfter { after, exit, bytes } => (
                bytes,
                Behavior::ExitAt {
                    deadline: Instant::now() + after,
                    exit,
                },
            ),
            ScriptedRun::UntilSignalled {
                bytes,
                ignore_terminate,
            } => (bytes, Behavior::UntilSignalled { ignore_terminate }),
        };

        if bytes > 0 {
            std::fs::write(&request.output_path, vec![0u8; bytes])?;
        }

        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        let now_active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(now_active, Ordering::SeqCst);

        let (signal_tx, signal_rx) = watch::channel(Signal::None);
        Ok(Box::new(ScriptedProcess {
            behavior,
            signal_tx,
            signal_rx,
            exited: None,
            stats: self.stats.clone(),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    None,
    Terminate,
    Kill,
}

enum Behavior {
    ExitAt { deadline: Instant, exit: EngineExit },
    UntilSignalled { ignore_terminate: bool },
}

struct ScriptedProcess {
    behavior: Behavior,
    signal_tx: watch::Sender<Signal>,
    signal_rx: watch::Receiver<Signal>,
    exited: Option<EngineExit>,
    stats: Arc<ScriptedStats>,
}

impl ScriptedProcess {
    fn mark_exited(&mut self, exit: EngineExit) -> EngineExit {
        if self.exited.is_none() {
            self.stats.active.fetch_sub(1, Ordering::SeqCst);
        }
        self.exited = Some(exit.clone());
        exit
    }
}

#[async_trait::async_trait]
impl EngineProcess for ScriptedProcess {
    fn terminate(&mut self) -> LiverecResult<()> {
        self.stats.terminations.fetch_add(1, Ordering::SeqCst);
        if *self.signal_tx.borrow() == Signal::None {
            self.signal_tx.send_replace(Signal::Terminate);
        }
        Ok(())
    }

    fn kill(&mut self) -> LiverecResult<()> {
        self.stats.kills.fetch_add(1, Ordering::SeqCst);
        self.signal_tx.send_replace(Signal::Kill);
        Ok(())
    }

    async fn wait(&mut self) -> EngineExit {
        if let Some(exit) = &self.exited {
            return exit.clone();
        }

        let exit = match &self.behavior {
            Behavior::ExitAt { deadline, exit } => {
                let deadline = *deadline;
                let exit = exit.clone();
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => exit,
                    _ = self.signal_rx.wait_for(|s| *s != Signal::None) => EngineExit::Interrupted,
                }
            }
            Behavior::UntilSignalled { ignore_terminate } => {
                let ignore_terminate = *ignore_terminate;
                let _ = self
                    .signal_rx
                    .wait_for(|s| match s {
                        Signal::Kill => true,
                        Signal::Terminate => !ignore_terminate,
                        Signal::None => false,
                    })
                    .await;
                EngineExit::Interrupted
            }
        };

        self.mark_exited(exit)
    }
}

impl Drop for ScriptedProcess {
    fn drop(&mut self) {
        if self.exited.is_none() {
            self.stats.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
