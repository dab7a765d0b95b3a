//! OS shutdown signals.
//!
//! On Unix this listens for SIGINT, SIGTERM and SIGQUIT; on Windows for Ctrl-C.
//! Handlers are registered when [`ShutdownSignals::install`] returns, so a
//! signal arriving right after that no longer takes the default action.

use std::io;

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces an immediate exit.
const FORCED_EXIT_CODE: i32 = 130;

/// Registered shutdown signal streams.
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigquit: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignals {
    /// Register the handlers. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    #[cfg(windows)]
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Wait for the next shutdown signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigint.recv() => tracing::info!("Received SIGINT"),
            _ = self.sigterm.recv() => tracing::info!("Received SIGTERM"),
            _ = self.sigquit.recv() => tracing::info!("Received SIGQUIT"),
        }
    }

    #[cfg(windows)]
    pub async fn recv(&mut self) {
        self.ctrl_c.recv().await;
        tracing::info!("Received Ctrl-C");
    }
}

/// Complete on the first shutdown signal.
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
    ShutdownSignals::install()?.recv().await;
    Ok(())
}

/// Cancel `token` on the first shutdown signal and exit the process on the
/// second.
///
/// Handlers are registered before this returns.
pub fn cancel_on_shutdown(token: CancellationToken) -> io::Result<()> {
    let mut signals = ShutdownSignals::install()?;
    tokio::spawn(async move {
        signals.recv().await;
        tracing::info!("Shutting down, finishing in-flight recordings (signal again to force)");
        token.cancel();

        signals.recv().await;
        tracing::warn!("Second signal received, exiting without finalizing");
        std::process::exit(FORCED_EXIT_CODE);
    });
    Ok(())
}
