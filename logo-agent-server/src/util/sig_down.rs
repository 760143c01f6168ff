//! Graceful shutdown on process signals.
//!
//! [`SigDown`] turns the first SIGTERM or SIGINT (Ctrl+C off Unix) into a
//! cancelled [`CancellationToken`]. The HTTP server waits on
//! [`SigDown::shutdown_signal`], and [`SigDown::recv`] lets `main` wait for the
//! watcher task to exit before returning.

use std::future::Future;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Shutdown trigger shared by the server and `main`.
#[derive(Debug)]
pub struct SigDown {
    token: CancellationToken,
    watcher: TaskTracker,
}

impl SigDown {
    /// Installs the signal handlers and starts watching.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if a handler cannot be registered.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let signals = ShutdownSignals::install()?;
        let token = CancellationToken::new();
        let watcher = TaskTracker::new();

        let watched = token.clone();
        watcher.spawn(async move {
            tokio::select! {
                name = signals.first() => {
                    tracing::info!(signal = name, "shutdown requested");
                    watched.cancel();
                }
                () = watched.cancelled() => {}
            }
        });
        watcher.close();

        Ok(Self { token, watcher })
    }

    /// Future resolving once shutdown was requested.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        self.token.clone().cancelled_owned()
    }

    /// Requests shutdown without an OS signal.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for shutdown and for the watcher task to finish.
    pub async fn recv(&self) {
        self.token.cancelled().await;
        self.watcher.wait().await;
    }
}

/// OS signal streams that request shutdown.
struct ShutdownSignals {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    interrupt: Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn install() -> Result<Self, std::io::Error> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps)]
    fn install() -> Result<Self, std::io::Error> {
        Ok(Self {})
    }

    /// Resolves with the name of the first signal received.
    #[cfg(unix)]
    async fn first(mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }

    #[cfg(not(unix))]
    async fn first(self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}
