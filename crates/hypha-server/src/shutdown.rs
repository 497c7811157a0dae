//! Process shutdown: one `CancellationToken` shared by the serve loop,
//! session teardown and background tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of draining background tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every task finished in time.
    Drained,
    /// The timeout hit; this many tasks were aborted.
    Aborted(usize),
}

/// Owns the shutdown token and the drain policy.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator with [`DEFAULT_DRAIN_TIMEOUT`].
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Override the drain timeout.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Clone of the token. Cancelled once shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Start shutdown on Ctrl-C, or SIGTERM on unix.
    ///
    /// The listener exits on its own once shutdown starts for another reason.
    pub fn cancel_on_signal(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = wait_for_signal() => {
                    info!(signal, "shutdown signal received");
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        })
    }

    /// Start shutdown, then wait for `handles` up to the drain timeout.
    ///
    /// Tasks still running at the deadline are aborted.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>) -> DrainOutcome {
        self.shutdown();
        info!(
            tasks = handles.len(),
            timeout_secs = self.drain_timeout.as_secs(),
            "draining background tasks"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(self.drain_timeout, drain).await.is_ok() {
            return DrainOutcome::Drained;
        }

        let stuck: Vec<_> = aborts.into_iter().filter(|h| !h.is_finished()).collect();
        warn!(
            stuck = stuck.len(),
            "drain timed out after {:?}, aborting", self.drain_timeout
        );
        for handle in &stuck {
            handle.abort();
        }
        DrainOutcome::Aborted(stuck.len())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, ctrl-c only");
            return ctrl_c().await;
        }
    };
    tokio::select! {
        name = ctrl_c() => name,
        _ = term.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        // Without a signal source, only an explicit shutdown can stop us.
        std::future::pending::<()>().await;
    }
    "ctrl-c"
}
