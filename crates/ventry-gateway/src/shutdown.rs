//! Graceful shutdown coordination.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long `drain` waits for tasks before giving up.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans a single cancellation signal out to every gateway task.
///
/// Connection sessions, their heartbeat tasks, and the accept loop all hold
/// child tokens; triggering shutdown cancels them all.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token observing this coordinator.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel everything and wait for the given tasks to finish.
    ///
    /// Tasks still running after `timeout` (default 10 s) are left to the
    /// runtime; a hung connection must not block process exit.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.trigger();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining gateway tasks"
        );
        let joined = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, joined).await.is_err() {
            warn!("drain timed out after {timeout:?}, abandoning remaining tasks");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
