//! Graceful shutdown utilities using CancellationToken
//!
//! Tokens can be cloned across tasks, and child tokens are cancelled with
//! their parent, so one controller fans out to every listener and loop.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the listeners and the feed loops.
///
/// ```ignore
/// let shutdown = ShutdownController::with_signals();
/// let http_token = shutdown.child_token();
/// tokio::spawn(async move { http_server.run(http_token).await });
/// shutdown.wait_for_shutdown().await;
/// ```
#[derive(Clone)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Create a controller cancelled by Ctrl+C, or SIGTERM on unix.
    pub fn with_signals() -> Self {
        let controller = Self::new();
        let token = controller.token.clone();

        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            info!(signal, "Received shutdown signal, initiating graceful shutdown...");
            token.cancel();
        });

        controller
    }

    /// Child tokens are cancelled with this controller but can also be
    /// cancelled on their own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        info!("Manual shutdown triggered");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(%e, "Failed to listen for SIGTERM, only Ctrl+C will stop the service");
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await;
    "ctrl_c"
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_shutdown() {
        let controller = ShutdownController::new();
        let token = controller.child_token();

        assert!(!controller.is_cancelled());
        assert!(!token.is_cancelled());

        controller.shutdown();

        assert!(controller.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_token_independence() {
        let controller = ShutdownController::new();
        let child1 = controller.child_token();
        let child2 = controller.child_token();

        child1.cancel();

        assert!(child1.is_cancelled());
        assert!(!child2.is_cancelled());
        assert!(!controller.is_cancelled());

        controller.shutdown();

        assert!(child2.is_cancelled());
    }
}
