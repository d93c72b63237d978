//! Server traits for polymorphic server handling
//!
//! [`Server`] is implemented by every listener; [`ServerExt`] adds spawning
//! and signal-driven runs on top of it.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Core server trait.
///
/// # Implementors
///
/// - [`HttpServer`](crate::http::HttpServer) - REST API using Axum
/// - [`WebSocketServer`](crate::websocket::WebSocketServer) - subscriber socket
/// - [`CombinedServer`](crate::CombinedServer) - Runs both
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Returns the server's name for logging and identification.
    fn name(&self) -> &str;

    /// Returns the address the server is bound to, if running.
    fn address(&self) -> Option<SocketAddr>;

    /// Returns true if the server is currently running.
    fn is_running(&self) -> bool;

    /// Runs the server until the shutdown token is cancelled.
    ///
    /// Implementations bind, serve until `shutdown` fires, drain open
    /// connections and return `Ok(())` on a clean stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or hits a fatal I/O error.
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;
}

/// Extension trait providing convenience methods for servers.
///
/// Automatically implemented for all types that implement [`Server`].
pub trait ServerExt: Server + Sized {
    /// Spawns the server on a new task and returns a handle and shutdown token.
    ///
    /// ```ignore
    /// let (handle, token) = server.spawn();
    /// token.cancel();
    /// handle.await??;
    /// ```
    fn spawn(self) -> (tokio::task::JoinHandle<Result<()>>, CancellationToken) {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let handle = tokio::spawn(async move { self.run(token_clone).await });
        (handle, token)
    }

    /// Runs the server until Ctrl+C or SIGTERM.
    fn run_until_signal(self) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            let shutdown = crate::shutdown::ShutdownController::with_signals();
            self.run(shutdown.token()).await
        }
    }
}

impl<T: Server + Sized> ServerExt for T {}
