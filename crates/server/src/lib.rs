//! Server infrastructure for Strikewatch
//!
//! This crate provides the HTTP and WebSocket listeners with unified
//! lifecycle management and graceful shutdown.
//!
// Allow large error types - WebSocket errors are unavoidably large
#![allow(clippy::result_large_err)]
//!
//! # Architecture
//!
//! All servers implement the [`Server`] trait. The [`ServerExt`] trait
//! provides `spawn()` and `run_until_signal()`.
//!
//! Shutdown coordination uses `CancellationToken` from `tokio_util`;
//! cancelling a parent token cancels every child token.
//!
//! # Quick Start
//!
//! ```ignore
//! use server::{CombinedServer, ServerConfig, ServerExt};
//!
//! let server = CombinedServer::new(ServerConfig::default(), router, handler);
//! server.run_until_signal().await?;
//! ```

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod config;
pub mod error;
pub mod shutdown;
pub mod traits;

pub mod http;
pub mod websocket;

pub use config::{ports, ServerConfig};
pub use error::{Result, ServerError};
pub use http::HttpServer;
pub use shutdown::ShutdownController;
pub use traits::{Server, ServerExt};
pub use websocket::{ConnectionId, MessageHandler, OutboundSender, WebSocketServer};

/// Runs the REST listener and the subscriber socket side by side.
///
/// ```ignore
/// let server = CombinedServer::new(config, router, handler);
/// let (handle, token) = server.spawn();
/// token.cancel();
/// handle.await??;
/// ```
///
/// Clones share their listeners' bound addresses, so a spawned copy can be
/// queried through the original.
#[derive(Clone)]
pub struct CombinedServer {
    name: String,
    config: ServerConfig,
    http_server: Option<HttpServer>,
    ws_server: Option<WebSocketServer>,
}

impl CombinedServer {
    pub fn new(
        config: ServerConfig,
        http_router: axum::Router,
        ws_handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self::with_name("combined", config, http_router, ws_handler)
    }

    pub fn with_name(
        name: impl Into<String>,
        config: ServerConfig,
        http_router: axum::Router,
        ws_handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let http_server = config
            .http_port
            .map(|_| HttpServer::new(config.clone(), http_router));
        let ws_server = config
            .websocket_port
            .map(|_| WebSocketServer::with_shared_handler(config.clone(), ws_handler));

        Self {
            name: name.into(),
            config,
            http_server,
            ws_server,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bound HTTP address once the listener is up
    pub fn http_address(&self) -> Option<std::net::SocketAddr> {
        self.http_server.as_ref().and_then(|s| s.address())
    }

    /// Bound WebSocket address once the listener is up
    pub fn websocket_address(&self) -> Option<std::net::SocketAddr> {
        self.ws_server.as_ref().and_then(|s| s.address())
    }
}

#[async_trait::async_trait]
impl Server for CombinedServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> Option<std::net::SocketAddr> {
        self.http_address().or_else(|| self.websocket_address())
    }

    fn is_running(&self) -> bool {
        self.http_server
            .as_ref()
            .map(|s| s.is_running())
            .unwrap_or(false)
            || self
                .ws_server
                .as_ref()
                .map(|s| s.is_running())
                .unwrap_or(false)
    }

    async fn run(&self, shutdown_token: CancellationToken) -> Result<()> {
        info!(server = %self.name, "Starting combined server...");

        let mut handles: Vec<tokio::task::JoinHandle<Result<()>>> = Vec::new();

        if let Some(ref http) = self.http_server {
            let http = http.clone();
            let token = shutdown_token.child_token();
            handles.push(tokio::spawn(async move { http.run(token).await }));
        }

        if let Some(ref ws) = self.ws_server {
            let ws = ws.clone();
            let token = shutdown_token.child_token();
            handles.push(tokio::spawn(async move { ws.run(token).await }));
        }

        if handles.is_empty() {
            warn!("No servers configured to start");
            return Ok(());
        }

        info!(
            server = %self.name,
            http_port = ?self.config.http_port,
            websocket_port = ?self.config.websocket_port,
            "All server components started"
        );

        // Stop on the shutdown token, or as soon as one listener exits
        let first_exit = tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!("Shutdown signal received");
                None
            }
            exited = wait_for_first_completion(&mut handles) => exited,
        };

        let mut first_failure = None;
        if let Some((index, outcome)) = first_exit {
            // A completed JoinHandle must not be polled again
            handles.swap_remove(index);
            match outcome {
                Ok(Ok(())) => warn!("A server exited unexpectedly (but successfully)"),
                Ok(Err(e)) => {
                    error!(%e, "A server exited with error");
                    first_failure = Some(e);
                }
                Err(e) => error!(%e, "A server task panicked"),
            }
            shutdown_token.cancel();
        }

        info!("Waiting for all servers to shut down...");
        let shutdown_timeout = std::time::Duration::from_secs(30);

        match tokio::time::timeout(shutdown_timeout, futures::future::join_all(handles)).await {
            Ok(results) => {
                let errors: Vec<_> = results
                    .into_iter()
                    .filter_map(|r| match r {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(e.to_string()),
                        Err(e) => Some(format!("Task panicked: {}", e)),
                    })
                    .collect();

                if errors.is_empty() {
                    info!(server = %self.name, "All servers shut down successfully");
                } else {
                    warn!(?errors, "Some servers had errors during shutdown");
                }
            }
            Err(_) => {
                warn!("Timed out waiting for servers to shut down");
            }
        }

        info!(server = %self.name, "Combined server shutdown complete");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Resolves with the index and outcome of the first listener task to finish.
async fn wait_for_first_completion(
    handles: &mut [tokio::task::JoinHandle<Result<()>>],
) -> Option<(usize, std::result::Result<Result<()>, tokio::task::JoinError>)> {
    if handles.is_empty() {
        return None;
    }

    let (result, index, _remaining) =
        futures::future::select_all(handles.iter_mut().map(Box::pin)).await;

    Some((index, result))
}
