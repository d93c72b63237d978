//! WebSocket server implementation using Tokio-Tungstenite
//!
//! Accepts subscriber connections, tracks them by id and hands each one an
//! outbound channel so application code can push frames at any time, not
//! only in reply to an inbound message.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock as SyncRwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::traits::Server;

/// A unique identifier for each WebSocket connection
pub type ConnectionId = u64;

/// Sender half of a connection's outbound queue. Frames are written in the
/// order they are queued.
pub type OutboundSender = mpsc::UnboundedSender<Message>;

/// Information about an active WebSocket connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub connected_at: std::time::Instant,
}

/// Application hooks for a WebSocket server
///
/// `on_connect` runs before the first inbound frame is read; anything it
/// queues on `outbound` is written before any reply from `handle`.
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message and optionally return a direct reply
    fn handle(&self, conn_id: ConnectionId, message: Message) -> Option<Message>;

    /// Called when a new connection is established
    fn on_connect(&self, _conn_id: ConnectionId, _peer_addr: SocketAddr, _outbound: OutboundSender) {}

    /// Called when a connection is closed
    fn on_disconnect(&self, _conn_id: ConnectionId) {}
}

/// WebSocket server with connection tracking and graceful draining
#[derive(Clone)]
pub struct WebSocketServer {
    config: ServerConfig,
    running: Arc<AtomicBool>,
    bound_addr: Arc<SyncRwLock<Option<SocketAddr>>>,
    next_conn_id: Arc<AtomicU64>,
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionInfo>>>,
    handler: Arc<dyn MessageHandler>,
}

impl WebSocketServer {
    pub fn with_handler<H: MessageHandler + 'static>(config: ServerConfig, handler: H) -> Self {
        Self::with_shared_handler(config, Arc::new(handler))
    }

    pub fn with_shared_handler(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            bound_addr: Arc::new(SyncRwLock::new(None)),
            next_conn_id: Arc::new(AtomicU64::new(1)),
            connections: Arc::new(RwLock::new(HashMap::new())),
            handler,
        }
    }

    fn bind_addr(&self) -> Result<SocketAddr> {
        self.config
            .websocket_addr()
            .ok_or_else(|| ServerError::ConfigError("WebSocket port not configured".into()))?
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    fn next_connection_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn register_connection(
        &self,
        id: ConnectionId,
        peer_addr: SocketAddr,
        outbound: OutboundSender,
    ) {
        let info = ConnectionInfo {
            id,
            peer_addr,
            connected_at: std::time::Instant::now(),
        };
        self.connections.write().await.insert(id, info);
        self.handler.on_connect(id, peer_addr, outbound);
    }

    async fn unregister_connection(&self, id: ConnectionId) {
        self.connections.write().await.remove(&id);
        self.handler.on_disconnect(id);
    }

    async fn handle_connection(
        &self,
        conn_id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        conn_token: CancellationToken,
    ) -> Result<()> {
        debug!(conn_id, %peer_addr, "WebSocket connection established");

        let ws_stream = accept_async(stream).await.map_err(ServerError::WebSocket)?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        self.register_connection(conn_id, peer_addr, outbound_tx).await;

        loop {
            tokio::select! {
                biased;

                _ = conn_token.cancelled() => {
                    debug!(conn_id, "Connection shutting down due to server shutdown");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }

                Some(outgoing) = outbound_rx.recv() => {
                    if let Err(e) = ws_sender.send(outgoing).await {
                        warn!(conn_id, %e, "Failed to push WebSocket message");
                        break;
                    }
                }

                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(message)) => {
                            if message.is_close() {
                                debug!(conn_id, "WebSocket client disconnected gracefully");
                                break;
                            }

                            if let Some(response) = self.handler.handle(conn_id, message) {
                                if let Err(e) = ws_sender.send(response).await {
                                    error!(conn_id, %e, "Failed to send WebSocket message");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!(conn_id, %e, "WebSocket error");
                            break;
                        }
                        None => {
                            debug!(conn_id, "WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        }

        // Closing the receiver makes the handler's sender report closed
        outbound_rx.close();
        self.unregister_connection(conn_id).await;

        debug!(conn_id, "WebSocket connection closed");
        Ok(())
    }
}

#[async_trait]
impl Server for WebSocketServer {
    fn name(&self) -> &str {
        "websocket"
    }

    fn address(&self) -> Option<SocketAddr> {
        *self.bound_addr.read()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self, shutdown_token: CancellationToken) -> Result<()> {
        let addr = self.bind_addr()?;

        info!(%addr, "Starting WebSocket server");

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::bind(addr.to_string(), e))?;

        let local_addr = listener.local_addr().map_err(ServerError::Io)?;
        *self.bound_addr.write() = Some(local_addr);

        info!(%local_addr, "WebSocket server listening");

        self.running.store(true, Ordering::SeqCst);

        let mut connection_handles: Vec<tokio::task::JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!("WebSocket server received shutdown signal");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let conn_id = self.next_connection_id();
                            let server = self.clone();
                            let conn_token = shutdown_token.child_token();

                            let handle = tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(
                                    conn_id,
                                    stream,
                                    peer_addr,
                                    conn_token
                                ).await {
                                    error!(conn_id, %e, "WebSocket connection error");
                                }
                            });

                            connection_handles.push(handle);
                            connection_handles.retain(|h| !h.is_finished());
                        }
                        Err(e) => {
                            error!(%e, "Failed to accept WebSocket connection");
                        }
                    }
                }
            }
        }

        let connection_count = connection_handles.len();
        if connection_count > 0 {
            info!(connection_count, "Waiting for active WebSocket connections to close...");

            let timeout = tokio::time::timeout(
                std::time::Duration::from_secs(10),
                futures::future::join_all(connection_handles),
            );

            match timeout.await {
                Ok(_) => info!("All WebSocket connections closed gracefully"),
                Err(_) => warn!("Timed out waiting for WebSocket connections to close"),
            }
        }

        self.running.store(false, Ordering::SeqCst);
        *self.bound_addr.write() = None;

        info!("WebSocket server shutdown complete");

        Ok(())
    }
}
