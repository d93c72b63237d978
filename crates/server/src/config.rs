//! Server configuration
//!
//! Listener configuration and the default port assignments.

use crate::error::{Result, ServerError};
use std::net::SocketAddr;

/// Default port assignments
///
/// The REST API and the subscriber socket listen on separate ports.
pub mod ports {
    /// REST API port
    pub const FEED_HTTP: u16 = 3001;
    /// Subscriber WebSocket port
    pub const FEED_WS: u16 = 3002;
}

/// Listener configuration for both protocols
///
/// Each port is optional, allowing you to run only the protocols you need.
///
/// # Example
///
/// ```
/// use server::config::ServerConfig;
///
/// let config = ServerConfig::new("0.0.0.0", 3001, 3002);
/// let config = ServerConfig::http_only("127.0.0.1", 3001);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Optional HTTP port
    pub http_port: Option<u16>,
    /// Optional WebSocket port
    pub websocket_port: Option<u16>,
}

impl ServerConfig {
    /// Create a new server config with both ports
    pub fn new(host: impl Into<String>, http: u16, ws: u16) -> Self {
        Self {
            host: host.into(),
            http_port: Some(http),
            websocket_port: Some(ws),
        }
    }

    /// Create a server config for HTTP only
    pub fn http_only(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            http_port: Some(port),
            websocket_port: None,
        }
    }

    /// Create a server config for WebSocket only
    pub fn websocket_only(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            http_port: None,
            websocket_port: Some(port),
        }
    }

    /// Get HTTP socket address
    pub fn http_addr(&self) -> Option<Result<SocketAddr>> {
        self.http_port.map(|p| self.parse_addr(p))
    }

    /// Get WebSocket socket address
    pub fn websocket_addr(&self) -> Option<Result<SocketAddr>> {
        self.websocket_port.map(|p| self.parse_addr(p))
    }

    /// Check if any servers are configured
    pub fn has_servers(&self) -> bool {
        self.http_port.is_some() || self.websocket_port.is_some()
    }

    fn parse_addr(&self, port: u16) -> Result<SocketAddr> {
        format!("{}:{}", self.host, port)
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", self.host, port)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("0.0.0.0", ports::FEED_HTTP, ports::FEED_WS)
    }
}
