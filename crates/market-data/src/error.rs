//! Feed error types

use thiserror::Error;

/// Errors raised inside the feed.
///
/// The quote client and the baseline loader never let these escape their
/// boundary; they log them and report "no data" instead.
#[derive(Error, Debug)]
pub enum FeedError {
    /// No upstream access token
    #[error("Upstream access token is not configured")]
    ConfigurationMissing,

    /// Upstream answered 429
    #[error("Upstream throttled the request, backing off for {backoff_ms}ms")]
    UpstreamThrottled { backoff_ms: u64 },

    /// Transport failure, non-success status or an unusable body
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Baseline document for {symbol} unavailable: {reason}")]
    BaselineUnavailable { symbol: String, reason: String },

    #[error("Option chain for {symbol} unavailable: {reason}")]
    OptionChainUnavailable { symbol: String, reason: String },

    #[error("Malformed inbound message: {0}")]
    MalformedInboundMessage(String),

    #[error("No symbol could be loaded")]
    NoSymbolsLoaded,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
