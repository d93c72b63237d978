//! Live option market data for Strikewatch
//!
//! Keeps a baseline document per symbol, refreshes its live prices from a
//! rate-limited upstream quote API and fans the merged result out to every
//! connected subscriber.
//!
//! # Core Components
//!
//! - [`quote_client`] - Batched upstream quotes with a two-window budget and backoff
//! - [`instruments`] - Instrument ids referenced by a document
//! - [`enrichment`] - Merge live prices into a document
//! - [`state`] - Per-symbol documents and live price maps
//! - [`feed`] - Primary and extra polling loops, subscriber lifecycle
//! - [`registry`] - Subscriber set and fan-out
//! - [`session`] - WebSocket hooks
//! - [`api`] - REST endpoints
//!
//! # Key Invariants
//!
//! - The quote client never fails; refused or failed calls yield no quotes
//! - Live values are never replaced by "no data", only by newer data
//! - Averages are never backfilled from reference closes
//! - Polling runs only while someone is listening

pub mod api;
pub mod baseline;
pub mod chain;
pub mod enrichment;
pub mod error;
pub mod feed;
pub mod instruments;
pub mod protocol;
pub mod quote_client;
pub mod registry;
pub mod session;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{feed_routes, FeedApiState};
pub use baseline::{BaselineLoader, BaselineSource, JsonDirectorySource, StaticBaselineSource};
pub use chain::{JsonChainDirectory, OptionChainSource, StaticChainSource};
pub use error::FeedError;
pub use feed::{FeedOptions, MarketFeed, RateLimits};
pub use quote_client::{
    AveragePriceField, QuoteClient, QuoteClientConfig, QuoteTransport, RateLimitStatus,
    TransportResponse, UpstoxTransport,
};
pub use registry::{SubscriberId, SubscriberSink};
pub use session::FeedSocketHandler;
pub use types::{EnrichedView, LiveQuote, SymbolDocument};

pub type Result<T> = std::result::Result<T, FeedError>;
