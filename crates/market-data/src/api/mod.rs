//! REST API for the feed.
//!
//! Read-only views of the live state plus the ad-hoc option-chain query.
//!
//! ## Modules
//!
//! - `handlers` - HTTP handlers and shared state
//! - `routes` - Axum router
//! - `models` - Request/response types

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::FeedApiState;
pub use routes::feed_routes;
