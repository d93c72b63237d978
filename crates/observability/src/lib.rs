//! Observability infrastructure for Strikewatch
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics
//! - Metric sets for the quote clients and the feed loops
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("strikewatch", LogFormat::Pretty, "info")?;
//!
//! // Optional
//! observability::metrics::init_metrics(9187)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{init_metrics, FeedMetrics, QuoteMetrics, SkipReason};
