//! Prometheus metrics infrastructure
//!
//! Exporter setup plus the metric sets used by the quote clients and the
//! feed scheduler.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Initialize the Prometheus metrics exporter
///
/// This starts an HTTP server on the specified port that exposes metrics
/// at the `/metrics` endpoint.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Why a quote call returned nothing without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoCredential,
    MinuteBudget,
    ThirtyMinuteBudget,
    BackingOff,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoCredential => "no_credential",
            SkipReason::MinuteBudget => "minute_budget",
            SkipReason::ThirtyMinuteBudget => "thirty_minute_budget",
            SkipReason::BackingOff => "backing_off",
        }
    }
}

/// Metrics for one upstream quote client
///
/// * `quote_requests_total{client,outcome}` - network attempts by outcome
/// * `quote_requests_skipped_total{client,reason}` - calls refused locally
/// * `quote_request_duration_seconds{client}` - round-trip time
/// * `quote_backoff_ms{client}` - current backoff delay, 0 when inactive
/// * `quotes_received_total{client}` - parsed quotes
#[derive(Clone)]
pub struct QuoteMetrics {
    ok: Counter,
    throttled: Counter,
    failed: Counter,
    request_duration: Histogram,
    backoff_ms: Gauge,
    quotes_received: Counter,
    client: String,
}

impl QuoteMetrics {
    pub fn new(client: &str) -> Self {
        let name = client.to_string();

        Self {
            ok: counter!("quote_requests_total", "client" => name.clone(), "outcome" => "ok"),
            throttled: counter!("quote_requests_total", "client" => name.clone(), "outcome" => "throttled"),
            failed: counter!("quote_requests_total", "client" => name.clone(), "outcome" => "failed"),
            request_duration: histogram!("quote_request_duration_seconds", "client" => name.clone()),
            backoff_ms: gauge!("quote_backoff_ms", "client" => name.clone()),
            quotes_received: counter!("quotes_received_total", "client" => name.clone()),
            client: name,
        }
    }

    pub fn record_success(&self, duration: Duration, quotes: usize) {
        self.ok.increment(1);
        self.request_duration.record(duration.as_secs_f64());
        self.quotes_received.increment(quotes as u64);
    }

    pub fn record_throttled(&self, backoff: Duration) {
        self.throttled.increment(1);
        self.backoff_ms.set(backoff.as_millis() as f64);
    }

    pub fn record_failure(&self) {
        self.failed.increment(1);
    }

    pub fn record_skip(&self, reason: SkipReason) {
        counter!(
            "quote_requests_skipped_total",
            "client" => self.client.clone(),
            "reason" => reason.as_str()
        )
        .increment(1);
    }

    pub fn backoff_cleared(&self) {
        self.backoff_ms.set(0.0);
    }

    pub fn client(&self) -> &str {
        &self.client
    }
}

/// Metrics for the polling loops and fan-out
///
/// * `feed_ticks_total{loop}` - completed loop ticks
/// * `feed_broadcasts_total{kind}` - messages fanned out
/// * `feed_send_failures_total` - sends skipped because a subscriber was closed
/// * `feed_subscribers` - connected subscribers
#[derive(Clone)]
pub struct FeedMetrics {
    primary_ticks: Counter,
    extra_ticks: Counter,
    send_failures: Counter,
    subscribers: Gauge,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            primary_ticks: counter!("feed_ticks_total", "loop" => "primary"),
            extra_ticks: counter!("feed_ticks_total", "loop" => "extra"),
            send_failures: counter!("feed_send_failures_total"),
            subscribers: gauge!("feed_subscribers"),
        }
    }

    pub fn primary_tick(&self) {
        self.primary_ticks.increment(1);
    }

    pub fn extra_tick(&self) {
        self.extra_ticks.increment(1);
    }

    pub fn broadcast(&self, kind: &'static str, delivered: usize) {
        counter!("feed_broadcasts_total", "kind" => kind).increment(1);
        counter!("feed_deliveries_total", "kind" => kind).increment(delivered as u64);
    }

    pub fn send_failed(&self) {
        self.send_failures.increment(1);
    }

    pub fn set_subscribers(&self, count: usize) {
        self.subscribers.set(count as f64);
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}
