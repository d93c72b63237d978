//! Rate-limited upstream quote client
//!
//! One [`QuoteClient`] per feed. Each instance owns its own request budget
//! (a 1 minute and a 30 minute window) and its own backoff state, so the
//! primary and the extra feed never throttle each other locally.
//!
//! [`QuoteClient::fetch`] never fails. Anything that prevents a usable answer
//! is logged and reported as an empty map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use observability::{QuoteMetrics, SkipReason};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::types::LiveQuote;
use crate::Result;

const ONE_MINUTE: Duration = Duration::from_secs(60);
const THIRTY_MINUTES: Duration = Duration::from_secs(30 * 60);

/// Raw upstream answer
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network side of a quote client
#[async_trait]
pub trait QuoteTransport: Send + Sync {
    /// Whether a credential is available. Unconfigured transports are never called.
    fn is_configured(&self) -> bool;

    async fn get_quotes(&self, keys: &[String]) -> Result<TransportResponse>;
}

/// `GET {base}/market-quote/quotes?instrument_key=a,b,c` with a bearer token
pub struct UpstoxTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl UpstoxTransport {
    pub fn new(base_url: &str, access_token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::UpstreamUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.map(str::to_string),
        })
    }
}

#[async_trait]
impl QuoteTransport for UpstoxTransport {
    fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    async fn get_quotes(&self, keys: &[String]) -> Result<TransportResponse> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(FeedError::ConfigurationMissing)?;

        let response = self
            .client
            .get(format!("{}/market-quote/quotes", self.base_url))
            .query(&[("instrument_key", keys.join(","))])
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FeedError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FeedError::UpstreamUnavailable(e.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

/// Where the average price of a quote is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragePriceField {
    /// `average_price`
    Simple,
    /// `ohlc.vwap`, falling back to `average_price`
    VwapPreferred,
}

#[derive(Debug, Clone)]
pub struct QuoteClientConfig {
    pub name: String,
    pub max_keys_per_request: usize,
    pub max_requests_per_minute: u32,
    pub max_requests_per_30min: u32,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
    pub average_field: AveragePriceField,
}

impl QuoteClientConfig {
    pub fn from_upstream(
        upstream: &config::UpstreamConfig,
        name: &str,
        average_field: AveragePriceField,
    ) -> Self {
        Self {
            name: name.to_string(),
            max_keys_per_request: upstream.max_keys_per_request,
            max_requests_per_minute: upstream.max_requests_per_minute,
            max_requests_per_30min: upstream.max_requests_per_30min,
            backoff_start: Duration::from_millis(upstream.backoff_start_ms),
            backoff_max: Duration::from_millis(upstream.backoff_max_ms),
            average_field,
        }
    }
}

#[derive(Debug)]
struct Window {
    length: Duration,
    limit: u32,
    started: Instant,
    count: u32,
    /// Requests that passed the check and have not answered yet
    pending: u32,
}

impl Window {
    fn new(length: Duration, limit: u32, now: Instant) -> Self {
        Self {
            length,
            limit,
            started: now,
            count: 0,
            pending: 0,
        }
    }

    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.started) >= self.length {
            self.started = now;
            self.count = 0;
        }
    }

    fn is_full(&self) -> bool {
        self.count + self.pending >= self.limit
    }
}

#[derive(Debug)]
struct RateBudget {
    minute: Window,
    thirty_min: Window,
}

impl RateBudget {
    fn new(per_minute: u32, per_30min: u32, now: Instant) -> Self {
        Self {
            minute: Window::new(ONE_MINUTE, per_minute, now),
            thirty_min: Window::new(THIRTY_MINUTES, per_30min, now),
        }
    }

    fn roll(&mut self, now: Instant) {
        self.minute.roll(now);
        self.thirty_min.roll(now);
    }

    fn exhausted(&self) -> Option<SkipReason> {
        if self.minute.is_full() {
            Some(SkipReason::MinuteBudget)
        } else if self.thirty_min.is_full() {
            Some(SkipReason::ThirtyMinuteBudget)
        } else {
            None
        }
    }

    fn reserve(&mut self) {
        self.minute.pending += 1;
        self.thirty_min.pending += 1;
    }

    fn settle(&mut self, counted: bool) {
        self.minute.pending = self.minute.pending.saturating_sub(1);
        self.thirty_min.pending = self.thirty_min.pending.saturating_sub(1);
        if counted {
            self.minute.count += 1;
            self.thirty_min.count += 1;
        }
    }
}

/// A slot taken from the budget for one network call. Dropping it without
/// [`Reservation::commit`] gives the slot back.
struct Reservation<'a> {
    budget: &'a Mutex<RateBudget>,
    counted: bool,
}

impl Reservation<'_> {
    fn commit(&mut self) {
        self.counted = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.budget.lock().settle(self.counted);
    }
}

#[derive(Debug, Default)]
struct BackoffState {
    active: bool,
    delay: Duration,
    /// Bumped on every activation; only the newest timer may clear the state
    generation: u64,
}

/// Budget and backoff snapshot for the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub minute_count: u32,
    pub minute_limit: u32,
    pub thirty_min_count: u32,
    pub thirty_min_limit: u32,
    pub is_backing_off: bool,
    pub backoff_ms: u64,
}

pub struct QuoteClient {
    config: QuoteClientConfig,
    transport: Arc<dyn QuoteTransport>,
    budget: Mutex<RateBudget>,
    backoff: Arc<Mutex<BackoffState>>,
    metrics: QuoteMetrics,
}

impl QuoteClient {
    pub fn new(config: QuoteClientConfig, transport: Arc<dyn QuoteTransport>) -> Self {
        let budget = RateBudget::new(
            config.max_requests_per_minute,
            config.max_requests_per_30min,
            Instant::now(),
        );
        let metrics = QuoteMetrics::new(&config.name);

        Self {
            config,
            transport,
            budget: Mutex::new(budget),
            backoff: Arc::new(Mutex::new(BackoffState::default())),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Fetch live quotes for `ids`, keyed by the upstream canonical id.
    ///
    /// At most `max_keys_per_request` ids are sent; the rest are dropped for
    /// this call.
    pub async fn fetch(&self, ids: &[String]) -> HashMap<String, LiveQuote> {
        if ids.is_empty() {
            return HashMap::new();
        }

        if !self.transport.is_configured() {
            warn!(client = %self.config.name, "{}", FeedError::ConfigurationMissing);
            self.metrics.record_skip(SkipReason::NoCredential);
            return HashMap::new();
        }

        let Some(mut reservation) = self.try_reserve() else {
            return HashMap::new();
        };

        let batch = &ids[..ids.len().min(self.config.max_keys_per_request)];
        if batch.len() < ids.len() {
            warn!(
                client = %self.config.name,
                requested = ids.len(),
                sent = batch.len(),
                "Batch ceiling reached, trailing instruments skipped this round"
            );
        }

        let started = std::time::Instant::now();
        let response = match self.transport.get_quotes(batch).await {
            Ok(response) => response,
            Err(e) => {
                warn!(client = %self.config.name, error = %e, "Quote request failed");
                self.metrics.record_failure();
                return HashMap::new();
            }
        };

        if response.status == 429 {
            let delay = self.activate_backoff();
            let err = FeedError::UpstreamThrottled {
                backoff_ms: delay.as_millis() as u64,
            };
            warn!(client = %self.config.name, delay_ms = delay.as_millis() as u64, "{}", err);
            self.metrics.record_throttled(delay);
            return HashMap::new();
        }

        if !response.is_success() {
            let err = FeedError::UpstreamUnavailable(format!("HTTP {}", response.status));
            warn!(client = %self.config.name, status = response.status, "{}", err);
            self.metrics.record_failure();
            return HashMap::new();
        }

        reservation.commit();
        drop(reservation);

        match parse_quotes(&response.body, self.config.average_field) {
            Ok(quotes) => {
                debug!(
                    client = %self.config.name,
                    requested = batch.len(),
                    received = quotes.len(),
                    "Quotes received"
                );
                self.metrics.record_success(started.elapsed(), quotes.len());
                quotes
            }
            Err(e) => {
                warn!(client = %self.config.name, error = %e, "Unusable quote response");
                self.metrics.record_failure();
                HashMap::new()
            }
        }
    }

    /// Check order: windows first, then backoff.
    fn try_reserve(&self) -> Option<Reservation<'_>> {
        let mut budget = self.budget.lock();
        budget.roll(Instant::now());

        let refusal = budget.exhausted().or_else(|| {
            self.backoff
                .lock()
                .active
                .then_some(SkipReason::BackingOff)
        });

        if let Some(reason) = refusal {
            debug!(client = %self.config.name, reason = reason.as_str(), "Quote request skipped");
            self.metrics.record_skip(reason);
            return None;
        }

        budget.reserve();
        Some(Reservation {
            budget: &self.budget,
            counted: false,
        })
    }

    /// Start or extend backoff and arm the timer that clears it.
    fn activate_backoff(&self) -> Duration {
        let (delay, generation) = {
            let mut state = self.backoff.lock();
            state.delay = if state.active {
                (state.delay * 2).min(self.config.backoff_max)
            } else {
                self.config.backoff_start
            };
            state.active = true;
            state.generation += 1;
            (state.delay, state.generation)
        };

        let backoff = Arc::clone(&self.backoff);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = backoff.lock();
            if state.generation == generation {
                state.active = false;
                state.delay = Duration::ZERO;
                metrics.backoff_cleared();
                info!(client = %metrics.client(), "Backoff cleared");
            }
        });

        delay
    }

    pub fn status(&self) -> RateLimitStatus {
        let (minute_count, thirty_min_count, minute_limit, thirty_min_limit) = {
            let mut budget = self.budget.lock();
            budget.roll(Instant::now());
            (
                budget.minute.count,
                budget.thirty_min.count,
                budget.minute.limit,
                budget.thirty_min.limit,
            )
        };
        let backoff = self.backoff.lock();

        RateLimitStatus {
            minute_count,
            minute_limit,
            thirty_min_count,
            thirty_min_limit,
            is_backing_off: backoff.active,
            backoff_ms: backoff.delay.as_millis() as u64,
        }
    }
}

fn number(value: &Value, field: &str) -> Option<f64> {
    value.get(field).and_then(Value::as_f64)
}

fn parse_entry(entry: &Value, average_field: AveragePriceField) -> Option<LiveQuote> {
    let instrument_id = entry
        .get("instrument_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())?;

    let last_price = number(entry, "last_price")
        .filter(|p| *p != 0.0)
        .or_else(|| number(entry, "ltp"))?;

    let simple = || number(entry, "average_price").filter(|p| *p != 0.0);
    let average_price = match average_field {
        AveragePriceField::Simple => simple(),
        AveragePriceField::VwapPreferred => entry
            .get("ohlc")
            .and_then(|ohlc| number(ohlc, "vwap"))
            .filter(|p| *p != 0.0)
            .or_else(simple),
    };

    Some(LiveQuote {
        instrument_id: instrument_id.to_string(),
        last_price,
        average_price,
    })
}

/// Parse a quote response body into quotes keyed by `instrument_token`.
///
/// The request key the upstream echoes back is ignored.
pub fn parse_quotes(body: &str, average_field: AveragePriceField) -> Result<HashMap<String, LiveQuote>> {
    let payload: Value = serde_json::from_str(body)?;

    let status = payload.get("status").and_then(Value::as_str);
    if status != Some("success") {
        return Err(FeedError::UpstreamUnavailable(format!(
            "response status {}",
            status.unwrap_or("missing")
        )));
    }

    let Some(data) = payload.get("data").and_then(Value::as_object) else {
        return Ok(HashMap::new());
    };

    Ok(data
        .values()
        .filter_map(|entry| parse_entry(entry, average_field))
        .map(|quote| (quote.instrument_id.clone(), quote))
        .collect())
}
