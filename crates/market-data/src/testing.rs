//! Scripted collaborators for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::baseline::{BaselineLoader, BaselineSource, StaticBaselineSource};
use crate::feed::{FeedOptions, MarketFeed};
use crate::quote_client::{
    AveragePriceField, QuoteClient, QuoteClientConfig, QuoteTransport, TransportResponse,
};
use crate::registry::SubscriberSink;
use crate::types::SymbolDocument;
use crate::Result;

/// Answers from a queue, then with a fixed fallback. Records every request.
pub struct ScriptedTransport {
    configured: bool,
    yield_first: bool,
    delay: Option<Duration>,
    fallback: TransportResponse,
    queue: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn always(status: u16, body: String) -> Self {
        Self {
            configured: true,
            yield_first: false,
            delay: None,
            fallback: TransportResponse { status, body },
            queue: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::always(500, String::new())
        }
    }

    /// Yield once before answering so concurrent callers interleave.
    pub fn yielding(mut self) -> Self {
        self.yield_first = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue(&self, status: u16, body: String) {
        self.queue.lock().push_back(TransportResponse { status, body });
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl QuoteTransport for ScriptedTransport {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn get_quotes(&self, keys: &[String]) -> Result<TransportResponse> {
        self.requests.lock().push(keys.to_vec());
        if self.yield_first {
            tokio::task::yield_now().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// `(instrument_token, last_price, average_price)` triples as an upstream body
pub fn quote_body(quotes: &[(&str, f64, Option<f64>)]) -> String {
    let data: serde_json::Map<String, Value> = quotes
        .iter()
        .map(|(token, ltp, avg)| {
            (
                format!("REQ:{token}"),
                json!({ "last_price": ltp, "average_price": avg, "instrument_token": token }),
            )
        })
        .collect();
    json!({ "status": "success", "data": data }).to_string()
}

/// Captures frames; can be closed to simulate a dead connection.
#[derive(Clone, Default)]
pub struct RecordingSink {
    texts: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.texts()
            .iter()
            .filter_map(|t| serde_json::from_str(t).ok())
            .collect()
    }

    pub fn last_of(&self, kind: &str) -> Option<Value> {
        self.messages().into_iter().rev().find(|m| m["type"] == kind)
    }
}

impl SubscriberSink for RecordingSink {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn send_text(&self, text: String) -> bool {
        self.texts.lock().push(text);
        true
    }
}

/// NIFTY with index `IDX`, future `FUT`, call BASE `X` (CP 100) and put BASE `P` (CP 80)
pub fn nifty_document() -> SymbolDocument {
    serde_json::from_value(json!({
        "symbol": "NIFTY",
        "expiry_date": "2024-12-26",
        "instrument_key": "IDX",
        "future_instrument_key": "FUT",
        "cash_data": { "CP": 24000.0 },
        "future_data": { "CP": 24050.0 },
        "ce_summary": { "BASE": { "instrument_key": "X", "PRICE": 24000, "CP": 100.0 } },
        "pe_summary": { "BASE": { "instrument_key": "P", "PRICE": 24000, "CP": 80.0 } }
    }))
    .unwrap_or_else(|e| panic!("fixture document: {e}"))
}

pub fn options() -> FeedOptions {
    FeedOptions {
        update_interval: Duration::from_millis(3000),
        extra_interval: Duration::from_millis(10_000),
        symbols: vec!["NIFTY".to_string(), "BANKNIFTY".to_string()],
        default_symbol: "NIFTY".to_string(),
    }
}

fn client(name: &str, transport: Arc<dyn QuoteTransport>, field: AveragePriceField) -> QuoteClient {
    QuoteClient::new(
        QuoteClientConfig {
            name: name.to_string(),
            max_keys_per_request: 500,
            max_requests_per_minute: 100,
            max_requests_per_30min: 1000,
            backoff_start: Duration::from_millis(60_000),
            backoff_max: Duration::from_millis(300_000),
            average_field: field,
        },
        transport,
    )
}

pub fn feed_with_source(
    primary: Arc<ScriptedTransport>,
    extra: Arc<ScriptedTransport>,
    source: Arc<dyn BaselineSource>,
) -> MarketFeed {
    MarketFeed::new(
        options(),
        client("primary", primary, AveragePriceField::Simple),
        client("extra", extra, AveragePriceField::VwapPreferred),
        BaselineLoader::new(source, None, "NIFTY"),
    )
}

pub fn feed_with(
    primary: Arc<ScriptedTransport>,
    extra: Arc<ScriptedTransport>,
    source: StaticBaselineSource,
) -> MarketFeed {
    feed_with_source(primary, extra, Arc::new(source))
}
