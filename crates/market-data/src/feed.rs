//! Market feed scheduler
//!
//! [`MarketFeed`] owns the symbol store, the subscriber set and both polling
//! loops.
//!
//! * The primary loop runs while at least one subscriber is connected. It
//!   starts on the 0 -> 1 edge with an immediate tick and stops on 1 -> 0.
//! * The extra loop polls a caller-supplied id list on a longer interval. It
//!   starts and stops on explicit subscriber request and also stops when its
//!   owner disconnects or nobody is left.
//!
//! Each loop reschedules only after its tick finishes, so ticks of one loop
//! never overlap. A stopped loop may still finish an in-flight fetch; the
//! cancellation token is checked before the result is applied and again,
//! under the subscriber lock, before broadcasting.
//!
//! Lock order: `subscribers` before `primary_loop` and `store`;
//! `extra_loop` before `extra_cache`. `subscribers` is never held while
//! taking `extra_loop` or `extra_cache`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use config::{FeedConfig, FeedSettings};
use observability::FeedMetrics;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::baseline::{BaselineLoader, BaselineSource, JsonDirectorySource};
use crate::error::FeedError;
use crate::protocol::OutboundMessage;
use crate::quote_client::{
    AveragePriceField, QuoteClient, QuoteClientConfig, QuoteTransport, RateLimitStatus,
    UpstoxTransport,
};
use crate::registry::{SubscriberId, SubscriberRegistry, SubscriberSink};
use crate::state::SymbolStore;
use crate::types::{EnrichedView, LiveQuote};
use crate::Result;

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub update_interval: Duration,
    pub extra_interval: Duration,
    /// Load order and batch priority
    pub symbols: Vec<String>,
    pub default_symbol: String,
}

impl From<&FeedSettings> for FeedOptions {
    fn from(settings: &FeedSettings) -> Self {
        Self {
            update_interval: Duration::from_millis(settings.update_interval_ms),
            extra_interval: Duration::from_millis(settings.extra_interval_ms),
            symbols: settings.symbols.clone(),
            default_symbol: settings.default_symbol.clone(),
        }
    }
}

/// Budget snapshot of both quote clients
#[derive(Debug, Clone, Serialize)]
pub struct RateLimits {
    pub primary: RateLimitStatus,
    pub extra: RateLimitStatus,
}

struct ExtraLoop {
    token: CancellationToken,
    owner: Option<SubscriberId>,
    keys: Vec<String>,
}

struct Inner {
    options: FeedOptions,
    primary: QuoteClient,
    extra: QuoteClient,
    loader: BaselineLoader,
    store: Mutex<SymbolStore>,
    subscribers: Mutex<SubscriberRegistry>,
    extra_cache: Mutex<HashMap<String, LiveQuote>>,
    primary_loop: Mutex<Option<CancellationToken>>,
    extra_loop: Mutex<Option<ExtraLoop>>,
    /// Parent of every loop token
    shutdown: CancellationToken,
    metrics: FeedMetrics,
    started_at: Instant,
}

#[derive(Clone)]
pub struct MarketFeed {
    inner: Arc<Inner>,
}

impl MarketFeed {
    pub fn new(
        options: FeedOptions,
        primary: QuoteClient,
        extra: QuoteClient,
        loader: BaselineLoader,
    ) -> Self {
        let store = SymbolStore::new(&options.symbols);

        Self {
            inner: Arc::new(Inner {
                options,
                primary,
                extra,
                loader,
                store: Mutex::new(store),
                subscribers: Mutex::new(SubscriberRegistry::new()),
                extra_cache: Mutex::new(HashMap::new()),
                primary_loop: Mutex::new(None),
                extra_loop: Mutex::new(None),
                shutdown: CancellationToken::new(),
                metrics: FeedMetrics::new(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Wire up the upstream transport and the JSON directory baseline source.
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        let upstream = &config.upstream;
        let transport: Arc<dyn QuoteTransport> = Arc::new(UpstoxTransport::new(
            &upstream.base_url,
            upstream.resolved_access_token(),
            Duration::from_secs(upstream.request_timeout_seconds),
        )?);

        let primary = QuoteClient::new(
            QuoteClientConfig::from_upstream(upstream, "primary", AveragePriceField::Simple),
            Arc::clone(&transport),
        );
        let extra = QuoteClient::new(
            QuoteClientConfig::from_upstream(upstream, "extra", AveragePriceField::VwapPreferred),
            transport,
        );

        let source: Arc<dyn BaselineSource> =
            Arc::new(JsonDirectorySource::new(config.baseline.directory.clone()));
        let loader = BaselineLoader::new(
            source,
            config.baseline.fallback_snapshot.clone(),
            config.feed.default_symbol.clone(),
        );

        Ok(Self::new(
            FeedOptions::from(&config.feed),
            primary,
            extra,
            loader,
        ))
    }

    pub fn options(&self) -> &FeedOptions {
        &self.inner.options
    }

    /// Load every configured symbol. Fails only when none could be loaded.
    pub async fn load_all(&self) -> Result<usize> {
        let mut loaded = 0;
        for symbol in &self.inner.options.symbols {
            if self.load_one(symbol).await {
                loaded += 1;
            }
        }

        if loaded == 0 {
            return Err(FeedError::NoSymbolsLoaded);
        }
        info!(loaded, configured = self.inner.options.symbols.len(), "Baseline documents loaded");
        Ok(loaded)
    }

    /// Re-query the baseline for a configured symbol. The document is
    /// replaced only when the source returns one.
    pub async fn reload_symbol(&self, symbol: &str) -> bool {
        if !self.inner.options.symbols.iter().any(|s| s == symbol) {
            return false;
        }
        self.load_one(symbol).await
    }

    async fn load_one(&self, symbol: &str) -> bool {
        match self.inner.loader.load(symbol).await {
            Some(document) => {
                self.inner.store.lock().load(symbol, document);
                true
            }
            None => false,
        }
    }

    pub fn loaded_symbols(&self) -> Vec<String> {
        self.inner.store.lock().loaded_symbols()
    }

    pub fn enriched(&self, symbol: &str) -> Option<EnrichedView> {
        self.inner.store.lock().enriched(symbol)
    }

    pub fn enriched_all(&self) -> BTreeMap<String, EnrichedView> {
        self.inner.store.lock().enriched_all()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            primary: self.inner.primary.status(),
            extra: self.inner.extra.status(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    pub fn is_primary_running(&self) -> bool {
        self.inner.primary_loop.lock().is_some()
    }

    /// Ids polled by the extra loop, if it is running
    pub fn extra_keys(&self) -> Option<Vec<String>> {
        self.inner.extra_loop.lock().as_ref().map(|l| l.keys.clone())
    }

    /// Add a subscriber. It receives `initial_data` before anything else;
    /// the first subscriber starts the primary loop.
    pub fn register(&self, id: SubscriberId, sink: Box<dyn SubscriberSink>) {
        let mut subscribers = self.inner.subscribers.lock();
        let count = subscribers.register(id, sink);

        let symbols = self.inner.store.lock().enriched_all();
        if !symbols.is_empty() {
            let message = OutboundMessage::InitialData {
                symbols,
                timestamp: Utc::now(),
            };
            match message.to_json() {
                Ok(text) => {
                    if subscribers.send_to(id, text) {
                        self.inner.metrics.broadcast(message.kind(), 1);
                    } else {
                        self.inner.metrics.send_failed();
                    }
                }
                Err(e) => error!(subscriber = id, error = %e, "Failed to encode initial snapshot"),
            }
        }

        self.inner.metrics.set_subscribers(count);
        info!(subscriber = id, clients = count, "Subscriber registered");

        if count == 1 {
            self.start_primary();
        }
    }

    pub fn unregister(&self, id: SubscriberId) {
        let remaining = {
            let mut subscribers = self.inner.subscribers.lock();
            let Some(remaining) = subscribers.unregister(id) else {
                return;
            };
            if remaining == 0 {
                self.stop_primary();
            }
            remaining
        };
        self.inner.metrics.set_subscribers(remaining);
        info!(subscriber = id, clients = remaining, "Subscriber unregistered");

        let mut extra_loop = self.inner.extra_loop.lock();
        let orphaned = extra_loop
            .as_ref()
            .is_some_and(|l| l.owner == Some(id) || remaining == 0);
        if orphaned {
            if let Some(stopped) = extra_loop.take() {
                stopped.token.cancel();
                self.inner.extra_cache.lock().clear();
                info!(subscriber = id, "Extra feed stopped with its subscriber");
            }
        }
    }

    fn start_primary(&self) {
        let mut slot = self.inner.primary_loop.lock();
        if slot.is_some() || self.inner.shutdown.is_cancelled() {
            return;
        }

        let token = self.inner.shutdown.child_token();
        *slot = Some(token.clone());
        tokio::spawn(run_primary(Arc::clone(&self.inner), token));
        info!(
            interval_ms = self.inner.options.update_interval.as_millis() as u64,
            "Market feed started"
        );
    }

    fn stop_primary(&self) {
        if let Some(token) = self.inner.primary_loop.lock().take() {
            token.cancel();
            info!("Market feed stopped, no subscribers");
        }
    }

    /// Start or replace the extra loop. Empty ids are dropped and the rest
    /// deduplicated; an empty list starts nothing and returns 0.
    pub fn start_extra(&self, owner: Option<SubscriberId>, ids: Vec<String>) -> usize {
        let mut seen = HashSet::new();
        let keys: Vec<String> = ids
            .into_iter()
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        if keys.is_empty() || self.inner.shutdown.is_cancelled() {
            return 0;
        }

        let mut slot = self.inner.extra_loop.lock();
        if let Some(previous) = slot.take() {
            previous.token.cancel();
        }
        self.inner.extra_cache.lock().clear();

        let token = self.inner.shutdown.child_token();
        tokio::spawn(run_extra(Arc::clone(&self.inner), token.clone(), keys.clone()));

        let count = keys.len();
        *slot = Some(ExtraLoop { token, owner, keys });
        info!(
            count,
            owner = ?owner,
            interval_ms = self.inner.options.extra_interval.as_millis() as u64,
            "Extra feed started"
        );
        count
    }

    /// Stop the extra loop and clear its cache. Returns whether it was running.
    pub fn stop_extra(&self) -> bool {
        let mut slot = self.inner.extra_loop.lock();
        let stopped = slot.take().map(|l| l.token.cancel()).is_some();
        self.inner.extra_cache.lock().clear();
        if stopped {
            info!("Extra feed stopped");
        }
        stopped
    }

    /// Stop both loops for good. Later registrations no longer start polling.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.primary_loop.lock().take();
        self.inner.extra_loop.lock().take();
        self.inner.extra_cache.lock().clear();
        info!("Market feed shut down");
    }
}

async fn run_primary(inner: Arc<Inner>, token: CancellationToken) {
    loop {
        inner.primary_tick(&token).await;

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(inner.options.update_interval) => {}
        }
    }
    debug!("Primary loop exited");
}

async fn run_extra(inner: Arc<Inner>, token: CancellationToken, keys: Vec<String>) {
    loop {
        inner.extra_tick(&token, &keys).await;

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(inner.options.extra_interval) => {}
        }
    }
    debug!("Extra loop exited");
}

impl Inner {
    async fn primary_tick(&self, token: &CancellationToken) {
        let plan = self.store.lock().fetch_plan();

        // Symbols without instrument ids still get a snapshot every tick.
        let quotes = self.primary.fetch(&plan.keys).await;
        if token.is_cancelled() {
            return;
        }

        let symbols = {
            let mut store = self.store.lock();
            let written = store.apply_quotes(&plan, &quotes);
            debug!(requested = plan.keys.len(), received = quotes.len(), written, "Primary tick");
            store.enriched_all()
        };
        self.metrics.primary_tick();
        if symbols.is_empty() {
            return;
        }

        self.broadcast(
            &OutboundMessage::MarketData {
                symbols,
                timestamp: Utc::now(),
            },
            token,
        );
    }

    async fn extra_tick(&self, token: &CancellationToken, keys: &[String]) {
        let quotes = self.extra.fetch(keys).await;

        let data: BTreeMap<String, LiveQuote> = {
            let mut cache = self.extra_cache.lock();
            if token.is_cancelled() {
                return;
            }
            cache.extend(quotes);
            cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        self.metrics.extra_tick();
        debug!(requested = keys.len(), cached = data.len(), "Extra tick");

        self.broadcast(
            &OutboundMessage::ExtraLtpUpdate {
                data,
                timestamp: Utc::now(),
            },
            token,
        );
    }

    fn broadcast(&self, message: &OutboundMessage, token: &CancellationToken) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(kind = message.kind(), error = %e, "Failed to encode broadcast");
                return;
            }
        };

        let subscribers = self.subscribers.lock();
        if token.is_cancelled() || subscribers.is_empty() {
            return;
        }

        let delivery = subscribers.broadcast(&text);
        self.metrics.broadcast(message.kind(), delivery.delivered);
        for _ in 0..delivery.skipped {
            self.metrics.send_failed();
        }
        debug!(
            kind = message.kind(),
            delivered = delivery.delivered,
            skipped = delivery.skipped,
            "Broadcast sent"
        );
    }
}
