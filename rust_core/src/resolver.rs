//! Live Price Resolver
//!
//! Produces one best price per symbol from three sources, in strict priority:
//!
//! 1. a streaming tick observed within the freshness window
//! 2. the last streaming tick seen, for symbols the venue trades
//! 3. a snapshot price from the internal index API
//!
//! Values are never blended. All state lives behind one lock so every handler
//! (tick, snapshot batch, connection change) is a single atomic transition.

use crate::clients::source::{SnapshotPriceSource, TradableSymbolSource};
use crate::error::PriceFeedResult;
use crate::models::{PriceData, PriceObservation, PriceSource, SnapshotRecord};
use crate::symbols;
use crate::utils::format;
use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Streaming quotes older than this are no longer live
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub staleness_window: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            staleness_window: DEFAULT_STALENESS_WINDOW,
        }
    }
}

/// Outcome of one snapshot fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFetch {
    /// Every requested symbol was already fetched or in flight; no request made
    Skipped,
    /// Request succeeded; number of records that carried a usable price
    Applied(usize),
    /// Request failed; attempted symbols are marked fetched regardless
    Failed,
}

#[derive(Debug, Default)]
struct ResolverState {
    hydrated: bool,
    connected: bool,
    /// Fresh tier, keyed by uppercase venue symbol
    streaming: FxHashMap<String, PriceObservation>,
    /// Last price seen on the stream, survives disconnects
    last_known: FxHashMap<String, PriceObservation>,
    /// Snapshot prices under every spelling they were stored with
    snapshot_prices: FxHashMap<String, f64>,
    snapshot_timestamps: FxHashMap<String, i64>,
    tradable: FxHashSet<String>,
    /// Uppercase symbols a snapshot fetch has completed for (success or not)
    fetched: FxHashSet<String>,
    /// Uppercase symbols with a snapshot request outstanding
    in_flight: FxHashSet<String>,
}

impl ResolverState {
    fn is_tradable(&self, symbol: &str) -> bool {
        self.tradable.contains(&symbols::key(symbol)) || self.tradable.contains(&symbols::pair_key(symbol))
    }

    fn store_snapshot(&mut self, record: &SnapshotRecord) -> bool {
        let (Some(raw_symbol), Some(price)) = (record.symbol.as_deref(), record.end_timestamp_price) else {
            return false;
        };
        let Some(as_returned) = symbols::clean(raw_symbol) else {
            return false;
        };
        let upper = symbols::key(as_returned);

        for k in [upper.clone(), as_returned.to_string()] {
            self.snapshot_prices.insert(k.clone(), price);
            if let Some(ts) = record.end_timestamp {
                self.snapshot_timestamps.insert(k, ts);
            }
        }
        self.fetched.insert(upper);
        true
    }
}

#[derive(Debug, Default)]
struct Counters {
    ticks_applied: AtomicU64,
    malformed_ticks: AtomicU64,
    snapshot_batches: AtomicU64,
    snapshot_failures: AtomicU64,
    connections_opened: AtomicU64,
}

/// Point-in-time view of the resolver counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolverStats {
    pub ticks_applied: u64,
    pub malformed_ticks: u64,
    pub snapshot_batches: u64,
    pub snapshot_failures: u64,
    pub connections_opened: u64,
}

pub struct LivePriceResolver {
    config: ResolverConfig,
    state: RwLock<ResolverState>,
    counters: Counters,
}

impl Default for LivePriceResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl LivePriceResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ResolverState::default()),
            counters: Counters::default(),
        }
    }

    fn staleness_ms(&self) -> i64 {
        self.config.staleness_window.as_millis() as i64
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Allow queries to return data. Until this is called every lookup
    /// answers "no data".
    pub fn mark_hydrated(&self) {
        self.state.write().hydrated = true;
    }

    pub fn is_hydrated(&self) -> bool {
        self.state.read().hydrated
    }

    /// Back to the freshly constructed state: maps, ledger and tradable set
    /// emptied, not hydrated.
    pub fn reset(&self) {
        *self.state.write() = ResolverState::default();
    }

    // ------------------------------------------------------------------
    // Tradable symbols
    // ------------------------------------------------------------------

    pub fn set_tradable_symbols<I, S>(&self, tradable: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: FxHashSet<String> = tradable
            .into_iter()
            .filter_map(|s| symbols::clean(s.as_ref()).map(symbols::key))
            .collect();
        self.state.write().tradable = set;
    }

    /// True when the venue trades `symbol` as given or as a USDT pair
    pub fn is_tradable(&self, symbol: &str) -> bool {
        self.state.read().is_tradable(symbol)
    }

    pub fn tradable_count(&self) -> usize {
        self.state.read().tradable.len()
    }

    /// Load the tradable set from the venue. Failure leaves whatever set was
    /// there before (empty on first load) and is only logged.
    pub async fn fetch_tradable_symbols(&self, source: &dyn TradableSymbolSource) {
        match source.fetch_tradable_symbols().await {
            Ok(list) => {
                info!("{} lists {} tradable symbols", source.provider_name(), list.len());
                self.set_tradable_symbols(list);
            }
            Err(e) => {
                warn!(
                    "Could not load tradable symbols from {}: {} (status: {:?})",
                    source.provider_name(),
                    e,
                    source.status()
                );
            }
        }
    }

    /// Venue pairs to subscribe for `requested`. Pair form (BTCUSDT) is
    /// preferred over the bare symbol when both are listed.
    pub fn streamable_pairs<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let state = self.state.read();
        let mut seen = FxHashSet::default();
        let mut pairs = Vec::new();

        for symbol in symbols::dedupe(requested) {
            let pair = symbols::pair_key(&symbol);
            let bare = symbols::key(&symbol);
            let chosen = if state.tradable.contains(&pair) {
                pair
            } else if state.tradable.contains(&bare) {
                bare
            } else {
                continue;
            };
            if seen.insert(chosen.clone()) {
                pairs.push(chosen);
            }
        }

        pairs
    }

    // ------------------------------------------------------------------
    // Snapshot tier
    // ------------------------------------------------------------------

    /// Symbols from `requested` that still need a snapshot fetch
    pub fn pending_snapshot_symbols<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let state = self.state.read();
        symbols::dedupe(requested)
            .into_iter()
            .filter(|s| {
                let k = symbols::key(s);
                !state.fetched.contains(&k) && !state.in_flight.contains(&k)
            })
            .collect()
    }

    pub fn is_fetched(&self, symbol: &str) -> bool {
        self.state.read().fetched.contains(&symbols::key(symbol))
    }

    /// Reserve the pending subset of `requested` as in flight, atomically,
    /// so overlapping triggers never request the same symbol twice.
    fn claim_snapshot_batch<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let mut state = self.state.write();
        let mut batch = Vec::new();
        for symbol in symbols::dedupe(requested) {
            let k = symbols::key(&symbol);
            if state.fetched.contains(&k) || state.in_flight.contains(&k) {
                continue;
            }
            state.in_flight.insert(k);
            batch.push(symbol);
        }
        batch
    }

    /// Apply the result of one snapshot request as a single state update.
    /// Every attempted symbol ends up in the ledger whatever the outcome.
    pub fn apply_snapshot_result(
        &self,
        attempted: &[String],
        result: PriceFeedResult<Vec<SnapshotRecord>>,
    ) -> SnapshotFetch {
        let mut state = self.state.write();

        let outcome = match result {
            Ok(records) => {
                let stored = records.iter().filter(|r| state.store_snapshot(r)).count();
                SnapshotFetch::Applied(stored)
            }
            Err(e) => {
                warn!(
                    "Snapshot fetch failed for {} symbols, marking them fetched: {}",
                    attempted.len(),
                    e
                );
                self.counters.snapshot_failures.fetch_add(1, Ordering::Relaxed);
                SnapshotFetch::Failed
            }
        };

        for symbol in attempted {
            let k = symbols::key(symbol);
            state.in_flight.remove(&k);
            state.fetched.insert(k);
        }

        outcome
    }

    /// Fetch snapshot prices for requested symbols not yet in the ledger.
    /// Issues at most one request; no request at all when nothing is pending.
    pub async fn fetch_snapshot_prices<S: AsRef<str>>(
        &self,
        requested: &[S],
        source: &dyn SnapshotPriceSource,
    ) -> SnapshotFetch {
        let batch = self.claim_snapshot_batch(requested);
        if batch.is_empty() {
            return SnapshotFetch::Skipped;
        }

        self.counters.snapshot_batches.fetch_add(1, Ordering::Relaxed);
        debug!("Requesting snapshot prices from {} for {:?}", source.provider_name(), batch);

        let result = source.fetch_snapshot_prices(&batch).await;
        let outcome = self.apply_snapshot_result(&batch, result);

        if let SnapshotFetch::Applied(stored) = outcome {
            debug!("Stored {} of {} snapshot prices", stored, batch.len());
        }
        outcome
    }

    /// Handler for a change in the requested symbol list
    pub async fn on_snapshot_symbols_changed<S: AsRef<str>>(
        &self,
        requested: &[S],
        source: &dyn SnapshotPriceSource,
    ) -> SnapshotFetch {
        self.fetch_snapshot_prices(requested, source).await
    }

    // ------------------------------------------------------------------
    // Streaming tier
    // ------------------------------------------------------------------

    pub fn on_connection_opened(&self) {
        self.state.write().connected = true;
        self.counters.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Record a tick received now
    pub fn on_tick(&self, symbol: &str, price: f64) {
        self.on_tick_at(symbol, price, Utc::now().timestamp_millis());
    }

    /// Record a tick observed at `observed_at_ms`. The latest call wins
    /// regardless of the venue's own event time.
    pub fn on_tick_at(&self, symbol: &str, price: f64, observed_at_ms: i64) {
        let Some(symbol) = symbols::clean(symbol) else {
            self.on_malformed_tick();
            return;
        };
        if !price.is_finite() {
            self.on_malformed_tick();
            return;
        }

        let k = symbols::key(symbol);
        let live = PriceObservation::new(k.clone(), price, observed_at_ms, PriceSource::Streaming);
        let cached = PriceObservation {
            source: PriceSource::StreamingCached,
            ..live.clone()
        };

        {
            let mut state = self.state.write();
            state.streaming.insert(k.clone(), live);
            state.last_known.insert(k, cached);
        }
        self.counters.ticks_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// A message arrived without a usable symbol or price
    pub fn on_malformed_tick(&self) {
        let count = self.counters.malformed_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 100 == 1 {
            debug!("Dropped malformed ticker message (total: {})", count);
        }
    }

    /// The stream ended. Fresh quotes are demoted; last-known and snapshot
    /// tiers keep serving.
    pub fn on_connection_closed(&self) {
        let mut state = self.state.write();
        state.connected = false;
        state.streaming.clear();
    }

    pub fn on_connection_error(&self, error: &dyn Display) {
        warn!("Ticker stream error, falling back to cached prices: {}", error);
        self.on_connection_closed();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn resolve_price(&self, symbol: &str) -> PriceData {
        self.resolve_price_at(symbol, Utc::now().timestamp_millis())
    }

    pub fn resolve_price_at(&self, symbol: &str, now_ms: i64) -> PriceData {
        let state = self.state.read();
        if !state.hydrated {
            return PriceData::none();
        }
        let Some(symbol) = symbols::clean(symbol) else {
            return PriceData::none();
        };

        let stream_keys = [symbols::key(symbol), symbols::pair_key(symbol)];
        let staleness_ms = self.staleness_ms();

        // 1. fresh streaming quote
        for k in &stream_keys {
            if let Some(obs) = state.streaming.get(k) {
                if obs.age_ms(now_ms) <= staleness_ms {
                    return PriceData::live(obs.price);
                }
            }
        }

        // 2. last streaming quote, only for symbols that should be live
        if state.is_tradable(symbol) {
            if let Some(obs) = stream_keys.iter().find_map(|k| state.last_known.get(k)) {
                return PriceData::cached(obs.price);
            }
        }

        // 3. snapshot floor
        for k in symbols::case_variants(symbol) {
            if let Some(price) = state.snapshot_prices.get(&k) {
                return PriceData::snapshot(*price);
            }
        }

        PriceData::none()
    }

    pub fn get_price_data(&self, symbol: &str) -> PriceData {
        self.resolve_price(symbol)
    }

    /// Display string, `-` when there is no price
    pub fn format_price(&self, symbol: &str) -> String {
        format::format_price(self.resolve_price(symbol).price)
    }

    pub fn is_symbol_live(&self, symbol: &str) -> bool {
        let data = self.resolve_price(symbol);
        data.is_live && !data.is_stale
    }

    pub fn get_price_source(&self, symbol: &str) -> Option<&'static str> {
        self.resolve_price(symbol).source.map(|s| s.as_str())
    }

    /// Snapshot timestamp (epoch ms) recorded for `symbol`, if any
    pub fn get_price_timestamp(&self, symbol: &str) -> Option<i64> {
        let state = self.state.read();
        if !state.hydrated {
            return None;
        }
        let symbol = symbols::clean(symbol)?;
        symbols::case_variants(symbol)
            .iter()
            .find_map(|k| state.snapshot_timestamps.get(k).copied())
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            ticks_applied: self.counters.ticks_applied.load(Ordering::Relaxed),
            malformed_ticks: self.counters.malformed_ticks.load(Ordering::Relaxed),
            snapshot_batches: self.counters.snapshot_batches.load(Ordering::Relaxed),
            snapshot_failures: self.counters.snapshot_failures.load(Ordering::Relaxed),
            connections_opened: self.counters.connections_opened.load(Ordering::Relaxed),
        }
    }
}
