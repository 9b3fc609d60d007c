//! Price Session
//!
//! Owns one `LivePriceResolver` together with the background work that feeds
//! it: the tradable-symbol listing, the snapshot batch, a delayed ticker
//! stream connection and its reconnect supervisor. Everything is tied to one
//! cancellation token; `dispose()` (or dropping the session) tears it down.

use crate::clients::binance_stream::{self, StreamEnd, DEFAULT_STREAM_URL};
use crate::clients::source::{SnapshotPriceSource, TradableSymbolSource};
use crate::reconnect::{ReconnectConfig, ReconnectStats};
use crate::resolver::{LivePriceResolver, ResolverConfig, SnapshotFetch};
use crate::symbols;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wait before the first stream connect so snapshot prices can land first
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub stream_url: String,
    pub connect_delay: Duration,
    pub reconnect: ReconnectConfig,
    pub resolver: ResolverConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            connect_delay: DEFAULT_CONNECT_DELAY,
            reconnect: ReconnectConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

/// The single open (or reconnecting) ticker stream
struct StreamHandle {
    pairs: Vec<String>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct PriceSession {
    resolver: Arc<LivePriceResolver>,
    tradable_source: Arc<dyn TradableSymbolSource>,
    snapshot_source: Arc<dyn SnapshotPriceSource>,
    config: SessionConfig,
    symbols: RwLock<Vec<String>>,
    cancel: CancellationToken,
    stream: Mutex<Option<StreamHandle>>,
    startup: parking_lot::Mutex<Option<JoinHandle<()>>>,
    reconnect_stats: Arc<ReconnectStats>,
}

impl PriceSession {
    /// Build the session, mark the resolver hydrated and kick off the
    /// initial fetches. Must be called inside a Tokio runtime.
    pub fn start<S: AsRef<str>>(
        config: SessionConfig,
        symbols: &[S],
        tradable_source: Arc<dyn TradableSymbolSource>,
        snapshot_source: Arc<dyn SnapshotPriceSource>,
    ) -> Arc<Self> {
        let resolver = Arc::new(LivePriceResolver::new(config.resolver.clone()));
        let requested = symbols::dedupe(symbols);

        let session = Arc::new(Self {
            resolver,
            tradable_source,
            snapshot_source,
            config,
            symbols: RwLock::new(requested),
            cancel: CancellationToken::new(),
            stream: Mutex::new(None),
            startup: parking_lot::Mutex::new(None),
            reconnect_stats: Arc::new(ReconnectStats::default()),
        });

        session.resolver.mark_hydrated();
        let handle = tokio::spawn(Self::run_startup(Arc::downgrade(&session), session.startup_parts()));
        *session.startup.lock() = Some(handle);

        info!(
            "Price session started for {} symbols",
            session.symbols.read().len()
        );
        session
    }

    fn startup_parts(&self) -> StartupParts {
        StartupParts {
            resolver: self.resolver.clone(),
            tradable_source: self.tradable_source.clone(),
            snapshot_source: self.snapshot_source.clone(),
            symbols: self.symbols.read().clone(),
            cancel: self.cancel.clone(),
            connect_delay: self.config.connect_delay,
        }
    }

    /// Snapshot fetch runs alongside tradable fetch -> delay -> connect.
    /// Holds only a weak reference so dropping the session still cancels.
    async fn run_startup(session: Weak<Self>, parts: StartupParts) {
        let StartupParts {
            resolver,
            tradable_source,
            snapshot_source,
            symbols,
            cancel,
            connect_delay,
        } = parts;

        let snapshot = resolver.fetch_snapshot_prices(&symbols[..], snapshot_source.as_ref());
        let stream = async {
            resolver.fetch_tradable_symbols(tradable_source.as_ref()).await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(connect_delay) => {}
            }
            if let Some(session) = session.upgrade() {
                session.connect_streaming().await;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => debug!("Session startup cancelled"),
            (outcome, _) = async { tokio::join!(snapshot, stream) } => {
                debug!("Session startup finished (snapshot: {:?})", outcome);
            }
        }
    }

    pub fn resolver(&self) -> &Arc<LivePriceResolver> {
        &self.resolver
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.read().clone()
    }

    pub fn reconnect_stats(&self) -> &ReconnectStats {
        &self.reconnect_stats
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Venue pairs of the stream currently open or reconnecting, if any
    pub async fn streaming_pairs(&self) -> Option<Vec<String>> {
        let guard = self.stream.lock().await;
        guard
            .as_ref()
            .filter(|h| !h.task.is_finished())
            .map(|h| h.pairs.clone())
    }

    /// Open the ticker stream for every requested symbol the venue trades.
    ///
    /// No-op when nothing matches or an identical stream is already running.
    /// A stream for a different pair set is closed first. Returns true when
    /// a new connection task was started.
    pub async fn connect_streaming(&self) -> bool {
        if self.is_disposed() {
            return false;
        }

        let pairs = {
            let requested = self.symbols.read();
            self.resolver.streamable_pairs(&requested[..])
        };

        let mut guard = self.stream.lock().await;

        if let Some(existing) = guard.as_ref() {
            if existing.pairs == pairs && !existing.task.is_finished() {
                debug!("Ticker stream already open for {:?}", pairs);
                return false;
            }
        }

        if let Some(old) = guard.take() {
            old.cancel.cancel();
            if let Err(e) = old.task.await {
                warn!("Previous ticker stream task failed: {}", e);
            }
        }

        if pairs.is_empty() {
            debug!("No requested symbol is tradable on the stream venue");
            return false;
        }

        let url = binance_stream::stream_url(&self.config.stream_url, &pairs);
        let cancel = self.cancel.child_token();
        info!("Opening ticker stream for {} pairs", pairs.len());

        let task = tokio::spawn(run_stream(
            url,
            self.resolver.clone(),
            cancel.clone(),
            self.config.reconnect.clone(),
            self.reconnect_stats.clone(),
        ));

        *guard = Some(StreamHandle { pairs, cancel, task });
        true
    }

    /// Replace the requested symbol list. New symbols get a snapshot fetch;
    /// the stream is reopened if the set of tradable pairs changed.
    pub async fn update_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> SnapshotFetch {
        if self.is_disposed() {
            return SnapshotFetch::Skipped;
        }

        let requested = symbols::dedupe(symbols);
        *self.symbols.write() = requested.clone();

        let outcome = self
            .resolver
            .on_snapshot_symbols_changed(&requested[..], self.snapshot_source.as_ref())
            .await;
        self.connect_streaming().await;
        outcome
    }

    /// Reload the tradable set and re-evaluate the stream
    pub async fn refresh_tradable_symbols(&self) {
        if self.is_disposed() {
            return;
        }
        self.resolver
            .fetch_tradable_symbols(self.tradable_source.as_ref())
            .await;
        self.connect_streaming().await;
    }

    /// Cancel pending work, close the stream and discard all prices
    pub async fn dispose(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let startup = self.startup.lock().take();
        if let Some(handle) = startup {
            if let Err(e) = handle.await {
                warn!("Session startup task failed: {}", e);
            }
        }

        if let Some(stream) = self.stream.lock().await.take() {
            if let Err(e) = stream.task.await {
                warn!("Ticker stream task failed: {}", e);
            }
        }

        self.resolver.reset();
        info!("Price session disposed");
    }
}

impl Drop for PriceSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct StartupParts {
    resolver: Arc<LivePriceResolver>,
    tradable_source: Arc<dyn TradableSymbolSource>,
    snapshot_source: Arc<dyn SnapshotPriceSource>,
    symbols: Vec<String>,
    cancel: CancellationToken,
    connect_delay: Duration,
}

/// Stream supervisor: connect, pump ticks, back off and retry until
/// cancelled or the failure ceiling is reached.
async fn run_stream(
    url: String,
    resolver: Arc<LivePriceResolver>,
    cancel: CancellationToken,
    reconnect: ReconnectConfig,
    stats: Arc<ReconnectStats>,
) {
    loop {
        stats.record_attempt();
        let opened_before = resolver.stats().connections_opened;

        match binance_stream::stream_tickers(&url, &resolver, &cancel).await {
            Ok(StreamEnd::Cancelled) => {
                resolver.on_connection_closed();
                debug!("Ticker stream cancelled");
                return;
            }
            Ok(StreamEnd::Closed) => {
                info!("Ticker stream closed");
                resolver.on_connection_closed();
            }
            Err(e) => resolver.on_connection_error(&e),
        }

        let failures = if resolver.stats().connections_opened > opened_before {
            stats.record_success();
            // Was connected: restart backoff from the base delay
            1
        } else {
            stats.record_failure()
        };

        if !reconnect.enabled {
            debug!("Reconnect disabled, leaving ticker stream closed");
            return;
        }
        if reconnect.should_give_up(stats.get_consecutive_failures()) {
            error!(
                "Ticker stream failed {} times in a row, serving cached prices only",
                stats.get_consecutive_failures()
            );
            return;
        }

        let delay = reconnect.calculate_delay(failures);
        debug!("Reconnecting ticker stream in {:?}", delay);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
