//! Fake REST collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tickerlens_rust_core::clients::source::{ProviderStatus, SnapshotPriceSource, TradableSymbolSource};
use tickerlens_rust_core::{PriceFeedError, PriceFeedResult, SnapshotRecord};

pub struct FakeTradable {
    symbols: Option<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeTradable {
    pub fn listing(symbols: &[&str]) -> Self {
        Self {
            symbols: Some(symbols.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            symbols: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TradableSymbolSource for FakeTradable {
    fn provider_name(&self) -> &str {
        "FakeTradable"
    }

    fn status(&self) -> ProviderStatus {
        if self.symbols.is_some() {
            ProviderStatus::Healthy
        } else {
            ProviderStatus::Error
        }
    }

    async fn fetch_tradable_symbols(&self) -> PriceFeedResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.symbols.clone().ok_or(PriceFeedError::Status {
            endpoint: "exchangeInfo",
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

pub struct FakeSnapshot {
    records: Vec<SnapshotRecord>,
    fail: bool,
    delay: Duration,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl FakeSnapshot {
    /// Answers with the subset of `records` whose symbol was requested
    pub fn with_records(records: Vec<SnapshotRecord>) -> Self {
        Self {
            records,
            fail: false,
            delay: Duration::ZERO,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Every request comes back `success: false`
    pub fn rejecting() -> Self {
        Self {
            records: Vec::new(),
            fail: true,
            delay: Duration::ZERO,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn requested(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl SnapshotPriceSource for FakeSnapshot {
    fn provider_name(&self) -> &str {
        "FakeSnapshot"
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus::Healthy
    }

    async fn fetch_snapshot_prices(&self, symbols: &[String]) -> PriceFeedResult<Vec<SnapshotRecord>> {
        self.batches.lock().push(symbols.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PriceFeedError::Rejected("coinindex filter"));
        }

        Ok(self
            .records
            .iter()
            .filter(|r| {
                r.symbol
                    .as_deref()
                    .map(|s| symbols.iter().any(|req| req.eq_ignore_ascii_case(s)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

/// Poll `cond` every 10ms for up to 2s
pub async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Route library logs through the test harness; RUST_LOG picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
