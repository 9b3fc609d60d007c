//! Price Source Traits
//!
//! The resolver talks to its two REST collaborators through these traits so
//! the HTTP clients can be swapped for fakes in tests.

use crate::error::PriceFeedResult;
use crate::models::SnapshotRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider health/availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Provider is operational and responding normally
    #[default]
    Healthy,
    /// Provider answered 429, requests should be delayed
    RateLimited,
    /// Provider returned an error, may be temporarily down
    Error,
}

/// Lists symbols currently tradable on the streaming venue
#[async_trait]
pub trait TradableSymbolSource: Send + Sync {
    /// Display name used in logs
    fn provider_name(&self) -> &str;

    fn status(&self) -> ProviderStatus;

    /// Venue symbols (e.g. "BTCUSDT") whose status is actively trading
    async fn fetch_tradable_symbols(&self) -> PriceFeedResult<Vec<String>>;
}

/// Batched snapshot prices from the internal index API
#[async_trait]
pub trait SnapshotPriceSource: Send + Sync {
    fn provider_name(&self) -> &str;

    fn status(&self) -> ProviderStatus;

    /// Fetch snapshot rows for `symbols` in one request.
    ///
    /// # Returns
    /// * `Ok(records)` - rows returned by the endpoint, possibly fewer than requested
    /// * `Err` - transport failure, non-2xx status, undecodable body or `success: false`
    async fn fetch_snapshot_prices(&self, symbols: &[String]) -> PriceFeedResult<Vec<SnapshotRecord>>;
}
