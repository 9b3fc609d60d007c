//! Coin Index Snapshot Client
//!
//! Reads end-of-window snapshot prices from the dashboard's internal index
//! API. One request covers a whole batch of symbols.

use super::source::{ProviderStatus, SnapshotPriceSource};
use crate::error::{PriceFeedError, PriceFeedResult};
use crate::models::{SnapshotRecord, SnapshotResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, warn};

const FILTER_PATH: &str = "/api/admin/coinindex/mcmdb/filter";

pub struct CoinIndexClient {
    client: Client,
    base_url: String,
    status: RwLock<ProviderStatus>,
}

impl CoinIndexClient {
    pub fn new(base_url: &str, timeout: Duration) -> PriceFeedResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            status: RwLock::new(ProviderStatus::Healthy),
        })
    }

    pub fn filter_url(&self) -> String {
        format!("{}{}", self.base_url, FILTER_PATH)
    }

    /// GET `filter?symbols=BTC,ETH`, the symbol list form-encoded as one value
    pub fn filter_request(&self, symbols: &[String]) -> RequestBuilder {
        self.client
            .get(self.filter_url())
            .query(&[("symbols", symbols.join(","))])
    }

    fn set_status(&self, status: ProviderStatus) {
        *self.status.write() = status;
    }
}

#[async_trait]
impl SnapshotPriceSource for CoinIndexClient {
    fn provider_name(&self) -> &str {
        "CoinIndex"
    }

    fn status(&self) -> ProviderStatus {
        *self.status.read()
    }

    async fn fetch_snapshot_prices(&self, symbols: &[String]) -> PriceFeedResult<Vec<SnapshotRecord>> {
        debug!("Fetching {} snapshot prices", symbols.len());

        let response = self.filter_request(symbols).send().await.map_err(|e| {
            self.set_status(ProviderStatus::Error);
            PriceFeedError::Http(e)
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let err = PriceFeedError::Status {
                endpoint: "coinindex filter",
                status,
                body,
            };
            self.set_status(if err.is_rate_limited() {
                ProviderStatus::RateLimited
            } else {
                ProviderStatus::Error
            });
            warn!("Snapshot request failed: {}", err);
            return Err(err);
        }

        let bytes = response.bytes().await?;
        let parsed = parse_snapshot_body(&bytes).inspect_err(|_| self.set_status(ProviderStatus::Error))?;

        self.set_status(ProviderStatus::Healthy);
        Ok(parsed)
    }
}

/// Decode the envelope, treating `success: false` as a failed request
pub fn parse_snapshot_body(bytes: &[u8]) -> PriceFeedResult<Vec<SnapshotRecord>> {
    let response: SnapshotResponse =
        serde_json::from_slice(bytes).map_err(|source| PriceFeedError::Decode {
            endpoint: "coinindex filter",
            source,
        })?;

    if !response.success {
        return Err(PriceFeedError::Rejected("coinindex filter"));
    }

    Ok(response.results)
}
