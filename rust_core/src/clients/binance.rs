//! Binance REST Client
//!
//! Lists the spot pairs Binance currently trades, used to decide which
//! requested symbols can be served from the live ticker stream.
//! No API key required for public endpoints.

use super::source::{ProviderStatus, TradableSymbolSource};
use crate::error::{PriceFeedError, PriceFeedResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_REST_URL: &str = "https://api.binance.com";
const EXCHANGE_INFO_PATH: &str = "/api/v3/exchangeInfo";
const TRADING_STATUS: &str = "TRADING";

/// Binance API client implementing TradableSymbolSource
pub struct BinanceClient {
    client: Client,
    base_url: String,
    status: RwLock<ProviderStatus>,
}

impl BinanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> PriceFeedResult<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            status: RwLock::new(ProviderStatus::Healthy),
        })
    }

    pub fn exchange_info_url(&self) -> String {
        format!("{}{}", self.base_url, EXCHANGE_INFO_PATH)
    }

    fn set_status(&self, status: ProviderStatus) {
        *self.status.write() = status;
    }
}

/// Keep only actively trading pairs, uppercased
fn tradable_from_exchange_info(info: ExchangeInfo) -> Vec<String> {
    info.symbols
        .into_iter()
        .filter(|s| s.status == TRADING_STATUS)
        .map(|s| s.symbol.to_uppercase())
        .collect()
}

#[async_trait]
impl TradableSymbolSource for BinanceClient {
    fn provider_name(&self) -> &str {
        "Binance"
    }

    fn status(&self) -> ProviderStatus {
        *self.status.read()
    }

    async fn fetch_tradable_symbols(&self) -> PriceFeedResult<Vec<String>> {
        let url = self.exchange_info_url();
        debug!("Fetching exchange info from {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            self.set_status(ProviderStatus::Error);
            PriceFeedError::Http(e)
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let err = PriceFeedError::Status {
                endpoint: "exchangeInfo",
                status,
                body,
            };
            if err.is_rate_limited() {
                self.set_status(ProviderStatus::RateLimited);
            } else {
                self.set_status(ProviderStatus::Error);
            }
            warn!("Binance exchangeInfo failed: {}", err);
            return Err(err);
        }

        let bytes = response.bytes().await?;
        let info: ExchangeInfo = serde_json::from_slice(&bytes).map_err(|source| {
            self.set_status(ProviderStatus::Error);
            PriceFeedError::Decode {
                endpoint: "exchangeInfo",
                source,
            }
        })?;

        self.set_status(ProviderStatus::Healthy);
        let symbols = tradable_from_exchange_info(info);
        debug!("Binance lists {} tradable pairs", symbols.len());
        Ok(symbols)
    }
}

/// Binance exchangeInfo response (only the fields we read)
#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    #[serde(default)]
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
    status: String,
}
