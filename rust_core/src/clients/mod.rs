pub mod binance;
pub mod binance_stream;
pub mod coinindex;
pub mod source;

use crate::error::PriceFeedResult;
use reqwest::Client;
use std::time::Duration;

// Re-export commonly used types
pub use binance::BinanceClient;
pub use coinindex::CoinIndexClient;
pub use source::{ProviderStatus, SnapshotPriceSource, TradableSymbolSource};

/// Shared reqwest client setup for the REST collaborators
pub(crate) fn http_client(timeout: Duration) -> PriceFeedResult<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent("Tickerlens/1.0")
        .build()?)
}
