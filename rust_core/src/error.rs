//! Error type for the price clients
//!
//! None of these reach resolver consumers; the resolver logs them and degrades
//! to a lower tier.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} reported success=false")]
    Rejected(&'static str),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl PriceFeedError {
    /// HTTP 429 from either REST endpoint
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PriceFeedError::Status { status: 429, .. })
    }
}

pub type PriceFeedResult<T> = Result<T, PriceFeedError>;
