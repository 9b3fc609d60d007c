//! live_price_rust - runs a price session and logs the resulting price board

pub mod board;
pub mod config;

pub use config::LivePriceConfig;
