//! Configuration for live_price_rust

use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;
use tickerlens_rust_core::clients::binance::DEFAULT_REST_URL;
use tickerlens_rust_core::clients::binance_stream::DEFAULT_STREAM_URL;
use tickerlens_rust_core::reconnect::ReconnectConfig;
use tickerlens_rust_core::resolver::ResolverConfig;
use tickerlens_rust_core::SessionConfig;

#[derive(Debug, Clone)]
pub struct LivePriceConfig {
    // Symbols shown on the board
    pub symbols: Vec<String>,

    // Endpoints
    pub snapshot_base_url: String,
    pub binance_rest_url: String,
    pub binance_stream_url: String,

    // Timing
    pub staleness_secs: u64,
    pub connect_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub report_interval_secs: u64,
    pub tradable_refresh_secs: u64,

    pub reconnect: ReconnectConfig,
}

impl LivePriceConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_vars(|name| env::var(name).ok())?;
        config.reconnect = ReconnectConfig::from_env();
        Ok(config)
    }

    /// Build from any variable lookup; `from_env` passes the process environment
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let snapshot_base_url = var("SNAPSHOT_API_BASE_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("SNAPSHOT_API_BASE_URL must be set"))?;

        let symbols: Vec<String> = var("LIVE_PRICE_SYMBOLS")
            .unwrap_or_else(|| "BTC,ETH,SOL".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let staleness_secs = parse_u64(&var, "LIVE_PRICE_STALENESS_SECS", 30)?;
        let connect_delay_ms = parse_u64(&var, "LIVE_PRICE_CONNECT_DELAY_MS", 1000)?;
        let http_timeout_secs = parse_u64(&var, "LIVE_PRICE_HTTP_TIMEOUT_SECS", 10)?;
        let report_interval_secs = parse_u64(&var, "LIVE_PRICE_REPORT_INTERVAL_SECS", 15)?;
        let tradable_refresh_secs = parse_u64(&var, "LIVE_PRICE_TRADABLE_REFRESH_SECS", 0)?;

        if symbols.is_empty() {
            return Err(anyhow!("LIVE_PRICE_SYMBOLS must name at least one symbol"));
        }
        if staleness_secs == 0 {
            return Err(anyhow!("LIVE_PRICE_STALENESS_SECS must be > 0"));
        }
        if http_timeout_secs == 0 {
            return Err(anyhow!("LIVE_PRICE_HTTP_TIMEOUT_SECS must be > 0"));
        }
        if report_interval_secs == 0 {
            return Err(anyhow!("LIVE_PRICE_REPORT_INTERVAL_SECS must be > 0"));
        }

        Ok(Self {
            symbols,
            snapshot_base_url,
            binance_rest_url: var("BINANCE_REST_URL").unwrap_or_else(|| DEFAULT_REST_URL.to_string()),
            binance_stream_url: var("BINANCE_STREAM_URL")
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            staleness_secs,
            connect_delay_ms,
            http_timeout_secs,
            report_interval_secs,
            tradable_refresh_secs,
            reconnect: ReconnectConfig::default(),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// None when periodic tradable refresh is switched off (0)
    pub fn tradable_refresh(&self) -> Option<Duration> {
        (self.tradable_refresh_secs > 0).then(|| Duration::from_secs(self.tradable_refresh_secs))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            stream_url: self.binance_stream_url.clone(),
            connect_delay: Duration::from_millis(self.connect_delay_ms),
            reconnect: self.reconnect.clone(),
            resolver: ResolverConfig {
                staleness_window: Duration::from_secs(self.staleness_secs),
            },
        }
    }
}

/// Parse a variable as u64 with default fallback
fn parse_u64<F>(var: &F, var_name: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match var(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        None => Ok(default),
    }
}
