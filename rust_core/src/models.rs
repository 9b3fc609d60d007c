//! Price data structures shared by the resolver, the clients and consumers

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Which tier produced a resolved price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceSource {
    /// Fresh tick from the streaming venue
    Streaming,
    /// Last tick seen on the stream, past the freshness window
    StreamingCached,
    /// Periodically fetched snapshot from the internal index API
    Snapshot,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Streaming => "streaming",
            PriceSource::StreamingCached => "streaming-cached",
            PriceSource::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single price seen for a symbol at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub symbol: String,
    pub price: f64,
    pub observed_at_ms: i64,
    pub source: PriceSource,
}

impl PriceObservation {
    pub fn new(symbol: impl Into<String>, price: f64, observed_at_ms: i64, source: PriceSource) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            observed_at_ms,
            source,
        }
    }

    /// Milliseconds elapsed since the observation, clamped at zero
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.observed_at_ms).max(0)
    }
}

/// Result of resolving one symbol, as handed to display code
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PriceData {
    pub price: Option<f64>,
    pub is_live: bool,
    pub source: Option<PriceSource>,
    /// Set when the value came from a streaming quote past the freshness window
    pub is_stale: bool,
}

impl PriceData {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn live(price: f64) -> Self {
        Self {
            price: Some(price),
            is_live: true,
            source: Some(PriceSource::Streaming),
            is_stale: false,
        }
    }

    pub fn cached(price: f64) -> Self {
        Self {
            price: Some(price),
            is_live: false,
            source: Some(PriceSource::StreamingCached),
            is_stale: true,
        }
    }

    pub fn snapshot(price: f64) -> Self {
        Self {
            price: Some(price),
            is_live: false,
            source: Some(PriceSource::Snapshot),
            is_stale: false,
        }
    }

    pub fn has_price(&self) -> bool {
        self.price.is_some()
    }
}

/// Snapshot endpoint envelope: `{ success, results: [...] }`
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<SnapshotRecord>,
}

/// One row of the snapshot endpoint. Any field may be missing; rows without
/// a symbol or a usable price are skipped by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_price")]
    pub end_timestamp_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flexible_timestamp")]
    pub end_timestamp: Option<i64>,
}

impl SnapshotRecord {
    pub fn new(symbol: &str, price: f64, timestamp_ms: Option<i64>) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            end_timestamp_price: Some(price),
            end_timestamp: timestamp_ms,
        }
    }
}

/// Prices come back as JSON numbers or numeric strings depending on the row
fn deserialize_flexible_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PriceValue {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<PriceValue>::deserialize(deserializer)? {
        Some(PriceValue::Number(n)) if n.is_finite() => Some(n),
        Some(PriceValue::Text(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

/// Timestamps that can be either:
/// - Unix milliseconds (integer or numeric string)
/// - RFC 3339 formatted string
fn deserialize_flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TimestampValue {
        Millis(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<TimestampValue>::deserialize(deserializer)? {
        Some(TimestampValue::Millis(ms)) => Some(ms),
        Some(TimestampValue::Float(ms)) if ms.is_finite() => Some(ms as i64),
        Some(TimestampValue::Text(s)) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
        }
        _ => None,
    })
}
