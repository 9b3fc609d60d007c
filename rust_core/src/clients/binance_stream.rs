//! Binance combined ticker stream
//!
//! One WebSocket multiplexes every `<pair>@ticker` stream the session needs.
//! Messages look like `{"stream":"btcusdt@ticker","data":{"s":"BTCUSDT","c":"64000.10",...}}`.

use crate::error::PriceFeedResult;
use crate::resolver::LivePriceResolver;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Binance combined stream endpoint
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";

/// Why a stream loop returned without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The owning session was disposed or the stream set changed
    Cancelled,
    /// Server sent Close or the stream ended
    Closed,
}

/// A price tick pulled out of a stream message
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
}

/// Build `wss://.../stream?streams=btcusdt@ticker/ethusdt@ticker`
pub fn stream_url(base_url: &str, pairs: &[String]) -> String {
    let streams: Vec<String> = pairs
        .iter()
        .map(|p| format!("{}@ticker", p.to_lowercase()))
        .collect();
    format!("{}?streams={}", base_url, streams.join("/"))
}

/// Extract symbol and last price from a combined-stream payload.
/// Returns `None` for control messages and anything missing `s` or `c`.
pub fn parse_ticker(text: &str) -> Option<Tick> {
    let value: Value = serde_json::from_str(text).ok()?;
    let data = value.get("data")?;

    let symbol = data.get("s")?.as_str()?.trim();
    if symbol.is_empty() {
        return None;
    }

    let price = match data.get("c")? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    if !price.is_finite() {
        return None;
    }

    Some(Tick {
        symbol: symbol.to_string(),
        price,
    })
}

/// Connect and feed ticks into `resolver` until cancelled, closed or errored.
///
/// Connection state changes are reported through the resolver's handlers;
/// transport errors are returned so the caller can decide whether to reconnect.
pub async fn stream_tickers(
    url: &str,
    resolver: &LivePriceResolver,
    cancel: &CancellationToken,
) -> PriceFeedResult<StreamEnd> {
    let connected = tokio::select! {
        _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
        res = connect_async(url) => res,
    };
    let (ws_stream, _response) = connected?;

    info!("Connected to ticker stream");
    resolver.on_connection_opened();

    let (mut write, mut read) = ws_stream.split();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("Close frame not delivered: {}", e);
                }
                return Ok(StreamEnd::Cancelled);
            }
            next = read.next() => next,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(StreamEnd::Closed),
        };

        match msg {
            Message::Text(text) => handle_text(resolver, &text),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_text(resolver, text),
                Err(_) => resolver.on_malformed_tick(),
            },
            // tungstenite queues the Pong itself and flushes it on the next read
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            Message::Close(frame) => {
                debug!("Ticker stream closed by server: {:?}", frame);
                return Ok(StreamEnd::Closed);
            }
        }
    }
}

fn handle_text(resolver: &LivePriceResolver, text: &str) {
    match parse_ticker(text) {
        Some(tick) => resolver.on_tick(&tick.symbol, tick.price),
        None => resolver.on_malformed_tick(),
    }
}
