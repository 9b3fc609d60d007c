//! Session Integration Tests
//!
//! Run a real ticker stream against a local WebSocket server standing in
//! for the Binance combined stream.

mod common;

use common::{init_tracing, wait_for, FakeSnapshot, FakeTradable};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tickerlens_rust_core::reconnect::ReconnectConfig;
use tickerlens_rust_core::{PriceSession, PriceSource, SessionConfig, SnapshotRecord};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

struct FakeVenue {
    url: String,
    uri_rx: oneshot::Receiver<String>,
    close_tx: oneshot::Sender<()>,
}

/// Accept one connection, push `messages`, then close when told to
async fn spawn_venue(messages: Vec<String>) -> FakeVenue {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = oneshot::channel::<String>();
    let (close_tx, close_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| {
            let _ = uri_tx.send(req.uri().to_string());
            Ok::<Response, ErrorResponse>(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();

        for msg in messages {
            ws.send(Message::Text(msg)).await.unwrap();
        }

        let _ = close_rx.await;
        let _ = ws.close(None).await;
        // Drain until the client acknowledges the close
        while let Some(Ok(_)) = ws.next().await {}
    });

    FakeVenue {
        url: format!("ws://{}/stream", addr),
        uri_rx,
        close_tx,
    }
}

/// Serve one connection per script, in order. The server closes every
/// connection but the last after sending its messages.
async fn spawn_flapping_venue(scripts: Vec<Vec<String>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let last = scripts.len().saturating_sub(1);
        for (i, script) in scripts.into_iter().enumerate() {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for msg in script {
                ws.send(Message::Text(msg)).await.unwrap();
            }
            if i < last {
                let _ = ws.close(None).await;
            }
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    format!("ws://{}/stream", addr)
}

fn tick(pair: &str, price: &str) -> String {
    format!(
        r#"{{"stream":"{}@ticker","data":{{"s":"{}","c":"{}"}}}}"#,
        pair.to_lowercase(),
        pair,
        price
    )
}

fn reconnecting_config(stream_url: &str, max_failures: u32) -> SessionConfig {
    SessionConfig {
        reconnect: ReconnectConfig {
            enabled: true,
            max_consecutive_failures: max_failures,
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter_pct: 0.0,
        },
        ..test_config(stream_url)
    }
}

fn test_config(stream_url: &str) -> SessionConfig {
    SessionConfig {
        stream_url: stream_url.to_string(),
        connect_delay: Duration::from_millis(10),
        reconnect: ReconnectConfig {
            enabled: false,
            ..ReconnectConfig::default()
        },
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_session_streams_only_tradable_symbols() {
    init_tracing();
    let venue = spawn_venue(vec![
        r#"{"stream":"btcusdt@ticker","data":{"s":"BTCUSDT","c":"64000.10"}}"#.to_string(),
        r#"{"stream":"btcusdt@ticker","data":{"s":"BTCUSDT"}}"#.to_string(),
    ])
    .await;

    let tradable = Arc::new(FakeTradable::listing(&["BTCUSDT", "ETHUSDT"]));
    let snapshot = Arc::new(FakeSnapshot::with_records(vec![
        SnapshotRecord::new("BTC", 63000.0, Some(1)),
        SnapshotRecord::new("DOGE", 0.08, Some(2)),
    ]));

    let session = PriceSession::start(
        test_config(&venue.url),
        &["BTC", "DOGE", "", "btc"],
        tradable.clone(),
        snapshot.clone(),
    );
    let resolver = session.resolver().clone();
    assert!(resolver.is_hydrated());

    let uri = venue.uri_rx.await.unwrap();
    assert!(uri.contains("streams=btcusdt@ticker"), "unexpected uri {}", uri);
    assert!(!uri.contains("doge"));

    assert!(wait_for(|| resolver.is_symbol_live("BTC")).await);
    assert_eq!(resolver.get_price_data("BTC").price, Some(64000.10));
    assert!(wait_for(|| resolver.stats().malformed_ticks == 1).await);

    assert!(wait_for(|| resolver.get_price_source("DOGE") == Some("snapshot")).await);
    assert_eq!(resolver.format_price("doge"), "0.08");
    assert_eq!(snapshot.requested(), vec![vec!["BTC".to_string(), "DOGE".to_string()]]);
    assert_eq!(session.streaming_pairs().await, Some(vec!["BTCUSDT".to_string()]));

    // Server closes: fresh tier is dropped, last-known takes over
    venue.close_tx.send(()).unwrap();
    assert!(wait_for(|| !resolver.is_connected()).await);

    let data = resolver.get_price_data("BTC");
    assert_eq!(data.price, Some(64000.10));
    assert_eq!(data.source, Some(PriceSource::StreamingCached));
    assert!(!resolver.is_symbol_live("BTC"));

    session.dispose().await;
    assert!(!resolver.is_hydrated());
    assert_eq!(resolver.format_price("BTC"), "-");
}

#[tokio::test]
async fn test_no_stream_when_nothing_tradable() {
    let tradable = Arc::new(FakeTradable::failing());
    let snapshot = Arc::new(FakeSnapshot::with_records(vec![SnapshotRecord::new("BTC", 63000.0, None)]));

    // Nothing listens here
    let session = PriceSession::start(
        test_config("ws://127.0.0.1:9/stream"),
        &["BTC"],
        tradable.clone(),
        snapshot.clone(),
    );
    let resolver = session.resolver().clone();

    assert!(wait_for(|| resolver.get_price_source("BTC") == Some("snapshot")).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(tradable.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.streaming_pairs().await, None);
    assert!(!session.connect_streaming().await);
    assert_eq!(resolver.stats().connections_opened, 0);

    session.dispose().await;
}

#[tokio::test]
async fn test_update_symbols_fetches_new_snapshots_once() {
    let tradable = Arc::new(FakeTradable::listing(&[]));
    let snapshot = Arc::new(FakeSnapshot::with_records(vec![
        SnapshotRecord::new("BTC", 63000.0, None),
        SnapshotRecord::new("SOL", 150.0, None),
    ]));

    let session = PriceSession::start(
        test_config("ws://127.0.0.1:9/stream"),
        &["BTC"],
        tradable,
        snapshot.clone(),
    );
    let resolver = session.resolver().clone();
    assert!(wait_for(|| resolver.get_price_source("BTC").is_some()).await);

    session.update_symbols(&["BTC", "SOL"]).await;
    session.update_symbols(&["sol", "BTC"]).await;

    assert_eq!(
        snapshot.requested(),
        vec![vec!["BTC".to_string()], vec!["SOL".to_string()]]
    );
    assert_eq!(session.symbols(), vec!["sol".to_string(), "BTC".to_string()]);
    assert_eq!(resolver.format_price("SOL"), "150.00");

    session.dispose().await;
    assert!(session.is_disposed());
}

#[tokio::test]
async fn test_dispose_before_connect_delay_cancels_connect() {
    let tradable = Arc::new(FakeTradable::listing(&["BTCUSDT"]));
    let snapshot = Arc::new(FakeSnapshot::with_records(Vec::new()));

    let config = SessionConfig {
        connect_delay: Duration::from_secs(5),
        ..test_config("ws://127.0.0.1:9/stream")
    };
    let session = PriceSession::start(config, &["BTC"], tradable.clone(), snapshot);
    let resolver = session.resolver().clone();

    assert!(wait_for(|| resolver.tradable_count() == 1).await);
    session.dispose().await;

    assert_eq!(session.streaming_pairs().await, None);
    assert_eq!(resolver.stats().connections_opened, 0);
    assert!(!session.connect_streaming().await);
}

#[tokio::test]
async fn test_stream_reopens_after_server_close() {
    init_tracing();
    let url = spawn_flapping_venue(vec![
        vec![tick("BTCUSDT", "1.0")],
        vec![tick("BTCUSDT", "2.0")],
    ])
    .await;

    let session = PriceSession::start(
        reconnecting_config(&url, 3),
        &["BTC"],
        Arc::new(FakeTradable::listing(&["BTCUSDT"])),
        Arc::new(FakeSnapshot::with_records(Vec::new())),
    );
    let resolver = session.resolver().clone();

    assert!(wait_for(|| resolver.get_price_data("BTC").price == Some(2.0)).await);
    assert!(resolver.is_symbol_live("BTC"));
    assert!(resolver.is_connected());
    assert_eq!(resolver.stats().connections_opened, 2);

    // The first connection opened, so the retry did not count as a failure
    let stats = session.reconnect_stats();
    assert_eq!(stats.connect_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(stats.streams_opened.load(Ordering::SeqCst), 1);
    assert_eq!(stats.failed_attempts.load(Ordering::SeqCst), 0);
    assert_eq!(stats.get_consecutive_failures(), 0);

    session.dispose().await;
}

#[tokio::test]
async fn test_stream_abandoned_after_failure_ceiling() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_url = format!("ws://{}/stream", listener.local_addr().unwrap());
    drop(listener);

    let session = PriceSession::start(
        reconnecting_config(&dead_url, 2),
        &["BTC"],
        Arc::new(FakeTradable::listing(&["BTCUSDT"])),
        Arc::new(FakeSnapshot::with_records(Vec::new())),
    );
    let resolver = session.resolver().clone();

    assert!(wait_for(|| session.reconnect_stats().get_consecutive_failures() == 2).await);

    let mut stopped = false;
    for _ in 0..200 {
        if session.streaming_pairs().await.is_none() {
            stopped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stopped, "supervisor kept retrying");

    // No further attempts once the ceiling is hit
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = session.reconnect_stats();
    assert_eq!(stats.connect_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(stats.failed_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(stats.get_consecutive_failures(), 2);
    assert_eq!(resolver.stats().connections_opened, 0);
    assert!(!resolver.is_connected());

    session.dispose().await;
}

#[tokio::test]
async fn test_ping_answered_with_single_pong() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/stream", listener.local_addr().unwrap());
    let (pongs_tx, pongs_rx) = oneshot::channel::<Vec<Vec<u8>>>();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        ws.send(Message::Ping(b"hb".to_vec())).await.unwrap();
        ws.send(Message::Text(tick("BTCUSDT", "1.0"))).await.unwrap();

        let mut pongs = Vec::new();
        while let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
            if let Message::Pong(payload) = msg {
                pongs.push(payload);
            }
        }
        let _ = pongs_tx.send(pongs);
        while let Some(Ok(_)) = ws.next().await {}
    });

    let session = PriceSession::start(
        test_config(&url),
        &["BTC"],
        Arc::new(FakeTradable::listing(&["BTCUSDT"])),
        Arc::new(FakeSnapshot::with_records(Vec::new())),
    );
    let resolver = session.resolver().clone();

    assert!(wait_for(|| resolver.is_symbol_live("BTC")).await);
    assert_eq!(pongs_rx.await.unwrap(), vec![b"hb".to_vec()]);
    assert_eq!(resolver.stats().malformed_ticks, 0);

    session.dispose().await;
}
