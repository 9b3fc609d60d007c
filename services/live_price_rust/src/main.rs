use anyhow::{Context, Result};
use dotenv::dotenv;
use live_price_rust::board;
use live_price_rust::LivePriceConfig;
use std::sync::Arc;
use tickerlens_rust_core::clients::{BinanceClient, CoinIndexClient};
use tickerlens_rust_core::PriceSession;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting live_price_rust...");

    let config = LivePriceConfig::from_env()?;
    info!(
        "Tracking {} symbols (staleness {}s, snapshot API {})",
        config.symbols.len(),
        config.staleness_secs,
        config.snapshot_base_url
    );

    // Clients
    let binance = BinanceClient::new(&config.binance_rest_url, config.http_timeout())
        .context("Failed to initialize BinanceClient")?;
    let coinindex = CoinIndexClient::new(&config.snapshot_base_url, config.http_timeout())
        .context("Failed to initialize CoinIndexClient")?;

    let session = PriceSession::start(
        config.session_config(),
        &config.symbols[..],
        Arc::new(binance),
        Arc::new(coinindex),
    );

    let mut report = tokio::time::interval(config.report_interval());
    let refresh_period = config.tradable_refresh();
    let mut refresh = tokio::time::interval(refresh_period.unwrap_or(config.report_interval()));
    // Both intervals fire immediately; startup already fetched the tradable set
    refresh.tick().await;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
            _ = report.tick() => log_board(&session),
            _ = refresh.tick(), if refresh_period.is_some() => {
                info!("Refreshing tradable symbols");
                session.refresh_tradable_symbols().await;
            }
        }
    }

    session.dispose().await;
    info!("live_price_rust stopped");
    Ok(())
}

fn log_board(session: &PriceSession) {
    let resolver = session.resolver();
    let stats = resolver.stats();
    info!(
        "Price board (connected: {}, ticks: {}, malformed: {}, snapshot batches: {})",
        resolver.is_connected(),
        stats.ticks_applied,
        stats.malformed_ticks,
        stats.snapshot_batches
    );
    for row in board::build_rows(resolver, &session.symbols()) {
        info!("{}", board::render_row(&row));
    }
}
